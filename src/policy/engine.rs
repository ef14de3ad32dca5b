//! Combines the detector's own label with a configurable score threshold.

use crate::config::{PolicyConfig, SignalCombination};
use crate::error::ValidationError;
use crate::features::FeatureVector;
use crate::model::{AnomalyModel, Label, Scaler};
use serde::{Deserialize, Serialize};

/// Decision for a single scored sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub is_anomaly: bool,
    pub score: f64,
    pub label: Label,
}

pub struct AnomalyPolicy {
    config: PolicyConfig,
}

impl AnomalyPolicy {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    /// Default combination flags a sample when either signal fires, which
    /// favors anomaly recall over precision.
    pub fn decide(&self, label: Label, score: f64) -> Verdict {
        let by_model = label == Label::Outlier;
        let by_threshold = score < self.config.anomaly_threshold;
        let is_anomaly = match self.config.combine {
            SignalCombination::Any => by_model || by_threshold,
            SignalCombination::All => by_model && by_threshold,
        };
        Verdict {
            is_anomaly,
            score,
            label,
        }
    }

    /// Standardize `v` with the scaler the model was trained behind, then score it.
    pub fn classify(
        &self,
        v: &FeatureVector,
        scaler: &Scaler,
        model: &dyn AnomalyModel,
    ) -> Result<Verdict, ValidationError> {
        let standardized = scaler.transform(v.as_slice())?;
        let score = model.score_samples(&standardized);
        let label = model.predict(&standardized);
        Ok(self.decide(label, score))
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }
}
