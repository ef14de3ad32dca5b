//! Unsupervised anomaly detection: feature standardization and the detector.
//! The trained pair travels as one [`ModelState`]; a model is never scored
//! through a scaler other than the one it was trained behind.

mod iforest;
mod scaler;

pub use iforest::{IsolationForest, IsolationForestParams};
pub use scaler::Scaler;

use crate::error::TrainError;
use chrono::{DateTime, Utc};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

/// Bumped whenever the persisted layout of [`ModelState`] changes.
pub const MODEL_FORMAT_VERSION: u32 = 1;

/// The detector's own binary decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Normal,
    Outlier,
}

/// Trait for anomaly detection models trained on standardized vectors.
///
/// Scoring only sees the trait ([`AnomalyPolicy::classify`](crate::policy::AnomalyPolicy::classify)
/// takes `&dyn AnomalyModel`), but [`ModelState`] and the persisted blob hold the
/// concrete [`IsolationForest`]. Swapping the detector means a new `ModelState`
/// field type and a `MODEL_FORMAT_VERSION` bump.
pub trait AnomalyModel: Send + Sync {
    /// Train on an `N x D` matrix, replacing any previous fit
    fn fit(&mut self, x: ArrayView2<'_, f64>) -> Result<(), TrainError>;

    /// Continuous score; higher = more normal, negative = anomalous. The
    /// reachable range depends on the model and its training batch.
    fn score_samples(&self, x: &[f64]) -> f64;

    /// Binary decision from the model's contamination-calibrated boundary
    fn predict(&self, x: &[f64]) -> Label;

    /// Dimensionality seen at fit time (0 before fit)
    fn n_features(&self) -> usize;

    fn name(&self) -> &str;
}

/// A scaler and the model trained on its output, produced by one retrain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelState {
    pub format_version: u32,
    /// Monotonic retrain counter within the lifetime of the persisted state
    pub generation: u64,
    pub trained_at: DateTime<Utc>,
    /// Training batch size
    pub samples: usize,
    pub scaler: Scaler,
    pub model: IsolationForest,
}

impl ModelState {
    pub fn new(generation: u64, samples: usize, scaler: Scaler, model: IsolationForest) -> Self {
        Self {
            format_version: MODEL_FORMAT_VERSION,
            generation,
            trained_at: Utc::now(),
            samples,
            scaler,
            model,
        }
    }

    pub fn dim(&self) -> usize {
        self.scaler.dim()
    }
}
