//! Service configuration. JSON file with per-section defaults, plus the
//! deployment environment overrides for the training and threshold knobs.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Data directory (model store, audit log)
    pub data_dir: PathBuf,
    /// HTTP listen address
    pub listen_addr: String,
    /// Retraining parameters
    pub training: TrainingConfig,
    /// Anomaly decision policy
    pub policy: PolicyConfig,
    /// Feature layout agreed with the devices
    pub features: FeaturesConfig,
    /// Prediction audit log
    pub audit: AuditConfig,
    /// Logging
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Training-mode samples collected before a retrain fires
    pub training_buffer_size: usize,
    /// Expected anomalous fraction of a training batch
    pub contamination: f64,
    /// Seed for the model fit; same batch + seed gives the same model
    pub random_seed: u64,
    /// Trees in the isolation forest
    pub n_estimators: usize,
    /// Subsample size per tree (capped at the batch size)
    pub max_samples: usize,
}

/// How the model's own label and the score threshold are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalCombination {
    /// Anomalous if either signal fires
    #[default]
    Any,
    /// Anomalous only if both signals fire
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Scores below this are anomalous (higher = more normal)
    pub anomaly_threshold: f64,
    pub combine: SignalCombination,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Top-N spectral magnitudes sent per axis
    pub spectrum_bins: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".vibewatch"),
            listen_addr: "0.0.0.0:5000".to_string(),
            training: TrainingConfig::default(),
            policy: PolicyConfig::default(),
            features: FeaturesConfig::default(),
            audit: AuditConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            training_buffer_size: 100,
            contamination: 0.10,
            random_seed: 42,
            n_estimators: 100,
            max_samples: 256,
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            anomaly_threshold: -0.3,
            combine: SignalCombination::Any,
        }
    }
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self { spectrum_bins: 5 }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

/// An environment override whose value did not parse; the field keeps its prior value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedOverride {
    pub key: &'static str,
    pub value: String,
}

impl ServiceConfig {
    /// Load from JSON file if present; otherwise return default
    pub fn load(path: &std::path::Path) -> Self {
        match Self::try_load(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "config unreadable; using defaults");
                Self::default()
            }
        }
    }

    /// Like [`load`](Self::load) but hands the failure back, for callers that
    /// read config before a log subscriber exists.
    pub fn try_load(path: &std::path::Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Apply `TRAINING_BUFFER_SIZE`, `ANOMALY_THRESHOLD`, `CONTAMINATION`, `RANDOM_SEED`.
    pub fn apply_env_overrides(&mut self) -> Vec<RejectedOverride> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Override source is injectable so tests don't touch the process environment.
    /// Unparsable values leave the field unchanged and are returned.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Vec<RejectedOverride> {
        fn take<T: std::str::FromStr>(
            key: &'static str,
            raw: Option<String>,
            rejected: &mut Vec<RejectedOverride>,
        ) -> Option<T> {
            let raw = raw?;
            match raw.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    rejected.push(RejectedOverride { key, value: raw });
                    None
                }
            }
        }

        let mut rejected = Vec::new();
        if let Some(v) = take("TRAINING_BUFFER_SIZE", lookup("TRAINING_BUFFER_SIZE"), &mut rejected) {
            self.training.training_buffer_size = v;
        }
        if let Some(v) = take("ANOMALY_THRESHOLD", lookup("ANOMALY_THRESHOLD"), &mut rejected) {
            self.policy.anomaly_threshold = v;
        }
        if let Some(v) = take("CONTAMINATION", lookup("CONTAMINATION"), &mut rejected) {
            self.training.contamination = v;
        }
        if let Some(v) = take("RANDOM_SEED", lookup("RANDOM_SEED"), &mut rejected) {
            self.training.random_seed = v;
        }
        rejected
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.training;
        if t.training_buffer_size < 2 {
            return Err(ConfigError::Invalid(format!(
                "training_buffer_size must be at least 2, got {}",
                t.training_buffer_size
            )));
        }
        if !(t.contamination > 0.0 && t.contamination <= 0.5) {
            return Err(ConfigError::Invalid(format!(
                "contamination must be in (0, 0.5], got {}",
                t.contamination
            )));
        }
        if t.n_estimators == 0 || t.max_samples < 2 {
            return Err(ConfigError::Invalid(
                "n_estimators must be positive and max_samples at least 2".to_string(),
            ));
        }
        if !self.policy.anomaly_threshold.is_finite() {
            return Err(ConfigError::Invalid("anomaly_threshold must be finite".to_string()));
        }
        if self.features.spectrum_bins == 0 {
            return Err(ConfigError::Invalid("spectrum_bins must be positive".to_string()));
        }
        Ok(())
    }
}
