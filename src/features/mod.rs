//! Sensor sample schema and the fixed-length feature vectors fed to the model.

mod extractor;

pub use extractor::{FeatureExtractor, VibrationExtractor};

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};

/// Whether a sample feeds the training buffer or is scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleMode {
    Training,
    Prediction,
}

impl SampleMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleMode::Training => "training",
            SampleMode::Prediction => "prediction",
        }
    }
}

/// One device payload. Scalar fields default to 0 and spectra to all-zero
/// when absent; spectra that are present must carry exactly `spectrum_bins` values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// `"training"` | `"prediction"`; absent means training
    pub mode: Option<String>,
    /// Device clock, milliseconds
    #[serde(rename = "timestamp")]
    pub device_time_ms: Option<u64>,
    pub device_id: Option<String>,
    pub peak_freq_x: Option<f64>,
    pub peak_freq_y: Option<f64>,
    pub peak_freq_z: Option<f64>,
    pub rms_x: Option<f64>,
    pub rms_y: Option<f64>,
    pub rms_z: Option<f64>,
    pub kurtosis: Option<f64>,
    pub spectrum_x: Option<Vec<f64>>,
    pub spectrum_y: Option<Vec<f64>>,
    pub spectrum_z: Option<Vec<f64>>,
}

impl RawSample {
    pub fn mode(&self) -> Result<SampleMode, ValidationError> {
        match self.mode.as_deref() {
            None | Some("training") => Ok(SampleMode::Training),
            Some("prediction") => Ok(SampleMode::Prediction),
            Some(other) => Err(ValidationError::UnknownMode(other.to_string())),
        }
    }

    pub fn with_mode(mut self, mode: SampleMode) -> Self {
        self.mode = Some(mode.as_str().to_string());
        self
    }

    /// Scalar features in vector order, absent fields as 0.
    pub fn scalars(&self) -> [(&'static str, f64); 7] {
        [
            ("peak_freq_x", self.peak_freq_x.unwrap_or(0.0)),
            ("peak_freq_y", self.peak_freq_y.unwrap_or(0.0)),
            ("peak_freq_z", self.peak_freq_z.unwrap_or(0.0)),
            ("rms_x", self.rms_x.unwrap_or(0.0)),
            ("rms_y", self.rms_y.unwrap_or(0.0)),
            ("rms_z", self.rms_z.unwrap_or(0.0)),
            ("kurtosis", self.kurtosis.unwrap_or(0.0)),
        ]
    }

    pub fn spectra(&self) -> [(char, Option<&[f64]>); 3] {
        [
            ('x', self.spectrum_x.as_deref()),
            ('y', self.spectrum_y.as_deref()),
            ('z', self.spectrum_z.as_deref()),
        ]
    }
}

/// Fixed-size feature vector for model input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub values: Vec<f64>,
}

impl FeatureVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
