//! Raw sample → fixed-dim vector: scalar features, then per-axis spectra.

use super::{FeatureVector, RawSample};
use crate::config::FeaturesConfig;
use crate::error::{ExtractionError, ValidationError};

/// Turns one raw sample into a feature vector of `dim()` elements.
pub trait FeatureExtractor: Send + Sync {
    fn dim(&self) -> usize;

    /// Structural checks that can run before a sample is buffered.
    fn validate(&self, _sample: &RawSample) -> Result<(), ValidationError> {
        Ok(())
    }

    fn extract(&self, sample: &RawSample) -> Result<FeatureVector, ExtractionError>;
}

/// Layout: peak_freq xyz, rms xyz, kurtosis, spectrum_x, spectrum_y, spectrum_z.
#[derive(Debug, Clone)]
pub struct VibrationExtractor {
    spectrum_bins: usize,
}

const SCALAR_FEATURES: usize = 7;

impl VibrationExtractor {
    pub fn new(config: &FeaturesConfig) -> Self {
        Self {
            spectrum_bins: config.spectrum_bins,
        }
    }
}

impl Default for VibrationExtractor {
    fn default() -> Self {
        Self::new(&FeaturesConfig::default())
    }
}

impl FeatureExtractor for VibrationExtractor {
    fn dim(&self) -> usize {
        SCALAR_FEATURES + 3 * self.spectrum_bins
    }

    fn validate(&self, sample: &RawSample) -> Result<(), ValidationError> {
        for (axis, spectrum) in sample.spectra() {
            if let Some(bins) = spectrum {
                if bins.len() != self.spectrum_bins {
                    return Err(ValidationError::SpectrumLength {
                        axis,
                        expected: self.spectrum_bins,
                        got: bins.len(),
                    });
                }
            }
        }
        Ok(())
    }

    fn extract(&self, sample: &RawSample) -> Result<FeatureVector, ExtractionError> {
        self.validate(sample)?;

        let mut values = Vec::with_capacity(self.dim());
        for (name, v) in sample.scalars() {
            if !v.is_finite() {
                return Err(ExtractionError::NonFinite(name));
            }
            values.push(v);
        }
        for (axis, spectrum) in sample.spectra() {
            match spectrum {
                Some(bins) => {
                    if bins.iter().any(|b| !b.is_finite()) {
                        return Err(ExtractionError::NonFinite(match axis {
                            'x' => "spectrum_x",
                            'y' => "spectrum_y",
                            _ => "spectrum_z",
                        }));
                    }
                    values.extend_from_slice(bins);
                }
                None => values.extend(std::iter::repeat(0.0).take(self.spectrum_bins)),
            }
        }
        Ok(FeatureVector::new(values))
    }
}
