//! Per-dimension standardization fit once on a training batch.

use crate::error::{TrainError, ValidationError};
use crate::features::FeatureVector;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Columns with a standard deviation below this are left unscaled.
const MIN_SCALE: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl Scaler {
    /// Stack the batch into an `N x D` matrix; rows must share one length.
    pub fn matrix(batch: &[FeatureVector]) -> Result<Array2<f64>, TrainError> {
        let first = batch.first().ok_or(TrainError::EmptyBatch)?;
        let dim = first.len();
        if dim == 0 {
            return Err(TrainError::Fit("feature vectors are empty".to_string()));
        }
        let mut flat = Vec::with_capacity(batch.len() * dim);
        for (i, fv) in batch.iter().enumerate() {
            if fv.len() != dim {
                return Err(TrainError::Fit(format!(
                    "row {} has {} features, expected {}",
                    i,
                    fv.len(),
                    dim
                )));
            }
            flat.extend_from_slice(fv.as_slice());
        }
        Array2::from_shape_vec((batch.len(), dim), flat).map_err(|e| TrainError::Fit(e.to_string()))
    }

    /// Column means and population standard deviations.
    pub fn fit(x: &Array2<f64>) -> Result<Self, TrainError> {
        let mean = x.mean_axis(Axis(0)).ok_or(TrainError::EmptyBatch)?;
        let std = x.std_axis(Axis(0), 0.0);
        let scale = std
            .iter()
            .map(|&s| if s.is_finite() && s >= MIN_SCALE { s } else { 1.0 })
            .collect();
        Ok(Self {
            mean: mean.to_vec(),
            scale,
        })
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, v: &[f64]) -> Result<Vec<f64>, ValidationError> {
        if v.len() != self.dim() {
            return Err(ValidationError::Dimension {
                expected: self.dim(),
                got: v.len(),
            });
        }
        Ok(v.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (m, s))| (x - m) / s)
            .collect())
    }

    pub fn transform_matrix(&self, x: &Array2<f64>) -> Array2<f64> {
        let mean = ArrayView1::from(&self.mean[..]);
        let scale = Array1::from(self.scale.clone());
        (x - &mean) / &scale
    }
}
