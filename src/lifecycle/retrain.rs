//! Batch → fresh scaler/model pair. Pure: no locks, no persistence.

use crate::config::TrainingConfig;
use crate::error::TrainError;
use crate::features::{FeatureExtractor, FeatureVector, RawSample};
use crate::model::{AnomalyModel, IsolationForest, IsolationForestParams, ModelState, Scaler};

/// A fitted state together with the extracted matrix it was trained on.
pub struct TrainedBatch {
    pub state: ModelState,
    pub features: Vec<FeatureVector>,
}

/// Extract every sample (any failure rejects the whole batch), fit the scaler,
/// standardize, and fit the isolation forest with the configured seed.
pub fn fit_model_state(
    samples: &[RawSample],
    extractor: &dyn FeatureExtractor,
    config: &TrainingConfig,
    generation: u64,
) -> Result<TrainedBatch, TrainError> {
    if samples.is_empty() {
        return Err(TrainError::EmptyBatch);
    }

    let features = samples
        .iter()
        .enumerate()
        .map(|(index, s)| {
            extractor
                .extract(s)
                .map_err(|source| TrainError::Extraction { index, source })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let x = Scaler::matrix(&features)?;
    let scaler = Scaler::fit(&x)?;
    let standardized = scaler.transform_matrix(&x);

    let mut model = IsolationForest::new(IsolationForestParams {
        n_estimators: config.n_estimators,
        max_samples: config.max_samples,
        contamination: config.contamination,
        seed: config.random_seed,
    });
    model.fit(standardized.view())?;

    Ok(TrainedBatch {
        state: ModelState::new(generation, samples.len(), scaler, model),
        features,
    })
}
