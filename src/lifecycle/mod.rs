//! Online train/score lifecycle.
//!
//! [`LifecycleManager`] owns the live model pair, the training buffer and the
//! sample counter behind a single lock. Training-mode samples, explicit
//! retrains and resets take the write side for the whole call; scoring and
//! status take the read side. Retraining runs synchronously inside the call
//! that filled the buffer.

mod buffer;
mod retrain;

pub use buffer::TrainingBuffer;
pub use retrain::{fit_model_state, TrainedBatch};

use crate::config::{ServiceConfig, TrainingConfig};
use crate::error::{IngestError, PersistenceError, TrainError};
use crate::features::{FeatureExtractor, RawSample, SampleMode};
use crate::model::ModelState;
use crate::policy::{AnomalyPolicy, Verdict};
use crate::storage::ModelStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info, warn};

/// Result of a retrain attempted while buffering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RetrainReport {
    Trained { generation: u64, samples: usize },
    Failed { reason: String },
}

/// Per-sample result of [`LifecycleManager::ingest`].
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Buffered {
        buffer_size: usize,
        retrain: Option<RetrainReport>,
    },
    Scored {
        verdict: Verdict,
        generation: u64,
    },
    Error(IngestError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub model_trained: bool,
    pub model_generation: Option<u64>,
    pub trained_at: Option<DateTime<Utc>>,
    pub training_buffer_size: usize,
    pub training_buffer_capacity: usize,
    pub total_samples_received: u64,
}

struct LifecycleState {
    model: Option<ModelState>,
    buffer: TrainingBuffer,
    total_samples: u64,
}

pub struct LifecycleManager {
    training: TrainingConfig,
    policy: AnomalyPolicy,
    extractor: Arc<dyn FeatureExtractor>,
    store: Arc<dyn ModelStore>,
    state: RwLock<LifecycleState>,
}

impl LifecycleManager {
    /// Build the manager, resuming from any persisted model. An unreadable or
    /// incompatible persisted model is logged and the service starts untrained.
    pub fn open(
        config: &ServiceConfig,
        extractor: Arc<dyn FeatureExtractor>,
        store: Arc<dyn ModelStore>,
    ) -> Self {
        let model = match store.load() {
            Ok(Some(state)) if state.dim() == extractor.dim() => {
                info!(
                    generation = state.generation,
                    trained_at = %state.trained_at,
                    backend = store.backend_name(),
                    "loaded existing model"
                );
                Some(state)
            }
            Ok(Some(state)) => {
                warn!(
                    model_dim = state.dim(),
                    extractor_dim = extractor.dim(),
                    "persisted model does not match feature layout; ignoring it"
                );
                None
            }
            Ok(None) => {
                info!("no existing model; will train when data arrives");
                None
            }
            Err(e) => {
                warn!(error = %e, "failed to load persisted model; starting untrained");
                None
            }
        };

        Self {
            training: config.training.clone(),
            policy: AnomalyPolicy::new(config.policy.clone()),
            extractor,
            store,
            state: RwLock::new(LifecycleState {
                model,
                buffer: TrainingBuffer::new(config.training.training_buffer_size),
                total_samples: 0,
            }),
        }
    }

    // Every mutation is all-or-nothing, so a poisoned lock still guards consistent state.
    fn read(&self) -> RwLockReadGuard<'_, LifecycleState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, LifecycleState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Route one sample to the training buffer or to scoring.
    pub fn ingest(&self, sample: RawSample) -> Outcome {
        let mode = match sample.mode() {
            Ok(mode) => mode,
            Err(e) => return Outcome::Error(e.into()),
        };
        if let Err(e) = self.extractor.validate(&sample) {
            return Outcome::Error(e.into());
        }
        match mode {
            SampleMode::Training => self.buffer_sample(sample),
            SampleMode::Prediction => self.score(&sample),
        }
    }

    fn buffer_sample(&self, sample: RawSample) -> Outcome {
        let mut state = self.write();
        state.total_samples += 1;
        let full = state.buffer.push(sample);
        debug!(
            buffer_size = state.buffer.len(),
            capacity = state.buffer.capacity(),
            "training sample buffered"
        );

        let retrain = if full {
            // The batch is dropped whatever the retrain result.
            let batch = state.buffer.drain();
            Some(match self.retrain_locked(&mut state, &batch) {
                Ok(generation) => RetrainReport::Trained {
                    generation,
                    samples: batch.len(),
                },
                Err(e) => {
                    error!(error = %e, samples = batch.len(), "retrain failed; batch dropped");
                    RetrainReport::Failed {
                        reason: e.to_string(),
                    }
                }
            })
        } else {
            None
        };

        Outcome::Buffered {
            buffer_size: state.buffer.len(),
            retrain,
        }
    }

    fn score(&self, sample: &RawSample) -> Outcome {
        let state = self.read();
        let Some(model) = state.model.as_ref() else {
            return Outcome::Error(IngestError::ModelNotTrained);
        };
        let features = match self.extractor.extract(sample) {
            Ok(fv) => fv,
            Err(e) => return Outcome::Error(e.into()),
        };
        match self.policy.classify(&features, &model.scaler, &model.model) {
            Ok(verdict) => {
                if verdict.is_anomaly {
                    warn!(
                        score = verdict.score,
                        label = ?verdict.label,
                        threshold = self.policy.config().anomaly_threshold,
                        device_id = sample.device_id.as_deref().unwrap_or(""),
                        "anomaly detected"
                    );
                } else {
                    debug!(score = verdict.score, "normal operation");
                }
                Outcome::Scored {
                    verdict,
                    generation: model.generation,
                }
            }
            Err(e) => Outcome::Error(e.into()),
        }
    }

    /// Retrain on `samples` and swap the live pair in once it is persisted.
    /// The training buffer is left untouched.
    pub fn retrain(&self, samples: &[RawSample]) -> Result<u64, TrainError> {
        let mut state = self.write();
        self.retrain_locked(&mut state, samples)
    }

    fn retrain_locked(
        &self,
        state: &mut LifecycleState,
        samples: &[RawSample],
    ) -> Result<u64, TrainError> {
        let generation = state.model.as_ref().map_or(1, |m| m.generation + 1);
        info!(samples = samples.len(), generation, "training model");

        let trained = fit_model_state(samples, self.extractor.as_ref(), &self.training, generation)?;
        self.store.save(&trained.state)?;
        if let Err(e) = self.store.save_training_snapshot(generation, &trained.features) {
            warn!(error = %e, generation, "training snapshot not written");
        }

        info!(
            generation,
            offset = trained.state.model.offset(),
            backend = self.store.backend_name(),
            "model trained and saved"
        );
        state.model = Some(trained.state);
        Ok(generation)
    }

    pub fn status(&self) -> StatusSnapshot {
        let state = self.read();
        StatusSnapshot {
            model_trained: state.model.is_some(),
            model_generation: state.model.as_ref().map(|m| m.generation),
            trained_at: state.model.as_ref().map(|m| m.trained_at),
            training_buffer_size: state.buffer.len(),
            training_buffer_capacity: state.buffer.capacity(),
            total_samples_received: state.total_samples,
        }
    }

    /// Back to a fresh start. The in-memory reset always happens; a failure to
    /// delete persisted artifacts is returned afterwards.
    pub fn reset(&self) -> Result<(), PersistenceError> {
        let mut state = self.write();
        state.model = None;
        state.buffer.clear();
        state.total_samples = 0;

        match self.store.delete() {
            Ok(()) => {
                info!("model and training data reset");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "reset: persisted model not deleted");
                Err(e)
            }
        }
    }

    /// The live pair, if any (a clone; the manager keeps ownership).
    pub fn model_state(&self) -> Option<ModelState> {
        self.read().model.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::VibrationExtractor;
    use crate::storage::InMemoryModelStore;

    fn manager(buffer: usize) -> LifecycleManager {
        let mut config = ServiceConfig::default();
        config.training.training_buffer_size = buffer;
        config.training.n_estimators = 20;
        LifecycleManager::open(
            &config,
            Arc::new(VibrationExtractor::default()),
            Arc::new(InMemoryModelStore::new()),
        )
    }

    fn training(i: usize) -> RawSample {
        RawSample {
            rms_x: Some(1.0 + (i % 4) as f64 * 0.1),
            peak_freq_z: Some(40.0 + (i % 6) as f64),
            ..Default::default()
        }
        .with_mode(SampleMode::Training)
    }

    #[test]
    fn unknown_mode_leaves_state_untouched() {
        let m = manager(5);
        let before = m.status();
        let out = m.ingest(RawSample {
            mode: Some("replay".into()),
            ..Default::default()
        });
        assert!(matches!(out, Outcome::Error(IngestError::Validation(_))));
        assert_eq!(m.status(), before);
    }

    #[test]
    fn wrong_spectrum_length_is_rejected_before_buffering() {
        let m = manager(5);
        let out = m.ingest(RawSample {
            spectrum_x: Some(vec![1.0; 3]),
            ..Default::default()
        });
        assert!(matches!(out, Outcome::Error(IngestError::Validation(_))));
        assert_eq!(m.status().training_buffer_size, 0);
        assert_eq!(m.status().total_samples_received, 0);
    }

    #[test]
    fn buffer_fill_reports_size_then_retrains() {
        let m = manager(4);
        for i in 0..3 {
            assert_eq!(
                m.ingest(training(i)),
                Outcome::Buffered {
                    buffer_size: i + 1,
                    retrain: None
                }
            );
        }
        assert_eq!(
            m.ingest(training(3)),
            Outcome::Buffered {
                buffer_size: 0,
                retrain: Some(RetrainReport::Trained {
                    generation: 1,
                    samples: 4
                })
            }
        );
        let status = m.status();
        assert!(status.model_trained);
        assert_eq!(status.model_generation, Some(1));
        assert_eq!(status.total_samples_received, 4);
    }

    #[test]
    fn failed_retrain_drops_batch_and_keeps_untrained() {
        let m = manager(3);
        m.ingest(training(0));
        m.ingest(RawSample {
            kurtosis: Some(f64::NAN),
            ..Default::default()
        });
        let out = m.ingest(training(2));
        match out {
            Outcome::Buffered {
                buffer_size: 0,
                retrain: Some(RetrainReport::Failed { reason }),
            } => assert!(reason.contains("sample 1")),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(!m.status().model_trained);
    }

    #[test]
    fn prediction_does_not_count_as_training_sample() {
        let m = manager(3);
        for i in 0..3 {
            m.ingest(training(i));
        }
        let out = m.ingest(training(1).with_mode(SampleMode::Prediction));
        assert!(matches!(out, Outcome::Scored { generation: 1, .. }));
        assert_eq!(m.status().total_samples_received, 3);
    }
}
