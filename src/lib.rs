//! Vibewatch Agent — online train/score anomaly detection for vibration sensors.
//!
//! Modular structure:
//! - [`features`] — Sample schema and fixed-length feature extraction
//! - [`model`] — Standardization and isolation-forest detector
//! - [`policy`] — Dual-signal anomaly decision
//! - [`lifecycle`] — Training buffer, retrain trigger, live model ownership
//! - [`storage`] — Persisted model pair and encrypted prediction audit log
//! - [`api`] — HTTP transport
//! - [`logging`] — Structured JSON logging

pub mod api;
pub mod config;
pub mod error;
pub mod features;
pub mod lifecycle;
pub mod logging;
pub mod model;
pub mod policy;
pub mod storage;

pub use config::ServiceConfig;
pub use features::{FeatureExtractor, FeatureVector, RawSample, SampleMode, VibrationExtractor};
pub use lifecycle::{LifecycleManager, Outcome, RetrainReport, StatusSnapshot};
pub use logging::StructuredLogger;
pub use model::{AnomalyModel, IsolationForest, ModelState, Scaler};
pub use policy::{AnomalyPolicy, Verdict};
pub use storage::{ModelStore, PredictionLog, SqliteModelStore};
