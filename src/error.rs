//! Error taxonomy. Every failure in the core is a value; nothing here aborts the process.

use thiserror::Error;

/// Malformed sample: rejected per sample, siblings in the same batch still run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("unrecognized mode '{0}' (expected 'training' or 'prediction')")]
    UnknownMode(String),
    #[error("spectrum_{axis} has {got} bins, expected {expected}")]
    SpectrumLength {
        axis: char,
        expected: usize,
        got: usize,
    },
    #[error("feature vector has {got} elements, model expects {expected}")]
    Dimension { expected: usize, got: usize },
}

/// Raised by a feature extractor for a single sample.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractionError {
    #[error("field '{0}' is not a finite number")]
    NonFinite(&'static str),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Per-sample ingest failure, carried in `Outcome::Error`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IngestError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("model not trained yet")]
    ModelNotTrained,
    #[error("feature extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
}

impl IngestError {
    /// Stable kind tag for transport responses.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Validation(_) => "validation",
            IngestError::ModelNotTrained => "model_not_trained",
            IngestError::Extraction(_) => "extraction",
        }
    }
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("persisted model format v{found} is not supported (expected v{expected})")]
    IncompatibleFormat { found: u32, expected: u32 },
    #[error("persisted model state is corrupt: {0}")]
    Corrupt(String),
    #[error("storage lock poisoned")]
    Poisoned,
}

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("training batch is empty")]
    EmptyBatch,
    #[error("sample {index} of the training batch failed extraction: {source}")]
    Extraction {
        index: usize,
        #[source]
        source: ExtractionError,
    },
    #[error("model fit failed: {0}")]
    Fit(String),
    #[error("persisting trained model failed: {0}")]
    Persistence(#[from] PersistenceError),
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("payload encryption failed")]
    Crypto,
    #[error("payload encoding: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("audit log lock poisoned")]
    Poisoned,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("config file unreadable: {0}")]
    Read(#[from] std::io::Error),
    #[error("config file malformed: {0}")]
    Parse(#[from] serde_json::Error),
}
