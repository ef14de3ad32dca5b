//! Local storage: the persisted model pair and the encrypted prediction audit log.

mod audit;
mod model_store;

pub use audit::{AuditRecord, PredictionLog};
pub use model_store::{InMemoryModelStore, ModelStore, SqliteModelStore};
