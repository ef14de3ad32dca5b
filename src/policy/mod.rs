//! Anomaly decision policy over detector output.

mod engine;

pub use engine::{AnomalyPolicy, Verdict};
