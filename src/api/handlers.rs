//! Request handlers. Ingestion may retrain synchronously, so every call into
//! the manager runs on the blocking pool.

use crate::error::IngestError;
use crate::features::RawSample;
use crate::lifecycle::{LifecycleManager, Outcome, RetrainReport, StatusSnapshot};
use crate::storage::{AuditRecord, PredictionLog};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Local;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<LifecycleManager>,
    /// Prediction audit log; `None` disables auditing
    pub audit: Option<Arc<PredictionLog>>,
}

/// Per-sample entry of a `/data` response
#[derive(Debug, Clone, Serialize)]
pub struct SampleResult {
    pub sample: usize,
    pub mode: Option<String>,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrain: Option<RetrainReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomaly_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_anomaly: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_generation: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SampleResult {
    fn empty(sample: usize, mode: Option<String>, status: &'static str) -> Self {
        Self {
            sample,
            mode,
            status,
            buffer_size: None,
            retrain: None,
            anomaly_score: None,
            is_anomaly: None,
            model_generation: None,
            kind: None,
            message: None,
        }
    }

    fn error(sample: usize, mode: Option<String>, kind: &'static str, message: String) -> Self {
        Self {
            kind: Some(kind),
            message: Some(message),
            ..Self::empty(sample, mode, "error")
        }
    }

    fn from_outcome(sample: usize, mode: Option<String>, outcome: Outcome) -> Self {
        match outcome {
            Outcome::Buffered {
                buffer_size,
                retrain,
            } => Self {
                buffer_size: Some(buffer_size),
                retrain,
                ..Self::empty(sample, mode, "buffered")
            },
            Outcome::Scored {
                verdict,
                generation,
            } => Self {
                anomaly_score: Some(verdict.score),
                is_anomaly: Some(verdict.is_anomaly),
                model_generation: Some(generation),
                ..Self::empty(
                    sample,
                    mode,
                    if verdict.is_anomaly { "anomaly" } else { "normal" },
                )
            },
            Outcome::Error(e) => Self::error(sample, mode, e.kind(), e.to_string()),
        }
    }
}

fn error_response(status: StatusCode, kind: &str, message: impl Into<String>) -> Response {
    let body = json!({
        "status": "error",
        "kind": kind,
        "message": message.into(),
    });
    (status, Json(body)).into_response()
}

/// Ingest one or more samples in order; per-sample failures never abort siblings.
pub async fn receive_data(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let timestamp = Local::now().format("%H:%M:%S").to_string();
    let items = match payload {
        Ok(Json(Value::Array(items))) => items,
        Ok(Json(obj @ Value::Object(_))) => vec![obj],
        Ok(Json(_)) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "validation",
                "Expected JSON array or object",
            )
        }
        Err(rejection) => {
            warn!(error = %rejection, "rejected non-JSON request");
            return error_response(StatusCode::BAD_REQUEST, "validation", rejection.body_text());
        }
    };
    info!(samples = items.len(), "batch received");

    let joined = tokio::task::spawn_blocking(move || {
        items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| ingest_one(&state, idx + 1, item))
            .collect::<Vec<_>>()
    })
    .await;

    match joined {
        Ok(results) => {
            let body = json!({
                "status": "success",
                "timestamp": timestamp,
                "samples_processed": results.len(),
                "results": results,
            });
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => {
            error!(error = %e, "batch processing aborted");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string())
        }
    }
}

fn ingest_one(state: &AppState, index: usize, item: Value) -> SampleResult {
    let raw_mode = item.get("mode").and_then(Value::as_str).map(str::to_string);
    let sample: RawSample = match serde_json::from_value(item) {
        Ok(s) => s,
        Err(e) => {
            return SampleResult::error(index, raw_mode, "validation", format!("malformed sample: {}", e))
        }
    };

    let outcome = state.manager.ingest(sample.clone());
    if let (Outcome::Scored { verdict, generation }, Some(audit)) = (&outcome, &state.audit) {
        // The outcome stands even if the audit write fails.
        if let Err(e) = audit.record(&AuditRecord::new(sample, verdict, *generation)) {
            warn!(sample = index, error = %e, "audit log write failed");
        }
    }
    if let Outcome::Error(IngestError::ModelNotTrained) = &outcome {
        info!(sample = index, "prediction requested before first training run");
    }
    SampleResult::from_outcome(index, raw_mode, outcome)
}

#[derive(Serialize)]
struct StatusResponse {
    #[serde(flatten)]
    status: StatusSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    predictions_logged: Option<u64>,
}

pub async fn get_status(State(state): State<AppState>) -> Response {
    let joined = tokio::task::spawn_blocking(move || {
        let predictions_logged = state.audit.as_ref().and_then(|a| match a.count() {
            Ok(n) => Some(n),
            Err(e) => {
                warn!(error = %e, "audit count unavailable");
                None
            }
        });
        StatusResponse {
            status: state.manager.status(),
            predictions_logged,
        }
    })
    .await;

    match joined {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string()),
    }
}

pub async fn reset_model(State(state): State<AppState>) -> Response {
    let joined = tokio::task::spawn_blocking(move || state.manager.reset()).await;
    match joined {
        Ok(Ok(())) => (
            StatusCode::OK,
            Json(json!({"status": "success", "message": "Model reset successfully"})),
        )
            .into_response(),
        Ok(Err(e)) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "persistence", e.to_string()),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string()),
    }
}
