//! HTTP transport for the lifecycle manager.
//!
//! - `POST /data`   — one sample object or an array of samples
//! - `GET /status`  — model / buffer status
//! - `POST /reset`  — drop the model, buffer and persisted artifacts

mod handlers;

pub use handlers::{AppState, SampleResult};

use axum::routing::{get, post};
use axum::Router;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/data", post(handlers::receive_data))
        .route("/status", get(handlers::get_status))
        .route("/reset", post(handlers::reset_model))
        .with_state(state)
}
