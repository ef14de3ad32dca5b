//! HTTP transport: batch ingest responses, status, reset, audit side effects.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use vibewatch_agent::{
    api::{self, AppState},
    config::ServiceConfig,
    features::VibrationExtractor,
    lifecycle::LifecycleManager,
    storage::{InMemoryModelStore, PredictionLog},
};

fn app(buffer: usize, audit: Option<Arc<PredictionLog>>) -> Router {
    let mut config = ServiceConfig::default();
    config.training.training_buffer_size = buffer;
    config.training.n_estimators = 25;
    let manager = Arc::new(LifecycleManager::open(
        &config,
        Arc::new(VibrationExtractor::default()),
        Arc::new(InMemoryModelStore::new()),
    ));
    api::router(AppState { manager, audit })
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(b) => builder
            .header("content-type", "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn training(i: usize) -> Value {
    json!({
        "mode": "training",
        "timestamp": 1000 + i,
        "rms_x": 0.1 + (i % 5) as f64 * 0.01,
        "rms_y": 0.2 + (i % 3) as f64 * 0.02,
        "peak_freq_x": 50.0 + (i % 7) as f64,
        "kurtosis": 3.0 + (i % 4) as f64 * 0.1,
        "spectrum_x": [1.0, 0.5, 0.25, 0.1, (i % 6) as f64 * 0.01]
    })
}

#[tokio::test]
async fn batch_is_buffered_then_trained() {
    let app = app(4, None);
    let batch: Vec<Value> = (0..4).map(training).collect();
    let (status, body) = call(&app, "POST", "/data", Some(Value::Array(batch))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["samples_processed"], 4);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results[0]["status"], "buffered");
    assert_eq!(results[0]["buffer_size"], 1);
    assert_eq!(results[3]["buffer_size"], 0);
    assert_eq!(results[3]["retrain"]["result"], "trained");

    let (_, status) = call(&app, "GET", "/status", None).await;
    assert_eq!(status["model_trained"], true);
    assert_eq!(status["total_samples_received"], 4);
}

#[tokio::test]
async fn single_object_prediction_before_training() {
    let app = app(4, None);
    let (status, body) = call(&app, "POST", "/data", Some(json!({"mode": "prediction"}))).await;
    assert_eq!(status, StatusCode::OK);
    let r = &body["results"][0];
    assert_eq!(r["status"], "error");
    assert_eq!(r["kind"], "model_not_trained");
    assert_eq!(r["message"], "model not trained yet");
}

#[tokio::test]
async fn bad_samples_do_not_abort_siblings() {
    let app = app(10, None);
    let batch = json!([
        {"mode": "calibrate"},
        {"mode": "training", "rms_x": "loud"},
        {"mode": "training", "spectrum_z": [1.0]},
        training(0)
    ]);
    let (status, body) = call(&app, "POST", "/data", Some(batch)).await;
    assert_eq!(status, StatusCode::OK);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results[0]["kind"], "validation");
    assert_eq!(results[1]["kind"], "validation");
    assert_eq!(results[2]["kind"], "validation");
    assert_eq!(results[3]["status"], "buffered");
    assert_eq!(results[3]["buffer_size"], 1);
}

#[tokio::test]
async fn non_collection_body_is_rejected() {
    let app = app(4, None);
    let (status, body) = call(&app, "POST", "/data", Some(json!(42))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");

    let req = Request::builder()
        .method("POST")
        .uri("/data")
        .body(Body::from("not json"))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn predictions_are_audited() {
    let dir = tempfile::tempdir().unwrap();
    let audit = Arc::new(PredictionLog::open(&dir.path().join("audit.db"), b"test").unwrap());
    let app = app(4, Some(audit.clone()));

    let batch: Vec<Value> = (0..4).map(training).collect();
    call(&app, "POST", "/data", Some(Value::Array(batch))).await;

    let mut query = training(1);
    query["mode"] = json!("prediction");
    let (_, body) = call(&app, "POST", "/data", Some(json!([query.clone(), query]))).await;
    let r = &body["results"][0];
    assert!(r["status"] == "normal" || r["status"] == "anomaly");
    assert!(r["anomaly_score"].is_number());
    assert_eq!(r["model_generation"], 1);

    assert_eq!(audit.count().unwrap(), 2);
    let recent = audit.recent(1).unwrap();
    assert_eq!(recent[0].sample.rms_x, Some(0.1 + 0.01));

    let (_, status) = call(&app, "GET", "/status", None).await;
    assert_eq!(status["predictions_logged"], 2);
}

#[tokio::test]
async fn reset_endpoint_returns_to_fresh_state() {
    let app = app(4, None);
    let batch: Vec<Value> = (0..6).map(training).collect();
    call(&app, "POST", "/data", Some(Value::Array(batch))).await;

    let (status, body) = call(&app, "POST", "/reset", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");

    let (_, status) = call(&app, "GET", "/status", None).await;
    assert_eq!(status["model_trained"], false);
    assert_eq!(status["training_buffer_size"], 0);
    assert_eq!(status["total_samples_received"], 0);
}
