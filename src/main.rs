//! Vibewatch Agent entrypoint: loads config, resumes any persisted model and
//! serves the ingest/status/reset endpoints until Ctrl+C.

use std::sync::Arc;
use tracing::{info, warn};
use vibewatch_agent::{
    api::{self, AppState},
    config::ServiceConfig,
    features::VibrationExtractor,
    lifecycle::LifecycleManager,
    logging::StructuredLogger,
    storage::{PredictionLog, SqliteModelStore},
};

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Ctrl+C handler unavailable");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config_path = std::env::var("VIBEWATCH_CONFIG")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| std::path::PathBuf::from("config.json"));
    let (mut config, load_error) = match ServiceConfig::try_load(&config_path) {
        Ok(c) => (c, None),
        Err(e) => (ServiceConfig::default(), Some(e)),
    };
    let rejected = config.apply_env_overrides();

    // Nothing above can log yet; report it once the subscriber is up.
    StructuredLogger::init(config.log.json, &config.log.level);
    if let Some(e) = load_error {
        warn!(path = %config_path.display(), error = %e, "config unreadable; using defaults");
    }
    for r in &rejected {
        warn!(key = r.key, value = %r.value, "ignoring unparsable override");
    }
    config.validate()?;

    info!(
        data_dir = ?config.data_dir,
        buffer_size = config.training.training_buffer_size,
        threshold = config.policy.anomaly_threshold,
        contamination = config.training.contamination,
        "vibewatch agent starting"
    );

    std::fs::create_dir_all(&config.data_dir)?;
    let store = Arc::new(SqliteModelStore::open(&config.data_dir.join("model.db"))?);
    let extractor = Arc::new(VibrationExtractor::new(&config.features));
    let manager = Arc::new(LifecycleManager::open(&config, extractor, store));

    let audit = if config.audit.enabled {
        // In production: from Secure Enclave / Keystore
        let secret = std::env::var("VIBEWATCH_AUDIT_SECRET")
            .unwrap_or_else(|_| "device-secret-placeholder".to_string());
        Some(Arc::new(PredictionLog::open(
            &config.data_dir.join("audit.db"),
            secret.as_bytes(),
        )?))
    } else {
        None
    };

    let app = api::router(AppState { manager, audit });
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(address = %config.listen_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("vibewatch agent stopped");
    Ok(())
}
