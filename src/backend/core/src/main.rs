//! Tierflow Worker - Main entry point
//!
//! Runs the worker pool against the configured execution backend until
//! Ctrl-C or SIGTERM.

use std::sync::Arc;

use tierflow_core::{
    config::AppConfig,
    execution::HttpExecutionBackend,
    jobs::{FileQueueBackend, InMemoryQueueBackend, JobQueue, QueueBackend, WorkerPool},
    settings::ConfigStore,
    telemetry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = match std::env::var("TIERFLOW_CONFIG") {
        Ok(path) => AppConfig::from_file(&path)?,
        Err(_) => AppConfig::load().unwrap_or_else(|e| {
            eprintln!("Warning: Could not load config: {}. Using defaults.", e);
            AppConfig::default()
        }),
    };

    telemetry::init_telemetry(&config.logging)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        settings = %config.storage.settings_path.display(),
        "Starting Tierflow worker"
    );

    let store = Arc::new(ConfigStore::open(&config.storage.settings_path)?);
    tracing::info!(
        version = store.version(),
        stages = store.routing().base_tier_by_stage.len(),
        tiers = store.routing().tiers.len(),
        "Settings loaded"
    );

    let queue_backend: Arc<dyn QueueBackend> = match &config.storage.queue_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "Using file-backed queue");
            Arc::new(FileQueueBackend::new(path))
        }
        None => {
            tracing::warn!("No queue_path configured; queued jobs are lost on exit");
            Arc::new(InMemoryQueueBackend::new())
        }
    };
    let queue = Arc::new(JobQueue::open(queue_backend, config.queue.clone()).await?);

    let backend = Arc::new(HttpExecutionBackend::new(config.backend.clone())?);
    tracing::info!(endpoint = %backend.config().endpoint(), "Execution backend ready");

    let pool = WorkerPool::new(store, queue.clone(), backend);
    let handle = pool.start()?;

    shutdown_signal().await;

    handle.shutdown_and_join().await;
    let stats = queue.stats().await;
    tracing::info!(
        pending = stats.pending,
        succeeded = stats.succeeded,
        failed = stats.failed,
        "Worker shutdown complete"
    );

    Ok(())
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
