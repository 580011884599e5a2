//! intake-api - HTTP API server for the document intake pipeline

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use intake_api::config::DEFAULT_LOG_FILTER;
use intake_api::{build_router, ApiConfig, AppState};
use intake_core::FieldExtractor;
use intake_db::{Database, FilesystemBackend, PoolConfig};
use intake_inference::{OllamaFieldExtractor, PromptLibrary};
use intake_jobs::{
    ExtractionHandler, ExtractionOrchestrator, JobWorker, ParserRegistry, Sweeper, SweeperConfig,
    WorkerConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter (default: DEFAULT_LOG_FILTER)
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    let registry = tracing_subscriber::registry().with(env_filter);

    // Optionally create a file appender with daily rotation
    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("intake-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false)); // no ANSI in files by default
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        // Console-only output
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let config = ApiConfig::from_env();

    // Connect to database
    info!("Connecting to database...");
    let db = Database::connect_with_config(
        &config.database_url,
        PoolConfig::new().max_connections(config.db_max_connections),
    )
    .await
    .context("failed to open database")?;
    info!("Running database migrations...");
    db.migrate().await.context("failed to run migrations")?;
    info!("Database ready");

    // Initialize file storage; refuse to start on an unusable content directory
    let backend = FilesystemBackend::new(&config.file_storage_path);
    backend
        .validate()
        .await
        .map_err(|e| anyhow::anyhow!("file storage validation failed: {}", e))?;
    let db = db.with_file_storage(backend);
    info!("File storage initialized at {}", config.file_storage_path);

    // Extraction collaborators
    let prompts = Arc::new(
        PromptLibrary::load(&config.prompts_path).context("failed to load prompt library")?,
    );
    let extractor = Arc::new(OllamaFieldExtractor::from_env()?);
    match extractor.health_check().await {
        Ok(true) => info!(model = extractor.model_name(), "AI extraction service reachable"),
        _ => warn!(
            base_url = extractor.base_url(),
            "AI extraction service not reachable; runs will fail until it is"
        ),
    }
    let parser = Arc::new(ParserRegistry::with_defaults());
    for (name, healthy) in parser.health_check_all().await {
        if healthy {
            info!(adapter = %name, "Parser adapter available");
        }
    }

    // Orchestrator, worker and sweeper
    let orchestrator = ExtractionOrchestrator::from_env(db.clone());
    let handler = ExtractionHandler::new(db.clone(), parser, extractor, prompts);
    let worker = JobWorker::new(db.clone(), WorkerConfig::from_env(), Arc::new(handler))
        .with_wake(orchestrator.wake_handle())
        .start();
    let sweeper = Sweeper::new(db.clone(), SweeperConfig::from_env()).start();

    let state = AppState::new(db, orchestrator).with_max_upload_bytes(config.max_upload_bytes);
    let app = build_router(state, &config);

    // Start server
    let addr = config.bind_addr();
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped, draining background tasks");
    if let Err(e) = worker.shutdown().await {
        warn!(error = %e, "Worker was not running");
    }
    worker.join().await;
    if let Err(e) = sweeper.shutdown().await {
        warn!(error = %e, "Sweeper was not running");
    }

    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
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
                warn!(error = %e, "Failed to listen for SIGTERM");
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
    info!("Shutdown signal received");
}
