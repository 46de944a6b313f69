/// Server setup and initialization
///
/// Wires together the launcher (registry, status store, invoker) and the HTTP
/// routes. Provides the main application factory for creating the Axum app.

use crate::{
    api::{create_instance_routes, create_workflow_routes, AppState},
    config::Config,
    launcher::Launcher,
};
use anyhow::Result;
use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Create the main Axum application with all routes
///
/// Creates the base directory layout, opens the status store and primes the
/// workflow registry before any request is served.
pub async fn create_app(config: Config) -> Result<Router> {
    tracing::info!("📁 Base directory: {}", config.launcher.base_dir.display());

    tracing::info!("🏗️ Initializing launcher");
    let launcher = Launcher::new(config.launcher.clone())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize launcher: {:#}", e))?;

    tracing::info!("📊 Loading workflows from {}", config.launcher.workflows_dir().display());
    let workflow_count = launcher.get_workflows().len();
    tracing::info!("Found {} workflow(s)", workflow_count);

    let state = AppState {
        launcher: Arc::new(launcher),
    };

    tracing::info!("📡 Creating HTTP router with all endpoints");
    let app = Router::new()
        .route("/healthz", get(health_check))
        .merge(create_workflow_routes())
        .merge(create_instance_routes())
        .with_state(state);

    tracing::info!("✅ Application initialized successfully");

    Ok(app)
}

/// Install the fmt subscriber used by the server process
///
/// Honors `RUST_LOG`, defaulting to `info`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();
}

/// Start the HTTP server with the given configuration
///
/// Supervisors run in their own sessions, so stopping the server leaves
/// running instances untouched.
pub async fn start_server(config: Config) -> Result<()> {
    init_tracing();

    tracing::info!("Starting Nextflow launcher server...");

    let app = create_app(config.clone()).await?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Ctrl+C received");
}

/// Health check endpoint handler
async fn health_check() -> &'static str {
    "ok"
}
