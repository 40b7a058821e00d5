//! optipress server
//!
//! Run with: OPTIPRESS_BIND=0.0.0.0:3000 optipress

use anyhow::Context;
use optipress::config::ServiceConfig;
use optipress::server::{router, AppState};
use optipress::BatchExecutor;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "optipress=info,tower_http=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let config = ServiceConfig::from_env().context("Invalid OPTIPRESS_* configuration")?;
    let executor = BatchExecutor::new(config.batch_options())
        .context("Failed to build the worker pool")?;
    tracing::info!(?executor, "executor ready");

    let app = router(AppState::new(Arc::new(executor)), config.max_request_bytes);
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    tracing::info!(addr = %config.bind, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
