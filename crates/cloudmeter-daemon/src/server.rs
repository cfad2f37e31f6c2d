//! Metrics exposition server

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};
use cloudmeter_core::GaugeRegistry;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

const TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Build the router
pub fn router(registry: Arc<GaugeRegistry>) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/health", get(health))
        .with_state(registry)
}

/// Bind the exposition listener
pub async fn bind(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind metrics listener on {}", addr))
}

/// Serve until `shutdown` is cancelled
pub async fn serve(
    listener: TcpListener,
    registry: Arc<GaugeRegistry>,
    shutdown: CancellationToken,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(address = %addr, "Serving metrics");
    }
    axum::serve(listener, router(registry))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

async fn metrics(State(registry): State<Arc<GaugeRegistry>>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, TEXT_FORMAT)], registry.render())
}

async fn health() -> &'static str {
    "ok"
}
