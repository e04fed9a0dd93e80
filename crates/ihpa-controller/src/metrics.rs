//! `/metrics` and `/health` HTTP server, built directly on an axum `Router`
//! over a `TcpListener` and the bare `prometheus` crate registry.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, Registry, TextEncoder};
use tokio::net::TcpListener;

use crate::error::Result;

/// Binds `addr` and returns the bound address together with a future that
/// runs the server. Splitting bind from serve lets the caller log (or test
/// against) the actual address before the server starts accepting.
pub async fn serve_with_addr(
    addr: &str,
    registry: Registry,
) -> Result<(SocketAddr, impl std::future::Future<Output = Result<()>>)> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(Arc::new(registry));

    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(%local_addr, "metrics server listening");

    let server_future = async move {
        axum::serve(listener, app).await.map_err(|err| {
            tracing::error!(%err, "metrics server exited");
            std::io::Error::other(err).into()
        })
    };

    Ok((local_addr, server_future))
}

async fn metrics_handler(State(registry): State<Arc<Registry>>) -> Response {
    let metric_families = registry.gather();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (StatusCode::OK, buffer).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, format!("failed to encode metrics: {err}")).into_response(),
    }
}

async fn health_handler() -> Response {
    (StatusCode::OK, "OK").into_response()
}
