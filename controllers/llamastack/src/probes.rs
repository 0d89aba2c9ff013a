//! HTTP health probes and Prometheus scrape endpoint

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, TextEncoder};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::ControllerError;
use crate::metrics::Metrics;

/// Readiness flag flipped once the controller loop is running
#[derive(Clone, Debug, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    pub fn set_ready(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz(State(readiness): State<Readiness>) -> impl IntoResponse {
    if readiness.is_ready() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "controller not started")
    }
}

async fn metrics_handler(State(metrics): State<Metrics>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    match encoder.encode(&metrics.registry.gather(), &mut buffer) {
        Ok(()) => (StatusCode::OK, [("content-type", encoder.format_type())], buffer).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}

pub fn probe_router(readiness: Readiness) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(readiness)
}

pub fn metrics_router(metrics: Metrics) -> Router {
    Router::new().route("/metrics", get(metrics_handler)).with_state(metrics)
}

/// Bind the listener for one HTTP server.
pub async fn bind(name: &'static str, addr: SocketAddr) -> Result<TcpListener, ControllerError> {
    TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind {} server on {}: {}", name, addr, e);
        ControllerError::Server(e)
    })
}

/// Serve `router` on `listener` until `shutdown` fires.
pub async fn serve(name: &'static str, listener: TcpListener, router: Router, shutdown: CancellationToken) -> Result<(), ControllerError> {
    info!("Serving {} on http://{}", name, listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}
