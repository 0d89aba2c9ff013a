//! LlamaStack Controller
//!
//! Reconciles `LlamaStackDistribution` custom resources into an owned
//! Deployment running the Llama Stack server and a Service in front of it.
//! Drift in either child is detected by deep comparison and corrected with a
//! single write per object and pass.

mod backoff;
mod cluster_info;
mod config;
mod controller;
mod error;
mod metrics;
mod ownership;
mod probes;
mod reconcile_helpers;
mod reconciler;
mod resources;
#[cfg(test)]
mod test_utils;

use crate::cluster_info::ClusterInfo;
use crate::config::OperatorConfig;
use crate::controller::Controller;
use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::probes::{metrics_router, probe_router, Readiness};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Already installed is fine
    let _ = rustls::crypto::ring::default_provider().install_default();

    info!("Starting LlamaStack Controller");

    let config = OperatorConfig::from_env()?;
    let cluster_info = ClusterInfo::resolve(&config.cluster_info)?;

    info!("Configuration:");
    info!("  Operator namespace: {}", cluster_info.operator_namespace);
    info!(
        "  Watch namespace: {}",
        config.watch_namespace.as_deref().unwrap_or("all namespaces")
    );
    info!(
        "  Distributions: {}",
        cluster_info.distribution_names().collect::<Vec<_>>().join(", ")
    );
    info!("  Request timeout: {:?}", config.request_timeout);

    let metrics = Metrics::new()?;
    let readiness = Readiness::default();
    let shutdown = CancellationToken::new();

    // Port clashes fail startup instead of leaving the probes unreachable
    let probe_listener = probes::bind("probes", config.probe_addr).await?;
    let metrics_listener = probes::bind("metrics", config.metrics_addr).await?;

    tokio::spawn(cancel_on_signal(shutdown.clone()));
    let probe_server = tokio::spawn(probes::serve(
        "probes",
        probe_listener,
        probe_router(readiness.clone()),
        shutdown.clone(),
    ));
    let metrics_server = tokio::spawn(probes::serve(
        "metrics",
        metrics_listener,
        metrics_router(metrics.clone()),
        shutdown.clone(),
    ));

    let result = match Controller::new(&config, cluster_info, metrics, readiness, shutdown.clone()).await {
        Ok(controller) => controller.run().await,
        Err(e) => Err(e),
    };

    // Stop the HTTP servers whichever way the controller exited
    shutdown.cancel();
    for server in [probe_server, metrics_server] {
        match server.await {
            Ok(Err(e)) => error!("HTTP server failed: {}", e),
            Err(e) => error!("HTTP server task panicked: {}", e),
            Ok(Ok(())) => {}
        }
    }

    result
}

/// Cancel `shutdown` on Ctrl-C or SIGTERM.
async fn cancel_on_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!("Shutdown signal received");
    shutdown.cancel();
}
