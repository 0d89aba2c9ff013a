//! Main controller implementation.
//!
//! Watches `LlamaStackDistribution` resources and the Deployments and
//! Services they own, and drives each distribution's children toward the
//! state built by [`crate::resources`]. Requeue and backoff live here; the
//! reconciler itself never retries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use cluster_client::KubeClusterClient;
use crds::LlamaStackDistribution;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::api::ListParams;
use kube::{Api, Client, ResourceExt};
use kube_runtime::controller::Action;
use kube_runtime::watcher;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backoff::FibonacciBackoff;
use crate::cluster_info::ClusterInfo;
use crate::config::OperatorConfig;
use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::probes::Readiness;
use crate::reconciler::Reconciler;
use crate::resources::{build_deployment, build_service};

/// Periodic resync for distributions that reconciled cleanly
pub const RESYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);

const BACKOFF_MIN_SECS: u64 = 5;
const BACKOFF_MAX_SECS: u64 = 300;

/// Shared state handed to every reconciliation.
pub struct Context {
    pub reconciler: Reconciler,
    pub cluster_info: ClusterInfo,
    pub metrics: Metrics,
    /// Per-distribution backoff, keyed by `namespace/name`
    backoff_states: Mutex<HashMap<String, FibonacciBackoff>>,
    /// Cancels in-flight reconciliations on shutdown
    pub shutdown: CancellationToken,
}

impl Context {
    pub fn new(reconciler: Reconciler, cluster_info: ClusterInfo, metrics: Metrics, shutdown: CancellationToken) -> Self {
        Self {
            reconciler,
            cluster_info,
            metrics,
            backoff_states: Mutex::new(HashMap::new()),
            shutdown,
        }
    }

    fn reset_backoff(&self, key: &str) {
        let mut states = self.backoff_states.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(backoff) = states.get_mut(key) {
            backoff.reset();
        }
    }

    /// Next requeue delay after a failure. Permanent errors wait the maximum.
    fn next_backoff(&self, key: &str, permanent: bool) -> Duration {
        let mut states = self.backoff_states.lock().unwrap_or_else(PoisonError::into_inner);
        let backoff = states
            .entry(key.to_string())
            .or_insert_with(|| FibonacciBackoff::new(BACKOFF_MIN_SECS, BACKOFF_MAX_SECS));
        if permanent {
            backoff.max_backoff()
        } else {
            backoff.next_backoff()
        }
    }

    fn forget(&self, key: &str) {
        self.backoff_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

fn distribution_key(llsd: &LlamaStackDistribution) -> String {
    format!("{}/{}", llsd.namespace().unwrap_or_default(), llsd.name_any())
}

/// Bring the Deployment and then the Service of one distribution in line.
pub async fn reconcile(llsd: Arc<LlamaStackDistribution>, ctx: Arc<Context>) -> Result<Action, ControllerError> {
    let key = distribution_key(&llsd);

    if llsd.metadata.deletion_timestamp.is_some() {
        // Owned children are garbage collected through their owner references.
        debug!("LlamaStackDistribution {} is being deleted", key);
        ctx.forget(&key);
        return Ok(Action::await_change());
    }

    info!("Reconciling LlamaStackDistribution {}", key);

    let deployment = build_deployment(&llsd, &ctx.cluster_info)?;
    let result = ctx
        .reconciler
        .reconcile_deployment(llsd.as_ref(), deployment, &ctx.shutdown)
        .await;
    ctx.metrics.record("Deployment", &result);
    let deployment_outcome = result?;

    let service = build_service(&llsd);
    let result = ctx
        .reconciler
        .reconcile_service(llsd.as_ref(), service, &ctx.shutdown)
        .await;
    ctx.metrics.record("Service", &result);
    let service_outcome = result?;

    info!(
        "LlamaStackDistribution {} reconciled: Deployment {}, Service {}",
        key, deployment_outcome, service_outcome
    );
    ctx.reset_backoff(&key);
    Ok(Action::requeue(RESYNC_INTERVAL))
}

/// Requeue policy for failed reconciliations.
pub fn error_policy(llsd: Arc<LlamaStackDistribution>, err: &ControllerError, ctx: Arc<Context>) -> Action {
    let key = distribution_key(&llsd);

    if ctx.shutdown.is_cancelled() {
        debug!("Not requeueing {} during shutdown", key);
        return Action::await_change();
    }

    let permanent = err.is_permanent();
    let delay = ctx.next_backoff(&key, permanent);
    if permanent {
        error!("Reconciliation of {} failed: {} (retrying in {:?})", key, err, delay);
    } else {
        warn!("Reconciliation of {} failed: {} (retrying in {:?})", key, err, delay);
    }
    Action::requeue(delay)
}

/// Main controller for LlamaStackDistribution management.
pub struct Controller {
    distributions: Api<LlamaStackDistribution>,
    deployments: Api<Deployment>,
    services: Api<Service>,
    context: Arc<Context>,
    readiness: Readiness,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(
        config: &OperatorConfig,
        cluster_info: ClusterInfo,
        metrics: Metrics,
        readiness: Readiness,
        shutdown: CancellationToken,
    ) -> Result<Self, ControllerError> {
        info!("Initializing LlamaStack Controller");

        let kube_client = Client::try_default().await?;

        let (distributions, deployments, services): (Api<LlamaStackDistribution>, Api<Deployment>, Api<Service>) = match config.watch_namespace.as_deref() {
            Some(ns) => (
                Api::namespaced(kube_client.clone(), ns),
                Api::namespaced(kube_client.clone(), ns),
                Api::namespaced(kube_client.clone(), ns),
            ),
            None => (
                Api::all(kube_client.clone()),
                Api::all(kube_client.clone()),
                Api::all(kube_client.clone()),
            ),
        };

        // Fail fast when the CRD is not installed or not readable
        if let Err(e) = distributions.list(&ListParams::default().limit(1)).await {
            error!("Failed to list LlamaStackDistributions: {}", e);
            error!("Please ensure:");
            error!("  1. The CRD is installed (crdgen | kubectl apply -f -)");
            error!("  2. The operator's service account can list llamastackdistributions.llamastack.io");
            return Err(ControllerError::Kube(e));
        }

        let cluster_client = KubeClusterClient::new(kube_client, config.request_timeout);
        let reconciler = Reconciler::new(Arc::new(cluster_client), config.field_manager.clone());
        let context = Arc::new(Context::new(reconciler, cluster_info, metrics, shutdown));

        Ok(Self {
            distributions,
            deployments,
            services,
            context,
            readiness,
        })
    }

    /// Runs the controller until a termination signal arrives.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("Starting LlamaStack Controller");
        self.readiness.set_ready();

        kube_runtime::Controller::new(self.distributions, watcher::Config::default())
            .owns(self.deployments, watcher::Config::default())
            .owns(self.services, watcher::Config::default())
            .shutdown_on_signal()
            .run(reconcile, error_policy, self.context)
            .for_each(|res| async move {
                match res {
                    Ok((obj, _)) => debug!("Reconciled {}", obj),
                    Err(e) => debug!("Controller event error: {}", e),
                }
            })
            .await;

        info!("LlamaStack Controller stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::FIELD_MANAGER;
    use crate::test_utils::test_owner;
    use cluster_client::{ClusterError, MockClusterClient, ObjectKey};
    use std::collections::BTreeMap;

    fn context(mock: &MockClusterClient) -> Arc<Context> {
        let cluster_info = ClusterInfo::new(
            "llama-operator",
            BTreeMap::from([(
                "starter".to_string(),
                "docker.io/llamastack/distribution-starter:latest".to_string(),
            )]),
        );
        Arc::new(Context::new(
            Reconciler::new(Arc::new(mock.clone()), FIELD_MANAGER),
            cluster_info,
            Metrics::new().unwrap(),
            CancellationToken::new(),
        ))
    }

    #[tokio::test]
    async fn test_reconcile_creates_children_and_requeues() {
        let mock = MockClusterClient::new();
        let ctx = context(&mock);
        let llsd = Arc::new(test_owner("stack", "llama"));

        let action = reconcile(llsd.clone(), ctx.clone()).await.unwrap();
        assert_eq!(action, Action::requeue(RESYNC_INTERVAL));
        assert!(mock.deployment(&ObjectKey::new("llama", "stack")).is_some());
        assert!(mock.service(&ObjectKey::new("llama", "stack-service")).is_some());
        assert_eq!(mock.write_count(), 2);

        // Second pass leaves everything alone
        reconcile(llsd, ctx.clone()).await.unwrap();
        assert_eq!(mock.write_count(), 2);
        assert_eq!(
            ctx.metrics
                .reconcile_total
                .with_label_values(&["Service", "unchanged"])
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn test_deployment_failure_skips_service() {
        let mock = MockClusterClient::new();
        let ctx = context(&mock);
        mock.fail_next_get(ClusterError::Api {
            code: 500,
            message: "etcdserver: request timed out".to_string(),
        });

        let err = reconcile(Arc::new(test_owner("stack", "llama")), ctx.clone())
            .await
            .unwrap_err();

        assert!(!err.is_permanent());
        assert_eq!(mock.read_count(), 1);
        assert_eq!(mock.write_count(), 0);
        assert_eq!(
            ctx.metrics
                .reconcile_errors_total
                .with_label_values(&["Deployment"])
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn test_unknown_distribution_is_permanent() {
        let mock = MockClusterClient::new();
        let ctx = context(&mock);
        let mut llsd = test_owner("stack", "llama");
        llsd.spec.server.distribution.name = Some("does-not-exist".to_string());
        let llsd = Arc::new(llsd);

        let err = reconcile(llsd.clone(), ctx.clone()).await.unwrap_err();
        assert!(err.is_permanent());
        assert_eq!(mock.read_count(), 0);

        let action = error_policy(llsd, &err, ctx);
        assert_eq!(action, Action::requeue(Duration::from_secs(BACKOFF_MAX_SECS)));
    }

    #[tokio::test]
    async fn test_error_policy_backs_off_and_resets() {
        let mock = MockClusterClient::new();
        let ctx = context(&mock);
        let llsd = Arc::new(test_owner("stack", "llama"));
        let transient = ControllerError::Metrics(prometheus::Error::Msg("transient".to_string()));
        assert!(!transient.is_permanent());

        let delays: Vec<Action> = (0..3)
            .map(|_| error_policy(llsd.clone(), &transient, ctx.clone()))
            .collect();
        assert_eq!(
            delays,
            vec![
                Action::requeue(Duration::from_secs(5)),
                Action::requeue(Duration::from_secs(5)),
                Action::requeue(Duration::from_secs(10)),
            ]
        );

        reconcile(llsd.clone(), ctx.clone()).await.unwrap();
        assert_eq!(
            error_policy(llsd, &transient, ctx),
            Action::requeue(Duration::from_secs(5))
        );
    }

    #[tokio::test]
    async fn test_no_requeue_after_shutdown() {
        let mock = MockClusterClient::new();
        let ctx = context(&mock);
        ctx.shutdown.cancel();
        let llsd = Arc::new(test_owner("stack", "llama"));

        let err = reconcile(llsd.clone(), ctx.clone()).await.unwrap_err();
        assert_eq!(mock.write_count(), 0);
        assert_eq!(error_policy(llsd, &err, ctx), Action::await_change());
    }
}
