//! ClusterClient trait for mocking
//!
//! This trait abstracts the control-plane operations the reconcilers need.
//! [`KubeClusterClient`](crate::KubeClusterClient) implements it against the
//! API server; tests use [`MockClusterClient`](crate::MockClusterClient).

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;

use crate::error::ClusterError;
use crate::key::ObjectKey;

/// Control-plane operations for the managed object kinds.
///
/// Implementations must be safe for concurrent use by several in-flight
/// reconciliations. All methods are single requests; none retry.
#[async_trait::async_trait]
pub trait ClusterClientTrait: Send + Sync {
    // Deployments
    async fn get_deployment(&self, key: &ObjectKey) -> Result<Deployment, ClusterError>;
    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment, ClusterError>;
    /// Server-side apply of `deployment` under `field_manager`.
    /// `force` takes ownership of fields managed by other writers.
    async fn apply_deployment(
        &self,
        deployment: &Deployment,
        field_manager: &str,
        force: bool,
    ) -> Result<Deployment, ClusterError>;

    // Services
    async fn get_service(&self, key: &ObjectKey) -> Result<Service, ClusterError>;
    async fn create_service(&self, service: &Service) -> Result<Service, ClusterError>;
    /// Full replace (PUT). The object's `resourceVersion` is the concurrency
    /// token; a stale version yields [`ClusterError::Conflict`].
    async fn replace_service(&self, service: &Service) -> Result<Service, ClusterError>;
}
