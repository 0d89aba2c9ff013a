//! Kubernetes API client
//!
//! Implements [`ClusterClientTrait`] on top of `kube::Api`. Every request is
//! bounded by the configured timeout.

use std::future::Future;
use std::time::Duration;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::Client;
use tracing::debug;

use crate::cluster_trait::ClusterClientTrait;
use crate::error::ClusterError;
use crate::key::ObjectKey;

/// Control-plane client backed by a shared `kube::Client`.
///
/// `kube::Client` is cheap to clone and safe for concurrent use, so a single
/// instance is shared by every reconciliation.
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
    request_timeout: Duration,
}

impl std::fmt::Debug for KubeClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterClient")
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl KubeClusterClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `client` - Kubernetes client (e.g. from `Client::try_default()`)
    /// * `request_timeout` - Upper bound for each individual API request
    #[must_use]
    pub fn new(client: Client, request_timeout: Duration) -> Self {
        Self {
            client,
            request_timeout,
        }
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn services(&self, namespace: &str) -> Api<Service> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn bounded<T, F>(&self, request: F) -> Result<T, ClusterError>
    where
        F: Future<Output = Result<T, kube::Error>> + Send,
    {
        match tokio::time::timeout(self.request_timeout, request).await {
            Ok(result) => result.map_err(ClusterError::from),
            Err(_elapsed) => Err(ClusterError::Timeout(self.request_timeout)),
        }
    }
}

#[async_trait::async_trait]
impl ClusterClientTrait for KubeClusterClient {
    async fn get_deployment(&self, key: &ObjectKey) -> Result<Deployment, ClusterError> {
        debug!("GET Deployment {}", key);
        let api = self.deployments(&key.namespace);
        self.bounded(api.get(&key.name)).await
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment, ClusterError> {
        let key = ObjectKey::from_object(deployment)?;
        debug!("POST Deployment {}", key);
        let api = self.deployments(&key.namespace);
        self.bounded(api.create(&PostParams::default(), deployment)).await
    }

    async fn apply_deployment(
        &self,
        deployment: &Deployment,
        field_manager: &str,
        force: bool,
    ) -> Result<Deployment, ClusterError> {
        let key = ObjectKey::from_object(deployment)?;
        debug!("APPLY Deployment {} (field manager {}, force {})", key, field_manager, force);
        let api = self.deployments(&key.namespace);
        let mut params = PatchParams::apply(field_manager);
        if force {
            params = params.force();
        }
        // Server-side apply rejects requests that carry managedFields.
        let mut body = deployment.clone();
        body.metadata.managed_fields = None;
        self.bounded(api.patch(&key.name, &params, &Patch::Apply(&body))).await
    }

    async fn get_service(&self, key: &ObjectKey) -> Result<Service, ClusterError> {
        debug!("GET Service {}", key);
        let api = self.services(&key.namespace);
        self.bounded(api.get(&key.name)).await
    }

    async fn create_service(&self, service: &Service) -> Result<Service, ClusterError> {
        let key = ObjectKey::from_object(service)?;
        debug!("POST Service {}", key);
        let api = self.services(&key.namespace);
        self.bounded(api.create(&PostParams::default(), service)).await
    }

    async fn replace_service(&self, service: &Service) -> Result<Service, ClusterError> {
        let key = ObjectKey::from_object(service)?;
        debug!(
            "PUT Service {} (resourceVersion {:?})",
            key, service.metadata.resource_version
        );
        let api = self.services(&key.namespace);
        self.bounded(api.replace(&key.name, &PostParams::default(), service)).await
    }
}
