//! Mock ClusterClient for unit testing
//!
//! This module provides an in-memory implementation of [`ClusterClientTrait`]
//! that can be used in unit tests without a running API server. It models the
//! API server behaviour the reconcilers rely on:
//!
//! - `create` on an existing name fails with [`ClusterError::Conflict`]
//! - every write bumps `metadata.resourceVersion`
//! - `replace` with a stale `resourceVersion` fails with [`ClusterError::Conflict`]
//! - a Deployment's `spec.selector` is immutable ([`ClusterError::Invalid`])
//! - server-side apply merges top-level spec fields: a field the applied
//!   object leaves unset keeps the stored value from other writers
//! - Services get a `clusterIP` assigned on create
//!
//! Every write is recorded so tests can assert on exactly what was sent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::Service;

use crate::cluster_trait::ClusterClientTrait;
use crate::error::ClusterError;
use crate::key::ObjectKey;

/// A write request received by the mock, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedWrite {
    CreateDeployment(Deployment),
    ApplyDeployment {
        deployment: Deployment,
        field_manager: String,
        force: bool,
    },
    CreateService(Service),
    ReplaceService(Service),
}

/// Mock ClusterClient for testing
///
/// Cloning shares the underlying store, so a test can keep a handle for
/// assertions while the reconciler owns another.
#[derive(Clone, Default)]
pub struct MockClusterClient {
    deployments: Arc<Mutex<HashMap<ObjectKey, Deployment>>>,
    services: Arc<Mutex<HashMap<ObjectKey, Service>>>,
    writes: Arc<Mutex<Vec<RecordedWrite>>>,
    reads: Arc<Mutex<usize>>,
    next_get_error: Arc<Mutex<Option<ClusterError>>>,
    next_write_error: Arc<Mutex<Option<ClusterError>>>,
    after_next_get: Arc<Mutex<Option<Box<dyn FnOnce() + Send>>>>,
    // Counter for resourceVersion and clusterIP allocation
    next_version: Arc<Mutex<u64>>,
}

impl std::fmt::Debug for MockClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockClusterClient")
            .field("deployments", &lock(&self.deployments).len())
            .field("services", &lock(&self.services).len())
            .field("writes", &lock(&self.writes).len())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockClusterClient {
    /// Create an empty mock cluster
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a Deployment as if another actor had created it (not recorded as a write)
    pub fn insert_deployment(&self, mut deployment: Deployment) {
        let key = key_of(&deployment);
        self.stamp_server_fields(&mut deployment.metadata);
        lock(&self.deployments).insert(key, deployment);
    }

    /// Seed a Service as if another actor had created it (not recorded as a write)
    pub fn insert_service(&self, mut service: Service) {
        let key = key_of(&service);
        self.stamp_server_fields(&mut service.metadata);
        lock(&self.services).insert(key, service);
    }

    /// Current stored Deployment, if any
    pub fn deployment(&self, key: &ObjectKey) -> Option<Deployment> {
        lock(&self.deployments).get(key).cloned()
    }

    /// Current stored Service, if any
    pub fn service(&self, key: &ObjectKey) -> Option<Service> {
        lock(&self.services).get(key).cloned()
    }

    /// Simulate a write by another actor: bumps the stored resourceVersion
    pub fn touch_service(&self, key: &ObjectKey) {
        let version = self.next_version();
        if let Some(svc) = lock(&self.services).get_mut(key) {
            svc.metadata.resource_version = Some(version.to_string());
        }
    }

    /// All writes received so far
    pub fn writes(&self) -> Vec<RecordedWrite> {
        lock(&self.writes).clone()
    }

    /// Number of writes received so far (including failed ones)
    pub fn write_count(&self) -> usize {
        lock(&self.writes).len()
    }

    /// Number of reads received so far
    pub fn read_count(&self) -> usize {
        *lock(&self.reads)
    }

    /// Make the next `get_*` call fail with `err`
    pub fn fail_next_get(&self, err: ClusterError) {
        *lock(&self.next_get_error) = Some(err);
    }

    /// Make the next write call fail with `err` (the write is still recorded)
    pub fn fail_next_write(&self, err: ClusterError) {
        *lock(&self.next_write_error) = Some(err);
    }

    /// Run `hook` once the next `get_*` call has been served
    pub fn after_next_get(&self, hook: impl FnOnce() + Send + 'static) {
        *lock(&self.after_next_get) = Some(Box::new(hook));
    }

    fn next_version(&self) -> u64 {
        let mut version = lock(&self.next_version);
        *version += 1;
        *version
    }

    fn stamp_server_fields(&self, meta: &mut kube::api::ObjectMeta) {
        if meta.uid.is_none() {
            meta.uid = Some(uuid::Uuid::new_v4().to_string());
        }
        meta.resource_version = Some(self.next_version().to_string());
    }

    fn begin_read(&self) -> Result<(), ClusterError> {
        *lock(&self.reads) += 1;
        lock(&self.next_get_error).take().map_or(Ok(()), Err)
    }

    fn end_read(&self) {
        let hook = lock(&self.after_next_get).take();
        if let Some(hook) = hook {
            hook();
        }
    }

    fn begin_write(&self, write: RecordedWrite) -> Result<(), ClusterError> {
        lock(&self.writes).push(write);
        lock(&self.next_write_error).take().map_or(Ok(()), Err)
    }
}

fn key_of<K: kube::Resource>(obj: &K) -> ObjectKey {
    let meta = obj.meta();
    ObjectKey::new(
        meta.namespace.clone().unwrap_or_else(|| "default".to_string()),
        meta.name.clone().unwrap_or_default(),
    )
}

fn merge_field<T: Clone>(stored: &mut Option<T>, applied: &Option<T>) {
    if applied.is_some() {
        stored.clone_from(applied);
    }
}

/// Apply `applied` over `stored` the way a merge patch does at the top level
fn merge_applied_spec(stored: &mut DeploymentSpec, applied: &DeploymentSpec) {
    stored.selector.clone_from(&applied.selector);
    stored.template.clone_from(&applied.template);
    merge_field(&mut stored.replicas, &applied.replicas);
    merge_field(&mut stored.min_ready_seconds, &applied.min_ready_seconds);
    merge_field(&mut stored.paused, &applied.paused);
    merge_field(&mut stored.progress_deadline_seconds, &applied.progress_deadline_seconds);
    merge_field(&mut stored.revision_history_limit, &applied.revision_history_limit);
    merge_field(&mut stored.strategy, &applied.strategy);
}

fn selector_of(deployment: &Deployment) -> Option<&k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector> {
    deployment.spec.as_ref().map(|spec| &spec.selector)
}

#[async_trait::async_trait]
impl ClusterClientTrait for MockClusterClient {
    async fn get_deployment(&self, key: &ObjectKey) -> Result<Deployment, ClusterError> {
        self.begin_read()?;
        let found = self.deployment(key);
        self.end_read();
        found.ok_or_else(|| {
            ClusterError::NotFound(format!("deployments.apps \"{}\" not found", key.name))
        })
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment, ClusterError> {
        self.begin_write(RecordedWrite::CreateDeployment(deployment.clone()))?;
        let key = ObjectKey::from_object(deployment)?;
        let mut store = lock(&self.deployments);
        if store.contains_key(&key) {
            return Err(ClusterError::Conflict(format!(
                "deployments.apps \"{}\" already exists",
                key.name
            )));
        }
        let mut created = deployment.clone();
        self.stamp_server_fields(&mut created.metadata);
        store.insert(key, created.clone());
        Ok(created)
    }

    async fn apply_deployment(
        &self,
        deployment: &Deployment,
        field_manager: &str,
        force: bool,
    ) -> Result<Deployment, ClusterError> {
        self.begin_write(RecordedWrite::ApplyDeployment {
            deployment: deployment.clone(),
            field_manager: field_manager.to_string(),
            force,
        })?;
        if field_manager.is_empty() {
            return Err(ClusterError::Invalid(
                "PATCH with apply requires a field manager".to_string(),
            ));
        }
        let key = ObjectKey::from_object(deployment)?;
        let mut store = lock(&self.deployments);
        let applied = match store.get(&key) {
            Some(existing) => {
                if selector_of(existing) != selector_of(deployment) {
                    return Err(ClusterError::Invalid(format!(
                        "Deployment.apps \"{}\" is invalid: spec.selector: field is immutable",
                        key.name
                    )));
                }
                let mut merged = existing.clone();
                if let Some(applied) = deployment.spec.as_ref() {
                    merge_applied_spec(merged.spec.get_or_insert_with(Default::default), applied);
                }
                if deployment.metadata.labels.is_some() {
                    merged.metadata.labels.clone_from(&deployment.metadata.labels);
                }
                if deployment.metadata.owner_references.is_some() {
                    merged
                        .metadata
                        .owner_references
                        .clone_from(&deployment.metadata.owner_references);
                }
                merged.metadata.resource_version = Some(self.next_version().to_string());
                merged
            }
            None => {
                let mut created = deployment.clone();
                self.stamp_server_fields(&mut created.metadata);
                created
            }
        };
        store.insert(key, applied.clone());
        Ok(applied)
    }

    async fn get_service(&self, key: &ObjectKey) -> Result<Service, ClusterError> {
        self.begin_read()?;
        let found = self.service(key);
        self.end_read();
        found.ok_or_else(|| ClusterError::NotFound(format!("services \"{}\" not found", key.name)))
    }

    async fn create_service(&self, service: &Service) -> Result<Service, ClusterError> {
        self.begin_write(RecordedWrite::CreateService(service.clone()))?;
        let key = ObjectKey::from_object(service)?;
        let mut store = lock(&self.services);
        if store.contains_key(&key) {
            return Err(ClusterError::Conflict(format!(
                "services \"{}\" already exists",
                key.name
            )));
        }
        let mut created = service.clone();
        self.stamp_server_fields(&mut created.metadata);
        let spec = created.spec.get_or_insert_with(Default::default);
        if spec.cluster_ip.is_none() {
            let ip = format!("10.96.0.{}", self.next_version() % 250 + 1);
            spec.cluster_ip = Some(ip.clone());
            spec.cluster_ips = Some(vec![ip]);
        }
        store.insert(key, created.clone());
        Ok(created)
    }

    async fn replace_service(&self, service: &Service) -> Result<Service, ClusterError> {
        self.begin_write(RecordedWrite::ReplaceService(service.clone()))?;
        let key = ObjectKey::from_object(service)?;
        let mut store = lock(&self.services);
        let existing = store
            .get(&key)
            .ok_or_else(|| ClusterError::NotFound(format!("services \"{}\" not found", key.name)))?;
        if service.metadata.resource_version != existing.metadata.resource_version {
            return Err(ClusterError::Conflict(format!(
                "Operation cannot be fulfilled on services \"{}\": the object has been modified; \
                 please apply your changes to the latest version and try again",
                key.name
            )));
        }
        let existing_ip = existing.spec.as_ref().and_then(|s| s.cluster_ip.clone());
        let requested_ip = service.spec.as_ref().and_then(|s| s.cluster_ip.clone());
        if requested_ip.is_some() && requested_ip != existing_ip {
            return Err(ClusterError::Invalid(format!(
                "Service \"{}\" is invalid: spec.clusterIPs[0]: Invalid value: field is immutable",
                key.name
            )));
        }
        let mut replaced = service.clone();
        replaced.metadata.uid.clone_from(&existing.metadata.uid);
        replaced.metadata.resource_version = Some(self.next_version().to_string());
        store.insert(key, replaced.clone());
        Ok(replaced)
    }
}
