//! Reconciliation of the objects owned by a LlamaStackDistribution.
//!
//! The skeleton in this module is shared by every managed kind:
//!
//! 1. attach the controller owner reference to the desired object
//! 2. read the observed object
//! 3. absent: create; in sync: nothing; drifted: kind-specific update
//!
//! Each call performs at most one read and one write and never retries; the
//! caller owns requeue and backoff. Per-kind equality and update strategy
//! live in:
//! - `deployment`: full-spec equality, server-side apply keeping the observed selector
//! - `service`: selector + ports equality, full update of the observed object

pub mod deployment;
pub mod service;


use std::fmt;
use std::sync::Arc;

use cluster_client::{ClusterClientTrait, ClusterError, ObjectKey};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::Resource;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{ReconcileError, WriteOperation};
use crate::ownership::bind_owner;
use crate::reconcile_helpers::{cancellable, fetch_observed, Observed};

pub use deployment::DeploymentPolicy;
pub use service::ServicePolicy;

/// Field manager used for server-side apply.
pub const FIELD_MANAGER: &str = "llama-stack-operator";

/// What a successful reconciliation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Observed state already matched; no write was issued
    Unchanged,
    /// The object did not exist and was created
    Created,
    /// The object existed and was brought back in line
    Updated,
}

impl ReconcileOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::Created => "created",
            Self::Updated => "updated",
        }
    }
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-kind reconciliation policy: how to read, compare, create and update.
#[async_trait::async_trait]
pub trait ResourcePolicy: Send + Sync {
    /// The managed object type
    type Object: Resource + Clone + fmt::Debug + Send + Sync;

    /// Kind name used in logs and errors
    const KIND: &'static str;

    /// Write issued on the drifted branch
    const UPDATE_OPERATION: WriteOperation;

    async fn get(
        &self,
        client: &dyn ClusterClientTrait,
        key: &ObjectKey,
    ) -> Result<Self::Object, ClusterError>;

    async fn create(
        &self,
        client: &dyn ClusterClientTrait,
        desired: &Self::Object,
    ) -> Result<Self::Object, ClusterError>;

    /// True when `observed` already satisfies `desired`.
    fn in_sync(&self, desired: &Self::Object, observed: &Self::Object) -> bool;

    /// Bring `observed` in line with `desired` with a single write.
    async fn update(
        &self,
        client: &dyn ClusterClientTrait,
        desired: Self::Object,
        observed: Self::Object,
    ) -> Result<Self::Object, ClusterError>;
}

/// Reconcile one managed object against the API server.
pub async fn reconcile_object<P, O>(
    client: &dyn ClusterClientTrait,
    policy: &P,
    owner: &O,
    mut desired: P::Object,
    cancel: &CancellationToken,
) -> Result<ReconcileOutcome, ReconcileError>
where
    P: ResourcePolicy,
    O: Resource<DynamicType = ()> + Sync,
{
    let kind = P::KIND;
    let key = ObjectKey::from_object(&desired).map_err(|e| ReconcileError::InvalidObject {
        kind,
        reason: e.to_string(),
    })?;

    bind_owner(owner, &mut desired).map_err(|source| ReconcileError::Bind {
        kind,
        key: key.clone(),
        source,
    })?;

    let observed = cancellable(
        cancel,
        kind,
        &key,
        fetch_observed(kind, &key, policy.get(client, &key)),
    )
    .await?;

    match observed {
        Observed::Absent => {
            info!("Creating {} {}", kind, key);
            let step = async {
                policy.create(client, &desired).await.map_err(|source| ReconcileError::Write {
                    kind,
                    key: key.clone(),
                    operation: WriteOperation::Create,
                    source,
                })
            };
            cancellable(cancel, kind, &key, step).await?;
            Ok(ReconcileOutcome::Created)
        }
        Observed::Found(current) if policy.in_sync(&desired, &current) => {
            debug!("{} {} already up-to-date", kind, key);
            Ok(ReconcileOutcome::Unchanged)
        }
        Observed::Found(mut current) => {
            // Whichever object the policy writes must stay owned.
            bind_owner(owner, &mut current).map_err(|source| ReconcileError::Bind {
                kind,
                key: key.clone(),
                source,
            })?;
            info!("Updating {} {}", kind, key);
            let step = async {
                policy
                    .update(client, desired, current)
                    .await
                    .map_err(|source| ReconcileError::Write {
                        kind,
                        key: key.clone(),
                        operation: P::UPDATE_OPERATION,
                        source,
                    })
            };
            cancellable(cancel, kind, &key, step).await?;
            Ok(ReconcileOutcome::Updated)
        }
    }
}

/// Reconciles the Deployments and Services owned by LlamaStackDistributions.
///
/// Holds no state between calls besides the shared client.
pub struct Reconciler {
    client: Arc<dyn ClusterClientTrait>,
    deployments: DeploymentPolicy,
    services: ServicePolicy,
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("deployments", &self.deployments)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(client: Arc<dyn ClusterClientTrait>, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            deployments: DeploymentPolicy::new(field_manager),
            services: ServicePolicy,
        }
    }

    /// Ensure the Deployment matches `desired`, owned by `owner`.
    pub async fn reconcile_deployment<O>(
        &self,
        owner: &O,
        desired: Deployment,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome, ReconcileError>
    where
        O: Resource<DynamicType = ()> + Sync,
    {
        reconcile_object(self.client.as_ref(), &self.deployments, owner, desired, cancel).await
    }

    /// Ensure the Service matches `desired`, owned by `owner`.
    pub async fn reconcile_service<O>(
        &self,
        owner: &O,
        desired: Service,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome, ReconcileError>
    where
        O: Resource<DynamicType = ()> + Sync,
    {
        reconcile_object(self.client.as_ref(), &self.services, owner, desired, cancel).await
    }
}
