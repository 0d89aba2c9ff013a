//! Deployment policy
//!
//! `spec.selector` is immutable once a Deployment exists, so the observed
//! selector is always carried over to the desired object before comparing
//! and before writing. Drift anywhere else in the spec is corrected with a
//! forced server-side apply under the operator's field manager.

use cluster_client::{ClusterClientTrait, ClusterError, ObjectKey};
use k8s_openapi::api::apps::v1::Deployment;
use tracing::debug;

use super::ResourcePolicy;
use crate::error::WriteOperation;

#[derive(Debug, Clone)]
pub struct DeploymentPolicy {
    field_manager: String,
}

impl DeploymentPolicy {
    pub fn new(field_manager: impl Into<String>) -> Self {
        Self {
            field_manager: field_manager.into(),
        }
    }
}

/// Copy the observed selector onto `desired`.
///
/// Returns true when the selectors differed.
fn adopt_observed_selector(desired: &mut Deployment, observed: &Deployment) -> bool {
    let (Some(desired_spec), Some(observed_spec)) = (desired.spec.as_mut(), observed.spec.as_ref()) else {
        return false;
    };
    if desired_spec.selector == observed_spec.selector {
        return false;
    }
    desired_spec.selector.clone_from(&observed_spec.selector);
    true
}

#[async_trait::async_trait]
impl ResourcePolicy for DeploymentPolicy {
    type Object = Deployment;

    const KIND: &'static str = "Deployment";
    const UPDATE_OPERATION: WriteOperation = WriteOperation::Apply;

    async fn get(&self, client: &dyn ClusterClientTrait, key: &ObjectKey) -> Result<Deployment, ClusterError> {
        client.get_deployment(key).await
    }

    async fn create(&self, client: &dyn ClusterClientTrait, desired: &Deployment) -> Result<Deployment, ClusterError> {
        client.create_deployment(desired).await
    }

    fn in_sync(&self, desired: &Deployment, observed: &Deployment) -> bool {
        // Fields defaulted by the API server count as drift
        let mut normalized = desired.clone();
        adopt_observed_selector(&mut normalized, observed);
        normalized.spec == observed.spec
    }

    async fn update(
        &self,
        client: &dyn ClusterClientTrait,
        mut desired: Deployment,
        observed: Deployment,
    ) -> Result<Deployment, ClusterError> {
        if adopt_observed_selector(&mut desired, &observed) {
            debug!(
                "Keeping existing selector on Deployment {}",
                desired.metadata.name.as_deref().unwrap_or_default()
            );
        }
        client.apply_deployment(&desired, &self.field_manager, true).await
    }
}
