//! Service policy
//!
//! Only `spec.selector` and `spec.ports` are owned by the operator. Every
//! other spec field (clusterIP, ipFamilies, sessionAffinity, ...) is filled
//! in by the API server and must survive an update, so drift is corrected by
//! editing those two fields on the observed object and writing it back whole.
//! The observed `resourceVersion` rides along as the concurrency token.

use cluster_client::{ClusterClientTrait, ClusterError, ObjectKey};
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use std::collections::BTreeMap;

use super::ResourcePolicy;
use crate::error::WriteOperation;

#[derive(Debug, Clone, Copy, Default)]
pub struct ServicePolicy;

fn selector(spec: Option<&ServiceSpec>) -> Option<&BTreeMap<String, String>> {
    spec.and_then(|s| s.selector.as_ref())
}

fn ports(spec: Option<&ServiceSpec>) -> Option<&Vec<ServicePort>> {
    spec.and_then(|s| s.ports.as_ref())
}

#[async_trait::async_trait]
impl ResourcePolicy for ServicePolicy {
    type Object = Service;

    const KIND: &'static str = "Service";
    const UPDATE_OPERATION: WriteOperation = WriteOperation::Replace;

    async fn get(&self, client: &dyn ClusterClientTrait, key: &ObjectKey) -> Result<Service, ClusterError> {
        client.get_service(key).await
    }

    async fn create(&self, client: &dyn ClusterClientTrait, desired: &Service) -> Result<Service, ClusterError> {
        client.create_service(desired).await
    }

    fn in_sync(&self, desired: &Service, observed: &Service) -> bool {
        let (desired_spec, observed_spec) = (desired.spec.as_ref(), observed.spec.as_ref());
        selector(desired_spec) == selector(observed_spec) && ports(desired_spec) == ports(observed_spec)
    }

    async fn update(
        &self,
        client: &dyn ClusterClientTrait,
        desired: Service,
        mut observed: Service,
    ) -> Result<Service, ClusterError> {
        let desired_spec = desired.spec.unwrap_or_default();
        let spec = observed.spec.get_or_insert_with(ServiceSpec::default);
        spec.selector = desired_spec.selector;
        spec.ports = desired_spec.ports;
        client.replace_service(&observed).await
    }
}
