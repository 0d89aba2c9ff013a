//! Test utilities for unit testing reconcilers
//!
//! This module provides helpers for creating test data and setting up test scenarios.

use std::collections::BTreeMap;
use std::sync::Arc;

use cluster_client::MockClusterClient;
use crds::{DistributionType, LlamaStackDistribution, LlamaStackDistributionSpec, ServerSpec};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec, Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use crate::reconciler::{Reconciler, FIELD_MANAGER};

/// Uid given to every test owner
pub const TEST_OWNER_UID: &str = "6f1c2a9e-4b0d-4c55-9a43-3f1f0d6b2a10";

/// Helper to create a LlamaStackDistribution as read back from the API server
pub fn test_owner(name: &str, namespace: &str) -> LlamaStackDistribution {
    let mut owner = LlamaStackDistribution::new(
        name,
        LlamaStackDistributionSpec {
            replicas: 1,
            server: ServerSpec {
                distribution: DistributionType {
                    name: Some("starter".to_string()),
                    image: None,
                },
                container_spec: Default::default(),
            },
        },
    );
    owner.metadata.namespace = Some(namespace.to_string());
    owner.metadata.uid = Some(TEST_OWNER_UID.to_string());
    owner
}

fn meta(name: &str, namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        ..Default::default()
    }
}

/// Helper to create a Deployment selecting `app=<app_label>`
///
/// Pod template labels are fixed, so two deployments built with different
/// `app_label` values differ only in their selector.
pub fn test_deployment(name: &str, namespace: &str, app_label: &str, replicas: i32) -> Deployment {
    Deployment {
        metadata: meta(name, namespace),
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(BTreeMap::from([("app".to_string(), app_label.to_string())])),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(BTreeMap::from([("app".to_string(), "llama-stack".to_string())])),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: "llama-stack".to_string(),
                        image: Some("docker.io/llamastack/distribution-starter:latest".to_string()),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Helper to create a Service selecting `app.kubernetes.io/instance=<instance>`
pub fn test_service(name: &str, namespace: &str, instance: &str, port: i32) -> Service {
    Service {
        metadata: meta(name, namespace),
        spec: Some(ServiceSpec {
            selector: Some(BTreeMap::from([(
                "app.kubernetes.io/instance".to_string(),
                instance.to_string(),
            )])),
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port,
                target_port: Some(IntOrString::Int(port)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Helper to create a reconciler backed by a fresh mock cluster
///
/// The returned mock shares its store with the one inside the reconciler.
pub fn create_test_reconciler() -> (Reconciler, MockClusterClient) {
    let mock = MockClusterClient::new();
    let reconciler = Reconciler::new(Arc::new(mock.clone()), FIELD_MANAGER);
    (reconciler, mock)
}
