//! Integration tests for the kube-backed cluster client
//!
//! These tests require a reachable Kubernetes cluster (current kubeconfig
//! context). Set TEST_NAMESPACE to choose the namespace (default: "default").

use std::collections::BTreeMap;
use std::time::Duration;

use cluster_client::{ClusterClientTrait, ClusterError, KubeClusterClient, ObjectKey};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec, Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::api::{Api, DeleteParams};

fn namespace() -> String {
    std::env::var("TEST_NAMESPACE").unwrap_or_else(|_| "default".to_string())
}

async fn client() -> (kube::Client, KubeClusterClient) {
    // Already installed is fine
    let _ = rustls::crypto::ring::default_provider().install_default();
    let kube_client = kube::Client::try_default()
        .await
        .expect("Failed to create Kubernetes client");
    let client = KubeClusterClient::new(kube_client.clone(), Duration::from_secs(30));
    (kube_client, client)
}

fn labels(app: &str) -> BTreeMap<String, String> {
    BTreeMap::from([("app".to_string(), app.to_string())])
}

fn deployment(name: &str, app: &str, replicas: i32) -> Deployment {
    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(labels(app)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels(app)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: "pause".to_string(),
                        image: Some("registry.k8s.io/pause:3.9".to_string()),
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

#[tokio::test]
#[ignore] // Requires running cluster
async fn test_get_missing_deployment_is_not_found() {
    let (_, client) = client().await;

    let err = client
        .get_deployment(&ObjectKey::new(namespace(), "cluster-client-does-not-exist"))
        .await
        .unwrap_err();

    assert!(err.is_not_found(), "unexpected error: {err}");
}

#[tokio::test]
#[ignore]
async fn test_deployment_create_apply_and_immutable_selector() {
    let (kube_client, client) = client().await;
    let name = "cluster-client-it-deployment";

    let created = client
        .create_deployment(&deployment(name, "it", 0))
        .await
        .expect("Failed to create deployment");
    assert!(created.metadata.resource_version.is_some());

    let err = client.create_deployment(&deployment(name, "it", 0)).await.unwrap_err();
    assert!(err.is_conflict(), "second create should conflict: {err}");

    let applied = client
        .apply_deployment(&deployment(name, "it", 1), "cluster-client-it", true)
        .await
        .expect("Failed to apply deployment");
    assert_eq!(applied.spec.and_then(|s| s.replicas), Some(1));

    let err = client
        .apply_deployment(&deployment(name, "other", 1), "cluster-client-it", true)
        .await
        .unwrap_err();
    assert!(matches!(err, ClusterError::Invalid(_)), "unexpected error: {err}");

    let api: Api<Deployment> = Api::namespaced(kube_client, &namespace());
    api.delete(name, &DeleteParams::default())
        .await
        .expect("Failed to delete deployment");
}

#[tokio::test]
#[ignore]
async fn test_service_replace_with_stale_version_conflicts() {
    let (kube_client, client) = client().await;
    let name = "cluster-client-it-service";

    let created = client
        .create_service(&Service {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                selector: Some(labels("it")),
                ports: Some(vec![ServicePort {
                    port: 8321,
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        })
        .await
        .expect("Failed to create service");

    let mut updated = created.clone();
    if let Some(spec) = updated.spec.as_mut() {
        spec.selector = Some(labels("it-2"));
    }
    client.replace_service(&updated).await.expect("Failed to replace service");

    // `created` still carries the original resourceVersion
    let err = client.replace_service(&created).await.unwrap_err();
    assert!(err.is_conflict(), "unexpected error: {err}");

    let api: Api<Service> = Api::namespaced(kube_client, &namespace());
    api.delete(name, &DeleteParams::default())
        .await
        .expect("Failed to delete service");
}
