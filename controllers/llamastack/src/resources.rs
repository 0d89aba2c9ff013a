//! Desired-state builders
//!
//! Turns a `LlamaStackDistribution` into the Deployment and Service the
//! reconciler drives toward. Builders are pure; owner references are attached
//! later by the reconciler.

use std::collections::BTreeMap;

use crds::{ContainerSpec, LlamaStackDistribution, ResourceSpec};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PodSpec, PodTemplateSpec, ResourceRequirements, Service, ServicePort,
    ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use crate::cluster_info::ClusterInfo;
use crate::error::ControllerError;

pub const APP_LABEL: &str = "app";
pub const APP_LABEL_VALUE: &str = "llama-stack";
pub const INSTANCE_LABEL: &str = "app.kubernetes.io/instance";

/// Name of the Service fronting a distribution
pub fn service_name(llsd: &LlamaStackDistribution) -> String {
    format!("{}-service", llsd.name_any())
}

/// Labels carried by the server pods, also used as Deployment and Service selector
pub fn pod_labels(llsd: &LlamaStackDistribution) -> BTreeMap<String, String> {
    BTreeMap::from([
        (APP_LABEL.to_string(), APP_LABEL_VALUE.to_string()),
        (INSTANCE_LABEL.to_string(), llsd.name_any()),
    ])
}

/// Resolve the server image for a distribution.
///
/// An explicit image wins over a name lookup.
pub fn resolve_image(llsd: &LlamaStackDistribution, cluster_info: &ClusterInfo) -> Result<String, ControllerError> {
    let distribution = &llsd.spec.server.distribution;
    if let Some(image) = distribution.image.as_deref().filter(|i| !i.is_empty()) {
        return Ok(image.to_string());
    }
    let name = distribution.name.as_deref().filter(|n| !n.is_empty()).ok_or_else(|| {
        ControllerError::InvalidConfig(format!(
            "{}: distribution must set either name or image",
            llsd.name_any()
        ))
    })?;
    cluster_info.image_for(name).map(str::to_string).ok_or_else(|| {
        ControllerError::InvalidConfig(format!(
            "{}: unknown distribution {:?} (known: {})",
            llsd.name_any(),
            name,
            cluster_info.distribution_names().collect::<Vec<_>>().join(", ")
        ))
    })
}

fn metadata(llsd: &LlamaStackDistribution, name: String) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: llsd.namespace(),
        labels: Some(pod_labels(llsd)),
        ..Default::default()
    }
}

fn quantities(values: &BTreeMap<String, String>) -> Option<BTreeMap<String, Quantity>> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().map(|(k, v)| (k.clone(), Quantity(v.clone()))).collect())
}

fn resource_requirements(resources: &ResourceSpec) -> ResourceRequirements {
    ResourceRequirements {
        requests: quantities(&resources.requests),
        limits: quantities(&resources.limits),
        ..Default::default()
    }
}

fn server_container(container: &ContainerSpec, image: String) -> Container {
    let env: Vec<EnvVar> = container
        .env
        .iter()
        .map(|e| EnvVar {
            name: e.name.clone(),
            value: Some(e.value.clone()),
            ..Default::default()
        })
        .collect();

    Container {
        name: container.name.clone(),
        image: Some(image),
        ports: Some(vec![ContainerPort {
            container_port: container.port,
            ..Default::default()
        }]),
        env: (!env.is_empty()).then_some(env),
        resources: container.resources.as_ref().map(resource_requirements),
        ..Default::default()
    }
}

/// Build the desired Deployment running the Llama Stack server.
pub fn build_deployment(llsd: &LlamaStackDistribution, cluster_info: &ClusterInfo) -> Result<Deployment, ControllerError> {
    let image = resolve_image(llsd, cluster_info)?;
    let labels = pod_labels(llsd);

    Ok(Deployment {
        metadata: metadata(llsd, llsd.name_any()),
        spec: Some(DeploymentSpec {
            replicas: Some(llsd.spec.replicas),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![server_container(&llsd.spec.server.container_spec, image)],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Build the desired Service exposing the server port.
pub fn build_service(llsd: &LlamaStackDistribution) -> Service {
    let port = llsd.spec.server.container_spec.port;
    Service {
        metadata: metadata(llsd, service_name(llsd)),
        spec: Some(ServiceSpec {
            selector: Some(pod_labels(llsd)),
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
