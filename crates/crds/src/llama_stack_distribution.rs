//! LlamaStackDistribution CRD
//!
//! Declares a Llama Stack server: which distribution to run, how many
//! replicas, and how the server container is configured. The operator turns
//! one of these into a Deployment and a Service.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Container port the Llama Stack server listens on unless overridden.
pub const DEFAULT_SERVER_PORT: i32 = 8321;

/// Container name used unless overridden.
pub const DEFAULT_CONTAINER_NAME: &str = "llama-stack";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "llamastack.io",
    version = "v1alpha1",
    kind = "LlamaStackDistribution",
    shortname = "llsd",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct LlamaStackDistributionSpec {
    /// Number of server replicas
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    /// Server configuration
    pub server: ServerSpec,
}

fn default_replicas() -> i32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerSpec {
    /// Which distribution image to run
    pub distribution: DistributionType,

    /// Server container settings
    #[serde(default)]
    pub container_spec: ContainerSpec,
}

/// Selects the server image.
///
/// `image` wins when both are set; `name` is looked up in the operator's
/// distribution image table.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DistributionType {
    /// Distribution name (e.g. "starter", "ollama")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Explicit container image reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSpec {
    /// Container name
    #[serde(default = "default_container_name")]
    pub name: String,

    /// Port the server listens on
    #[serde(default = "default_port")]
    pub port: i32,

    /// Environment variables passed to the server
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvEntry>,

    /// Compute resources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceSpec>,
}

impl Default for ContainerSpec {
    fn default() -> Self {
        Self {
            name: default_container_name(),
            port: default_port(),
            env: Vec::new(),
            resources: None,
        }
    }
}

fn default_container_name() -> String {
    DEFAULT_CONTAINER_NAME.to_string()
}

fn default_port() -> i32 {
    DEFAULT_SERVER_PORT
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EnvEntry {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// Resource quantities as strings (e.g. "500m", "1Gi")
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,
}
