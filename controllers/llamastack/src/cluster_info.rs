//! Operator-wide facts resolved once at startup
//!
//! The namespace the operator runs in and the table mapping distribution
//! names to server images.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::error::ControllerError;

/// Distribution key used when the image table is overridden from the environment
pub const RH_DISTRIBUTION_KEY: &str = "rh-dev";

/// Service-account namespace file mounted into every pod
pub const SERVICE_ACCOUNT_NAMESPACE_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

const EMBEDDED_DISTRIBUTIONS: &str = include_str!("../distributions.json");

/// Inputs for [`ClusterInfo::resolve`].
#[derive(Debug, Clone)]
pub struct ClusterInfoConfig {
    /// Explicit operator namespace; wins over the namespace file
    pub operator_namespace: Option<String>,
    pub namespace_file: PathBuf,
    /// Single image replacing the whole distribution table
    pub image_override: Option<String>,
    /// JSON object of distribution name to image
    pub distributions_json: String,
}

impl Default for ClusterInfoConfig {
    fn default() -> Self {
        Self {
            operator_namespace: None,
            namespace_file: PathBuf::from(SERVICE_ACCOUNT_NAMESPACE_FILE),
            image_override: None,
            distributions_json: EMBEDDED_DISTRIBUTIONS.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterInfo {
    pub operator_namespace: String,
    pub distribution_images: BTreeMap<String, String>,
}

impl ClusterInfo {
    pub fn new(operator_namespace: impl Into<String>, distribution_images: BTreeMap<String, String>) -> Self {
        Self {
            operator_namespace: operator_namespace.into(),
            distribution_images,
        }
    }

    /// Resolve the operator namespace and distribution images.
    ///
    /// Any failure here is fatal to startup.
    pub fn resolve(config: &ClusterInfoConfig) -> Result<Self, ControllerError> {
        let operator_namespace = resolve_namespace(config)?;

        let distribution_images = match config.image_override.as_deref().filter(|i| !i.is_empty()) {
            Some(image) => {
                info!("Using overridden distribution image {}", image);
                BTreeMap::from([(RH_DISTRIBUTION_KEY.to_string(), image.to_string())])
            }
            None => parse_distribution_images(&config.distributions_json)?,
        };
        debug!("Known distributions: {:?}", distribution_images.keys().collect::<Vec<_>>());

        Ok(Self::new(operator_namespace, distribution_images))
    }

    /// Image for a distribution name, if known
    pub fn image_for(&self, distribution: &str) -> Option<&str> {
        self.distribution_images.get(distribution).map(String::as_str)
    }

    pub fn distribution_names(&self) -> impl Iterator<Item = &str> {
        self.distribution_images.keys().map(String::as_str)
    }
}

fn resolve_namespace(config: &ClusterInfoConfig) -> Result<String, ControllerError> {
    if let Some(ns) = config.operator_namespace.as_deref().filter(|ns| !ns.is_empty()) {
        return Ok(ns.to_string());
    }
    let contents = std::fs::read_to_string(&config.namespace_file).map_err(|e| {
        ControllerError::InvalidConfig(format!(
            "operator namespace not set and {} unreadable: {}",
            config.namespace_file.display(),
            e
        ))
    })?;
    let ns = contents.trim();
    if ns.is_empty() {
        return Err(ControllerError::InvalidConfig(format!(
            "{} is empty",
            config.namespace_file.display()
        )));
    }
    Ok(ns.to_string())
}

/// Parse a JSON object of distribution name to image reference.
pub fn parse_distribution_images(json: &str) -> Result<BTreeMap<String, String>, ControllerError> {
    serde_json::from_str(json)
        .map_err(|e| ControllerError::InvalidConfig(format!("failed to parse distribution images: {e}")))
}
