//! Operator configuration from environment variables

use std::net::SocketAddr;
use std::time::Duration;

use crate::cluster_info::ClusterInfoConfig;
use crate::error::ControllerError;
use crate::reconciler::FIELD_MANAGER;

pub const DEFAULT_PROBE_ADDR: &str = "0.0.0.0:8081";
pub const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Namespace to watch; `None` watches all namespaces
    pub watch_namespace: Option<String>,
    pub cluster_info: ClusterInfoConfig,
    pub probe_addr: SocketAddr,
    pub metrics_addr: SocketAddr,
    /// Upper bound on each API server request
    pub request_timeout: Duration,
    pub field_manager: String,
}

impl OperatorConfig {
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let request_timeout_secs = match non_empty("REQUEST_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse::<u64>().ok().filter(|secs| *secs > 0).ok_or_else(|| {
                ControllerError::InvalidConfig(format!(
                    "REQUEST_TIMEOUT_SECS must be a positive integer, got {raw:?}"
                ))
            })?,
            None => DEFAULT_REQUEST_TIMEOUT_SECS,
        };

        Ok(Self {
            watch_namespace: non_empty("WATCH_NAMESPACE"),
            cluster_info: ClusterInfoConfig {
                operator_namespace: non_empty("OPERATOR_NAMESPACE"),
                image_override: non_empty("RELATED_IMAGE_RH_DISTRIBUTION"),
                ..Default::default()
            },
            probe_addr: parse_addr("PROBE_ADDR", non_empty("PROBE_ADDR"), DEFAULT_PROBE_ADDR)?,
            metrics_addr: parse_addr("METRICS_ADDR", non_empty("METRICS_ADDR"), DEFAULT_METRICS_ADDR)?,
            request_timeout: Duration::from_secs(request_timeout_secs),
            field_manager: FIELD_MANAGER.to_string(),
        })
    }
}

fn parse_addr(key: &str, value: Option<String>, default: &str) -> Result<SocketAddr, ControllerError> {
    let raw = value.unwrap_or_else(|| default.to_string());
    raw.trim()
        .parse()
        .map_err(|e| ControllerError::InvalidConfig(format!("{key}={raw:?} is not a socket address: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<OperatorConfig, ControllerError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        OperatorConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert!(config.watch_namespace.is_none());
        assert!(config.cluster_info.operator_namespace.is_none());
        assert!(config.cluster_info.image_override.is_none());
        assert_eq!(config.probe_addr, "0.0.0.0:8081".parse::<SocketAddr>().unwrap());
        assert_eq!(config.metrics_addr, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.field_manager, "llama-stack-operator");
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("WATCH_NAMESPACE", "llama"),
            ("OPERATOR_NAMESPACE", "llama-operator"),
            ("RELATED_IMAGE_RH_DISTRIBUTION", "registry.example.com/llama-stack:rh"),
            ("PROBE_ADDR", "127.0.0.1:9081"),
            ("REQUEST_TIMEOUT_SECS", "5"),
        ])
        .unwrap();

        assert_eq!(config.watch_namespace.as_deref(), Some("llama"));
        assert_eq!(config.cluster_info.operator_namespace.as_deref(), Some("llama-operator"));
        assert_eq!(
            config.cluster_info.image_override.as_deref(),
            Some("registry.example.com/llama-stack:rh")
        );
        assert_eq!(config.probe_addr, "127.0.0.1:9081".parse::<SocketAddr>().unwrap());
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_blank_watch_namespace_means_all() {
        let config = config_from(&[("WATCH_NAMESPACE", "  ")]).unwrap();
        assert!(config.watch_namespace.is_none());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            config_from(&[("REQUEST_TIMEOUT_SECS", "soon")]),
            Err(ControllerError::InvalidConfig(_))
        ));
        assert!(matches!(
            config_from(&[("REQUEST_TIMEOUT_SECS", "0")]),
            Err(ControllerError::InvalidConfig(_))
        ));
        assert!(matches!(
            config_from(&[("METRICS_ADDR", "localhost")]),
            Err(ControllerError::InvalidConfig(_))
        ));
    }
}
