//! Controller-specific error types.
//!
//! `BindError` and `ReconcileError` belong to the reconciliation core and are
//! returned to the caller unresolved. `ControllerError` is what the controller
//! loop and `main` deal with.

use std::fmt;

use cluster_client::{ClusterError, ObjectKey};
use thiserror::Error;

/// Errors from attaching a controller owner reference.
///
/// Both variants are configuration errors: retrying with the same inputs
/// cannot succeed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BindError {
    /// The owner has no name or uid, so no reference to it can be built
    #[error("owner {0} cannot be referenced: name and uid must be set")]
    OwnerUnresolvable(String),

    /// The managed object is controlled by a different owner
    #[error("object is already controlled by {kind} {name}")]
    AlreadyOwned { kind: String, name: String },

    /// Namespaced owners can only own objects in their own namespace
    #[error("owner in namespace {owner_namespace} cannot own an object in namespace {object_namespace}")]
    CrossNamespace {
        owner_namespace: String,
        object_namespace: String,
    },
}

/// The control-plane write a reconciliation attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOperation {
    Create,
    Apply,
    Replace,
}

impl fmt::Display for WriteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Self::Create => "create",
            Self::Apply => "apply",
            Self::Replace => "update",
        };
        f.write_str(verb)
    }
}

/// Errors returned by a single reconciliation of one managed object.
///
/// Control-plane errors are carried unmodified as the `source`, wrapped only
/// with the kind, identity and operation for diagnosis.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Desired object cannot be identified (missing name or namespace)
    #[error("invalid desired {kind}: {reason}")]
    InvalidObject { kind: &'static str, reason: String },

    /// Owner reference could not be attached
    #[error("failed to set controller reference on {kind} {key}: {source}")]
    Bind {
        kind: &'static str,
        key: ObjectKey,
        #[source]
        source: BindError,
    },

    /// Reading the observed object failed for a reason other than absence
    #[error("failed to fetch {kind} {key}: {source}")]
    Fetch {
        kind: &'static str,
        key: ObjectKey,
        #[source]
        source: ClusterError,
    },

    /// The single write of this reconciliation failed
    #[error("failed to {operation} {kind} {key}: {source}")]
    Write {
        kind: &'static str,
        key: ObjectKey,
        operation: WriteOperation,
        #[source]
        source: ClusterError,
    },

    /// The caller cancelled the reconciliation before it finished
    #[error("reconciliation of {kind} {key} was cancelled")]
    Cancelled { kind: &'static str, key: ObjectKey },
}

impl ReconcileError {
    /// The control-plane error behind a fetch or write failure.
    #[must_use]
    pub fn cluster_error(&self) -> Option<&ClusterError> {
        match self {
            Self::Fetch { source, .. } | Self::Write { source, .. } => Some(source),
            _ => None,
        }
    }

    /// True when a write lost a race with another writer (HTTP 409).
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.cluster_error().is_some_and(ClusterError::is_conflict)
    }

    /// True for errors that will recur until the inputs change.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::InvalidObject { .. } | Self::Bind { .. })
    }
}

/// Errors that can occur in the LlamaStack Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Reconciliation of a managed object failed
    #[error("Reconciliation failed: {0}")]
    Reconcile(#[from] ReconcileError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Probe or metrics server failed
    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),
}

impl ControllerError {
    /// True for errors that will recur until the resource or the operator
    /// configuration changes.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::InvalidConfig(_) => true,
            Self::Reconcile(err) => err.is_permanent(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_error_keeps_cluster_error() {
        let err = ReconcileError::Write {
            kind: "Service",
            key: ObjectKey::new("llama", "stack-service"),
            operation: WriteOperation::Replace,
            source: ClusterError::Conflict("the object has been modified".to_string()),
        };
        assert!(err.is_conflict());
        assert!(!err.is_permanent());
        assert_eq!(
            err.to_string(),
            "failed to update Service llama/stack-service: Conflict: the object has been modified"
        );
    }

    #[test]
    fn test_bind_errors_are_permanent() {
        let err = ControllerError::from(ReconcileError::Bind {
            kind: "Deployment",
            key: ObjectKey::new("llama", "stack"),
            source: BindError::OwnerUnresolvable("LlamaStackDistribution stack".to_string()),
        });
        assert!(err.is_permanent());
        assert!(ControllerError::InvalidConfig("bad".to_string()).is_permanent());
    }
}
