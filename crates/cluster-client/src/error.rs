//! Control-plane client errors

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when talking to the Kubernetes API server.
///
/// `kube::Error::Api` responses are classified by HTTP status so callers can
/// branch on the condition (absent, conflict, rejected) without downcasting.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Object does not exist (HTTP 404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Object already exists or the resourceVersion is stale (HTTP 409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The API server rejected the object, e.g. a change to an immutable field (HTTP 422)
    #[error("Invalid: {0}")]
    Invalid(String),

    /// Authentication or authorization failure (HTTP 401/403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Any other API server error response
    #[error("API error ({code}): {message}")]
    Api {
        /// HTTP status code
        code: u16,
        /// Message returned by the API server
        message: String,
    },

    /// The request did not complete within the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Transport, TLS or serialization failure inside the kube client
    #[error("Kubernetes client error: {0}")]
    Kube(#[source] kube::Error),

    /// The object handed to the client cannot be sent (missing name or namespace)
    #[error("Invalid object: {0}")]
    InvalidObject(String),
}

impl ClusterError {
    /// Returns true for the well-known "object does not exist" condition.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true when the write lost an optimistic-concurrency race or the
    /// object was created concurrently.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Classify an API server status code and message.
    #[must_use]
    pub fn from_status(code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            404 => Self::NotFound(message),
            409 => Self::Conflict(message),
            422 => Self::Invalid(message),
            401 | 403 => Self::Forbidden(message),
            _ => Self::Api { code, message },
        }
    }
}

impl From<kube::Error> for ClusterError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) => Self::from_status(ae.code, ae.message.clone()),
            other => Self::Kube(other),
        }
    }
}
