//! Helper functions for common reconciliation patterns
//!
//! Reading the observed object and racing control-plane requests against the
//! caller's cancellation token are shared by every resource policy.

use std::future::Future;

use cluster_client::{ClusterError, ObjectKey};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::ReconcileError;

/// Result of reading an object from the API server.
#[derive(Debug, Clone, PartialEq)]
pub enum Observed<K> {
    /// The object exists
    Found(K),
    /// The API server reported that no object with this identity exists
    Absent,
}

/// Fetch the observed state of one object.
///
/// This function handles the common pattern:
/// 1. Issue a single read keyed by identity
/// 2. If it exists, return it
/// 3. If NotFound, report `Absent` (not an error)
/// 4. If other error (auth, network), return it wrapped with the identity
pub async fn fetch_observed<K, F>(
    kind: &'static str,
    key: &ObjectKey,
    get_fn: F,
) -> Result<Observed<K>, ReconcileError>
where
    F: Future<Output = Result<K, ClusterError>> + Send,
{
    match get_fn.await {
        Ok(existing) => {
            debug!("{} {} exists", kind, key);
            Ok(Observed::Found(existing))
        }
        Err(ClusterError::NotFound(_)) => {
            debug!("{} {} does not exist", kind, key);
            Ok(Observed::Absent)
        }
        Err(e) => {
            // Other errors (auth, network) - don't assume deleted
            error!("Failed to fetch {} {}: {}", kind, key, e);
            Err(ReconcileError::Fetch {
                kind,
                key: key.clone(),
                source: e,
            })
        }
    }
}

/// Run one control-plane step unless `cancel` fires first.
///
/// An already-cancelled token wins before the step is polled, so no request
/// is started after cancellation. A step that is in flight when the token
/// fires is dropped and reported as `Cancelled`; the API server may still have
/// applied it, and the next pass reads whatever state it left.
pub async fn cancellable<T, F>(
    cancel: &CancellationToken,
    kind: &'static str,
    key: &ObjectKey,
    step: F,
) -> Result<T, ReconcileError>
where
    F: Future<Output = Result<T, ReconcileError>> + Send,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => {
            debug!("{} {}: reconciliation cancelled", kind, key);
            Err(ReconcileError::Cancelled { kind, key: key.clone() })
        }
        result = step => result,
    }
}
