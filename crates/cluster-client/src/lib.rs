//! Control-plane client
//!
//! A narrow, typed client for the object kinds the LlamaStack operator
//! manages: `apps/v1` Deployments and `v1` Services.
//!
//! Reconcilers depend on [`ClusterClientTrait`] rather than on `kube::Api`
//! directly, so they can be exercised against [`MockClusterClient`] in unit
//! tests (enable the `test-util` feature).
//!
//! # Example
//!
//! ```no_run
//! use cluster_client::{ClusterClientTrait, KubeClusterClient, ObjectKey};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let kube_client = kube::Client::try_default().await?;
//! let client = KubeClusterClient::new(kube_client, Duration::from_secs(30));
//!
//! let key = ObjectKey::new("llama", "my-stack");
//! match client.get_deployment(&key).await {
//!     Ok(deployment) => println!("found {:?}", deployment.metadata.resource_version),
//!     Err(e) if e.is_not_found() => println!("{key} does not exist yet"),
//!     Err(e) => return Err(e.into()),
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod key;
#[path = "trait.rs"]
pub mod cluster_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::KubeClusterClient;
pub use cluster_trait::ClusterClientTrait;
pub use error::ClusterError;
pub use key::ObjectKey;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockClusterClient, RecordedWrite};
