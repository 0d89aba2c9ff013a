//! Object identity

use std::fmt;

use kube::Resource;

use crate::error::ClusterError;

/// Namespace + name of a namespaced object. The kind is carried by the Rust
/// type the key is used with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Build the key from an object's metadata.
    ///
    /// Both `metadata.name` and `metadata.namespace` must be set; generated
    /// names are not supported for managed objects.
    pub fn from_object<K: Resource>(obj: &K) -> Result<Self, ClusterError> {
        let meta = obj.meta();
        let name = meta
            .name
            .clone()
            .ok_or_else(|| ClusterError::InvalidObject("metadata.name is required".to_string()))?;
        let namespace = meta.namespace.clone().ok_or_else(|| {
            ClusterError::InvalidObject(format!("{name}: metadata.namespace is required"))
        })?;
        Ok(Self { namespace, name })
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
