//! Controller owner references.
//!
//! Every object the operator manages carries exactly one controller
//! reference to the `LlamaStackDistribution` that caused it to exist, so the
//! Kubernetes garbage collector removes it when the owner is deleted.

use kube::Resource;

use crate::error::BindError;

/// Attach a controller owner reference from `managed` to `owner`.
///
/// The owner's apiVersion and kind come from its static type; its name and
/// uid must be populated (i.e. the owner was read from the API server).
/// The reference is marked `controller` and `blockOwnerDeletion`.
/// Binding the same owner again is a no-op. Only the in-memory object is
/// modified.
pub fn bind_owner<O, M>(owner: &O, managed: &mut M) -> Result<(), BindError>
where
    O: Resource<DynamicType = ()>,
    M: Resource,
{
    let mut owner_ref = owner
        .controller_owner_ref(&())
        .ok_or_else(|| BindError::OwnerUnresolvable(describe(owner)))?;
    // Foreground deletion of the owner waits for this object
    owner_ref.block_owner_deletion = Some(true);

    if let (Some(owner_ns), Some(object_ns)) = (owner.meta().namespace.as_ref(), managed.meta().namespace.as_ref()) {
        if owner_ns != object_ns {
            return Err(BindError::CrossNamespace {
                owner_namespace: owner_ns.clone(),
                object_namespace: object_ns.clone(),
            });
        }
    }

    let refs = managed.meta_mut().owner_references.get_or_insert_with(Vec::new);

    if let Some(current) = refs
        .iter()
        .find(|r| r.controller == Some(true) && r.uid != owner_ref.uid)
    {
        return Err(BindError::AlreadyOwned {
            kind: current.kind.clone(),
            name: current.name.clone(),
        });
    }

    match refs.iter_mut().find(|r| r.uid == owner_ref.uid) {
        Some(existing) => *existing = owner_ref,
        None => refs.push(owner_ref),
    }
    Ok(())
}

fn describe<O: Resource<DynamicType = ()>>(owner: &O) -> String {
    format!(
        "{} {}",
        O::kind(&()),
        owner.meta().name.as_deref().unwrap_or("<unnamed>")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{test_deployment, test_owner};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

    #[test]
    fn test_bind_sets_controller_reference() {
        let owner = test_owner("stack", "llama");
        let mut deployment = test_deployment("stack", "llama", "foo", 1);

        bind_owner(&owner, &mut deployment).unwrap();

        let refs = deployment.metadata.owner_references.unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].api_version, "llamastack.io/v1alpha1");
        assert_eq!(refs[0].kind, "LlamaStackDistribution");
        assert_eq!(refs[0].name, "stack");
        assert_eq!(refs[0].uid, owner.metadata.uid.unwrap());
        assert_eq!(refs[0].controller, Some(true));
        assert_eq!(refs[0].block_owner_deletion, Some(true));
    }

    #[test]
    fn test_bind_twice_keeps_single_reference() {
        let owner = test_owner("stack", "llama");
        let mut deployment = test_deployment("stack", "llama", "foo", 1);

        bind_owner(&owner, &mut deployment).unwrap();
        bind_owner(&owner, &mut deployment).unwrap();

        assert_eq!(deployment.metadata.owner_references.unwrap().len(), 1);
    }

    #[test]
    fn test_bind_requires_owner_uid() {
        let mut owner = test_owner("stack", "llama");
        owner.metadata.uid = None;
        let mut deployment = test_deployment("stack", "llama", "foo", 1);

        let err = bind_owner(&owner, &mut deployment).unwrap_err();
        assert!(matches!(err, BindError::OwnerUnresolvable(_)));
        assert!(deployment.metadata.owner_references.is_none());
    }

    #[test]
    fn test_bind_rejects_other_controller() {
        let owner = test_owner("stack", "llama");
        let mut deployment = test_deployment("stack", "llama", "foo", 1);
        deployment.metadata.owner_references = Some(vec![OwnerReference {
            api_version: "apps/v1".to_string(),
            kind: "ReplicaSet".to_string(),
            name: "someone-else".to_string(),
            uid: "00000000-0000-0000-0000-000000000042".to_string(),
            controller: Some(true),
            block_owner_deletion: None,
        }]);

        let err = bind_owner(&owner, &mut deployment).unwrap_err();
        assert_eq!(
            err,
            BindError::AlreadyOwned {
                kind: "ReplicaSet".to_string(),
                name: "someone-else".to_string(),
            }
        );
    }

    #[test]
    fn test_bind_rejects_cross_namespace() {
        let owner = test_owner("stack", "llama");
        let mut deployment = test_deployment("stack", "other", "foo", 1);

        let err = bind_owner(&owner, &mut deployment).unwrap_err();
        assert!(matches!(err, BindError::CrossNamespace { .. }));
    }
}
