//! Idempotent reconcile and delete of every managed resource kind.
//!
//! Each kind gets a reconciler over its provider collaborator and a spec
//! value built fresh from the [`ClusterScope`] on every pass. Reconcile is
//! get-then-create-or-update and issues no mutation when the remote resource
//! already matches. Delete treats a missing resource as success.

use async_trait::async_trait;
use log::{debug, info, warn};

use crate::{
    error::{Annotate, Operation, ReconcilerError},
    provider::ResourceClient,
    resources::{Properties, Remote, ResourceId, ResourceKind},
    scope::ClusterScope,
};

pub mod cluster;
pub mod group;
pub mod load_balancer;
pub mod network_interface;
pub mod public_ip;
pub mod route_table;
pub mod security_group;
pub mod subnet;
pub mod vnet;

#[async_trait]
pub trait ResourceReconciler: Send + Sync {
    type Spec: Send + Sync;

    async fn reconcile(&self, scope: &ClusterScope, spec: &Self::Spec)
        -> Result<(), ReconcilerError>;

    async fn delete(&self, scope: &ClusterScope, spec: &Self::Spec) -> Result<(), ReconcilerError>;
}

/// Reads a resource, mapping not-found to `None`.
pub(crate) async fn try_get<P: Properties>(
    scope: &ClusterScope,
    client: &dyn ResourceClient<P>,
    kind: ResourceKind,
    id: &ResourceId,
) -> Result<Option<Remote<P>>, ReconcilerError> {
    match scope.call().run(client.get(id)).await {
        Ok(resource) => Ok(Some(resource)),
        Err(error) if error.is_not_found() => Ok(None),
        Err(error) => Err(error).annotate(Operation::Get, kind, &id.name),
    }
}

/// Reads a resource another step depends on. Not-found is fatal.
pub(crate) async fn require<P: Properties>(
    scope: &ClusterScope,
    client: &dyn ResourceClient<P>,
    kind: ResourceKind,
    id: &ResourceId,
) -> Result<Remote<P>, ReconcilerError> {
    scope
        .call()
        .run(client.get(id))
        .await
        .annotate(Operation::Get, kind, &id.name)
}

/// Brings the remote resource to `desired`, skipping the write when it
/// already matches.
pub(crate) async fn apply<P: Properties>(
    scope: &ClusterScope,
    client: &dyn ResourceClient<P>,
    kind: ResourceKind,
    id: &ResourceId,
    desired: P,
) -> Result<Remote<P>, ReconcilerError> {
    let desired = match try_get(scope, client, kind, id).await? {
        Some(existing)
            if existing
                .properties
                .as_ref()
                .is_some_and(|current| desired.is_satisfied_by(current)) =>
        {
            debug!("{kind} '{}' is up to date", id.name);
            return Ok(existing);
        }
        Some(Remote {
            properties: Some(current),
            ..
        }) => {
            info!("Updating {kind} '{}'...", id.name);
            desired.merged_with(&current)
        }
        _ => {
            info!("Creating {kind} '{}'...", id.name);
            desired
        }
    };

    scope
        .call()
        .run(client.create_or_update(id, desired))
        .await
        .annotate(Operation::CreateOrUpdate, kind, &id.name)
}

/// Deletes a resource, treating not-found as already done.
pub(crate) async fn remove<P: Properties>(
    scope: &ClusterScope,
    client: &dyn ResourceClient<P>,
    kind: ResourceKind,
    id: &ResourceId,
) -> Result<(), ReconcilerError> {
    info!("Deleting {kind} '{}'...", id.name);

    match scope.call().run(client.delete(id)).await {
        Ok(()) => Ok(()),
        Err(error) if error.is_not_found() => {
            warn!("{kind} '{}' is already gone, skipping...", id.name);
            Ok(())
        }
        Err(error) => Err(error).annotate(Operation::Delete, kind, &id.name),
    }
}
