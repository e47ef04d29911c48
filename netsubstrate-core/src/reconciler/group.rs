use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;

use crate::{
    error::ReconcilerError,
    provider::{NetworkClients, ResourceClient},
    resources::{network::GroupProperties, ResourceId, ResourceKind},
    scope::ClusterScope,
};

use super::{apply, remove, ResourceReconciler};

pub const OWNED_TAG_PREFIX: &str = "netsubstrate.io_cluster_";
pub const OWNED_TAG_VALUE: &str = "owned";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSpec {
    pub name: String,
    pub location: String,
    pub tags: BTreeMap<String, String>,
}

impl GroupSpec {
    pub fn for_cluster(scope: &ClusterScope) -> Self {
        Self {
            name: scope.resource_group().to_owned(),
            location: scope.location().to_owned(),
            tags: BTreeMap::from([(
                format!("{OWNED_TAG_PREFIX}{}", scope.cluster_name()),
                OWNED_TAG_VALUE.to_owned(),
            )]),
        }
    }
}

pub struct GroupReconciler {
    client: Arc<dyn ResourceClient<GroupProperties>>,
}

impl GroupReconciler {
    pub fn new(clients: &NetworkClients) -> Self {
        Self {
            client: clients.groups.clone(),
        }
    }
}

#[async_trait]
impl ResourceReconciler for GroupReconciler {
    type Spec = GroupSpec;

    async fn reconcile(&self, scope: &ClusterScope, spec: &GroupSpec) -> Result<(), ReconcilerError> {
        let properties = GroupProperties {
            location: spec.location.to_owned(),
            tags: spec.tags.clone(),
        };

        apply(
            scope,
            &*self.client,
            ResourceKind::ResourceGroup,
            &ResourceId::group(spec.name.as_str()),
            properties,
        )
        .await?;

        Ok(())
    }

    async fn delete(&self, scope: &ClusterScope, spec: &GroupSpec) -> Result<(), ReconcilerError> {
        remove(
            scope,
            &*self.client,
            ResourceKind::ResourceGroup,
            &ResourceId::group(spec.name.as_str()),
        )
        .await
    }
}
