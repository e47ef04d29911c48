use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    cluster::SubnetDescriptor,
    error::ReconcilerError,
    provider::{NetworkClients, ResourceClient},
    resources::{network::RouteTableProperties, ResourceId, ResourceKind},
    scope::ClusterScope,
};

use super::{apply, remove, ResourceReconciler};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTableSpec {
    pub resource_group: String,
    pub name: String,
    pub location: String,
}

impl RouteTableSpec {
    /// `None` when the subnet names no route table.
    pub fn for_subnet(scope: &ClusterScope, subnet: &SubnetDescriptor) -> Option<Self> {
        let name = subnet.route_table.as_ref()?;

        Some(Self {
            resource_group: scope.resource_group().to_owned(),
            name: name.to_owned(),
            location: scope.location().to_owned(),
        })
    }

    pub fn id(&self) -> ResourceId {
        ResourceId::new(self.resource_group.as_str(), self.name.as_str())
    }
}

pub struct RouteTableReconciler {
    client: Arc<dyn ResourceClient<RouteTableProperties>>,
}

impl RouteTableReconciler {
    pub fn new(clients: &NetworkClients) -> Self {
        Self {
            client: clients.route_tables.clone(),
        }
    }
}

#[async_trait]
impl ResourceReconciler for RouteTableReconciler {
    type Spec = RouteTableSpec;

    async fn reconcile(
        &self,
        scope: &ClusterScope,
        spec: &RouteTableSpec,
    ) -> Result<(), ReconcilerError> {
        let properties = RouteTableProperties {
            location: spec.location.to_owned(),
        };

        apply(scope, &*self.client, ResourceKind::RouteTable, &spec.id(), properties).await?;

        Ok(())
    }

    async fn delete(&self, scope: &ClusterScope, spec: &RouteTableSpec) -> Result<(), ReconcilerError> {
        remove(scope, &*self.client, ResourceKind::RouteTable, &spec.id()).await
    }
}
