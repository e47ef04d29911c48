use std::sync::Arc;

use async_trait::async_trait;
use ipnet::IpNet;

use crate::{
    error::ReconcilerError,
    helpers::AndIfSome,
    provider::{NetworkClients, ResourceClient},
    resources::{network::VirtualNetworkProperties, ResourceId, ResourceKind},
    scope::ClusterScope,
};

use super::{apply, remove, ResourceReconciler};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VnetSpec {
    pub resource_group: String,
    pub name: String,
    pub location: String,
    pub address_prefixes: Vec<IpNet>,
}

impl VnetSpec {
    /// IPv4 blocks, followed by the IPv6 block when dual stack is on.
    pub fn for_cluster(scope: &ClusterScope) -> Self {
        let vnet = scope.vnet();
        let address_prefixes = vnet.cidr_blocks.clone().and_if_some(
            || vnet.ipv6_cidr_block.filter(|_| scope.is_ipv6_enabled()),
            |mut prefixes: Vec<IpNet>, ipv6: IpNet| {
                prefixes.push(ipv6);
                prefixes
            },
        );

        Self {
            resource_group: scope.vnet_resource_group().to_owned(),
            name: vnet.name.to_owned(),
            location: scope.location().to_owned(),
            address_prefixes,
        }
    }

    pub fn id(&self) -> ResourceId {
        ResourceId::new(self.resource_group.as_str(), self.name.as_str())
    }
}

pub struct VnetReconciler {
    client: Arc<dyn ResourceClient<VirtualNetworkProperties>>,
}

impl VnetReconciler {
    pub fn new(clients: &NetworkClients) -> Self {
        Self {
            client: clients.virtual_networks.clone(),
        }
    }
}

#[async_trait]
impl ResourceReconciler for VnetReconciler {
    type Spec = VnetSpec;

    async fn reconcile(&self, scope: &ClusterScope, spec: &VnetSpec) -> Result<(), ReconcilerError> {
        let properties = VirtualNetworkProperties {
            location: spec.location.to_owned(),
            address_prefixes: spec.address_prefixes.clone(),
        };

        apply(scope, &*self.client, ResourceKind::VirtualNetwork, &spec.id(), properties).await?;

        Ok(())
    }

    async fn delete(&self, scope: &ClusterScope, spec: &VnetSpec) -> Result<(), ReconcilerError> {
        remove(scope, &*self.client, ResourceKind::VirtualNetwork, &spec.id()).await
    }
}
