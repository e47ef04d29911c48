//! Contracts of the remote collaborators the engine drives.
//!
//! Every kind of network resource is reached through a [`ResourceClient`],
//! plus two narrow read-only lookups: the zones of a region and the
//! capabilities of a VM size.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    error::ClientError,
    resources::{
        interface::{InboundNatRuleProperties, NetworkInterfaceProperties},
        load_balancer::LoadBalancerProperties,
        network::{
            GroupProperties, PublicIpProperties, RouteTableProperties, SecurityGroupProperties,
            SubnetProperties, VirtualNetworkProperties,
        },
        Properties, Remote, ResourceId,
    },
};

pub mod memory;

#[async_trait]
pub trait ResourceClient<P: Properties>: Send + Sync {
    async fn get(&self, id: &ResourceId) -> Result<Remote<P>, ClientError>;

    async fn create_or_update(&self, id: &ResourceId, properties: P)
        -> Result<Remote<P>, ClientError>;

    async fn delete(&self, id: &ResourceId) -> Result<(), ClientError>;
}

#[async_trait]
pub trait AvailabilityZones: Send + Sync {
    async fn list_zones(&self, location: &str) -> Result<Vec<String>, ClientError>;
}

#[async_trait]
pub trait SkuCapabilities: Send + Sync {
    async fn has_accelerated_networking(&self, vm_size: &str) -> Result<bool, ClientError>;
}

/// One collaborator per resource kind.
#[derive(Clone)]
pub struct NetworkClients {
    pub groups: Arc<dyn ResourceClient<GroupProperties>>,
    pub virtual_networks: Arc<dyn ResourceClient<VirtualNetworkProperties>>,
    pub security_groups: Arc<dyn ResourceClient<SecurityGroupProperties>>,
    pub route_tables: Arc<dyn ResourceClient<RouteTableProperties>>,
    pub subnets: Arc<dyn ResourceClient<SubnetProperties>>,
    pub load_balancers: Arc<dyn ResourceClient<LoadBalancerProperties>>,
    pub public_ips: Arc<dyn ResourceClient<PublicIpProperties>>,
    pub network_interfaces: Arc<dyn ResourceClient<NetworkInterfaceProperties>>,
    pub inbound_nat_rules: Arc<dyn ResourceClient<InboundNatRuleProperties>>,
    pub zones: Arc<dyn AvailabilityZones>,
    pub skus: Arc<dyn SkuCapabilities>,
}
