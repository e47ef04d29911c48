use std::{
    fmt::{Debug, Display},
    net::IpAddr,
};

use serde::{Deserialize, Serialize};

pub mod interface;
pub mod load_balancer;
pub mod network;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    ResourceGroup,
    VirtualNetwork,
    SecurityGroup,
    RouteTable,
    Subnet,
    LoadBalancer,
    InternalLoadBalancer,
    PublicLoadBalancer,
    PublicIp,
    NetworkInterface,
    InboundNatRule,
    AvailabilityZones,
    VmSku,
}

impl ResourceKind {
    /// Provider collection the kind is stored under, as it appears in resource ids.
    pub fn collection(&self) -> &'static str {
        match self {
            ResourceKind::ResourceGroup => "resourceGroups",
            ResourceKind::VirtualNetwork => "virtualNetworks",
            ResourceKind::SecurityGroup => "networkSecurityGroups",
            ResourceKind::RouteTable => "routeTables",
            ResourceKind::Subnet => "subnets",
            ResourceKind::LoadBalancer
            | ResourceKind::InternalLoadBalancer
            | ResourceKind::PublicLoadBalancer => "loadBalancers",
            ResourceKind::PublicIp => "publicIPAddresses",
            ResourceKind::NetworkInterface => "networkInterfaces",
            ResourceKind::InboundNatRule => "inboundNatRules",
            ResourceKind::AvailabilityZones => "availabilityZones",
            ResourceKind::VmSku => "skus",
        }
    }
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ResourceKind::ResourceGroup => "resource group",
            ResourceKind::VirtualNetwork => "virtual network",
            ResourceKind::SecurityGroup => "network security group",
            ResourceKind::RouteTable => "route table",
            ResourceKind::Subnet => "subnet",
            ResourceKind::LoadBalancer => "load balancer",
            ResourceKind::InternalLoadBalancer => "internal load balancer",
            ResourceKind::PublicLoadBalancer => "public load balancer",
            ResourceKind::PublicIp => "public IP",
            ResourceKind::NetworkInterface => "network interface",
            ResourceKind::InboundNatRule => "inbound NAT rule",
            ResourceKind::AvailabilityZones => "availability zones",
            ResourceKind::VmSku => "VM SKU",
        })
    }
}

/// Address of a remote resource: its resource group, the parent resource
/// for child kinds (subnets, NAT rules) and its own name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceId {
    pub resource_group: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub name: String,
}

impl ResourceId {
    pub fn new(resource_group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_group: resource_group.into(),
            parent: None,
            name: name.into(),
        }
    }

    pub fn child(
        resource_group: impl Into<String>,
        parent: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            resource_group: resource_group.into(),
            parent: Some(parent.into()),
            name: name.into(),
        }
    }

    pub fn group(resource_group: impl Into<String>) -> Self {
        let resource_group = resource_group.into();

        Self::new(resource_group.clone(), resource_group)
    }
}

impl Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.parent {
            Some(parent) => write!(f, "{}/{}/{}", self.resource_group, parent, self.name),
            None => write!(f, "{}/{}", self.resource_group, self.name),
        }
    }
}

/// A resource as the provider reports it. `properties` may be absent when
/// the provider returns a partial view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Remote<P> {
    pub id: String,
    pub name: String,
    #[serde(default = "Option::default")]
    pub properties: Option<P>,
}

impl<P> Remote<P> {
    pub fn child_id(&self, collection: &str, name: &str) -> String {
        crate::naming::child_id(&self.id, collection, name)
    }

    pub fn as_sub_resource(&self) -> SubResource {
        SubResource {
            id: self.id.to_owned(),
        }
    }
}

/// Reference to another resource by provider id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubResource {
    pub id: String,
}

impl From<String> for SubResource {
    fn from(id: String) -> Self {
        Self { id }
    }
}

/// Desired-state comparison for resource properties.
pub trait Properties: Clone + Debug + Send + Sync + 'static {
    /// Whether `existing` already matches this desired state, so no mutation is needed.
    fn is_satisfied_by(&self, existing: &Self) -> bool;

    /// The body sent when updating: desired state carrying over whatever the
    /// provider manages on its own.
    fn merged_with(self, _existing: &Self) -> Self {
        self
    }
}

macro_rules! compared_properties {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::resources::Properties for $ty {
                fn is_satisfied_by(&self, existing: &Self) -> bool {
                    self == existing
                }
            }
        )*
    };
}

pub(crate) use compared_properties;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransportProtocol {
    #[default]
    Tcp,
    Udp,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "method", content = "address")]
pub enum IpAllocation {
    #[default]
    Dynamic,
    Static(IpAddr),
}

impl IpAllocation {
    pub fn from_requested(address: Option<IpAddr>) -> Self {
        match address {
            Some(address) => IpAllocation::Static(address),
            None => IpAllocation::Dynamic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ResourceId, ResourceKind};

    #[test]
    fn resource_ids_order_children_after_parents() {
        let vnet = ResourceId::new("demo-rg", "demo-vnet");
        let subnet = ResourceId::child("demo-rg", "demo-vnet", "node-subnet");

        assert_eq!(vnet.to_string(), "demo-rg/demo-vnet");
        assert_eq!(subnet.to_string(), "demo-rg/demo-vnet/node-subnet");
        assert_eq!(ResourceId::group("demo-rg").to_string(), "demo-rg/demo-rg");
    }

    #[test]
    fn load_balancer_flavours_share_a_collection() {
        assert_eq!(
            ResourceKind::InternalLoadBalancer.collection(),
            ResourceKind::PublicLoadBalancer.collection()
        );
        assert_eq!(ResourceKind::PublicIp.to_string(), "public IP");
    }
}
