use std::net::IpAddr;

use derive_builder::Builder;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterIdentity {
    pub subscription_id: String,
    pub resource_group: String,
    pub cluster_name: String,
    pub location: String,
}

/// Desired network layout of a cluster. Read-only for the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNetworkSpec {
    pub vnet: VnetDescriptor,
    pub control_plane_subnet: SubnetDescriptor,
    pub node_subnet: SubnetDescriptor,
    #[serde(default)]
    pub api_server_ip: PublicIpDescriptor,
}

impl ClusterNetworkSpec {
    pub fn is_ipv6_enabled(&self) -> bool {
        self.vnet.ipv6_enabled
    }

    pub fn subnets(&self) -> [&SubnetDescriptor; 2] {
        [&self.control_plane_subnet, &self.node_subnet]
    }

    pub fn subnet_for(&self, role: Role) -> &SubnetDescriptor {
        match role {
            Role::ControlPlane => &self.control_plane_subnet,
            Role::Node => &self.node_subnet,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VnetDescriptor {
    pub name: String,
    /// defaults to the cluster resource group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_group: Option<String>,
    pub cidr_blocks: Vec<IpNet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6_cidr_block: Option<IpNet>,
    #[serde(default)]
    pub ipv6_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetDescriptor {
    pub name: String,
    pub role: Role,
    pub cidr_block: IpNet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6_cidr_block: Option<IpNet>,
    pub security_group: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_lb_ip_address: Option<IpAddr>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicIpDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_name: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    ControlPlane,
    #[default]
    Node,
}

/// Network requirements of a single machine, before names are resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineDescriptor {
    pub name: String,
    #[serde(default)]
    pub role: Role,
    pub vm_size: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accelerated_networking: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_ip_address: Option<IpAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ip_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(setter(into))]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterfaceSpec {
    pub name: String,
    pub machine_name: String,
    #[builder(default)]
    pub machine_role: Role,
    pub subnet_name: String,
    pub vnet_name: String,
    pub vnet_resource_group: String,
    pub vm_size: String,
    #[builder(default, setter(into, strip_option))]
    pub static_ip_address: Option<IpAddr>,
    #[builder(default, setter(into, strip_option))]
    pub public_lb_name: Option<String>,
    #[builder(default, setter(into, strip_option))]
    pub internal_lb_name: Option<String>,
    #[builder(default, setter(into, strip_option))]
    pub public_ip_name: Option<String>,
    #[builder(default, setter(into, strip_option))]
    pub accelerated_networking: Option<bool>,
}

impl NetworkInterfaceSpec {
    /// The per-machine NAT rule is named after the machine.
    pub fn nat_rule_name(&self) -> &str {
        &self.machine_name
    }
}

pub fn nic_name(machine_name: &str) -> String {
    format!("{machine_name}-nic")
}
