use serde::{Deserialize, Serialize};

use super::{compared_properties, IpAllocation, SubResource, TransportProtocol};

pub const IP_CONFIGURATION_NAME: &str = "pipConfig";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterfaceProperties {
    pub location: String,
    pub ip_configurations: Vec<InterfaceIpConfiguration>,
    pub enable_accelerated_networking: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceIpConfiguration {
    pub name: String,
    pub subnet: SubResource,
    pub private_ip_allocation: IpAllocation,
    #[serde(default)]
    pub load_balancer_backend_address_pools: Vec<SubResource>,
    #[serde(default)]
    pub load_balancer_inbound_nat_rules: Vec<SubResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ip_address: Option<SubResource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundNatRuleProperties {
    pub frontend_ip_configuration: SubResource,
    pub frontend_port: u16,
    pub backend_port: u16,
    pub protocol: TransportProtocol,
    pub enable_floating_ip: bool,
    pub idle_timeout_in_minutes: u32,
}

compared_properties!(NetworkInterfaceProperties, InboundNatRuleProperties);
