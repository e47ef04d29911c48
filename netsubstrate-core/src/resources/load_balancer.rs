use serde::{Deserialize, Serialize};

use super::{
    interface::InboundNatRuleProperties, IpAllocation, Properties, Remote, SubResource,
    TransportProtocol,
};

pub const FRONTEND_IP_CONFIGURATIONS: &str = "frontendIPConfigurations";
pub const BACKEND_ADDRESS_POOLS: &str = "backendAddressPools";
pub const INBOUND_NAT_RULES: &str = "inboundNatRules";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerProperties {
    pub location: String,
    pub frontend_ip_configurations: Vec<FrontendIpConfiguration>,
    /// backend pool names, ids derive from the load balancer id
    pub backend_address_pools: Vec<String>,
    #[serde(default)]
    pub load_balancing_rules: Vec<LoadBalancingRule>,
    #[serde(default)]
    pub probes: Vec<Probe>,
    #[serde(default)]
    pub outbound_rules: Vec<OutboundRule>,
    /// Rules currently bound to the balancer. Owned by the NAT rule
    /// collaborator, so never part of the desired state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inbound_nat_rules: Option<Vec<Remote<InboundNatRuleProperties>>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontendIpConfiguration {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_ip_allocation: Option<IpAllocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet: Option<SubResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ip_address: Option<SubResource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancingRule {
    pub name: String,
    pub protocol: TransportProtocol,
    pub frontend_port: u16,
    pub backend_port: u16,
    pub frontend_ip_configuration: String,
    pub backend_address_pool: String,
    pub probe: String,
    pub idle_timeout_in_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Probe {
    pub name: String,
    pub protocol: TransportProtocol,
    pub port: u16,
    pub interval_in_seconds: u32,
    pub number_of_probes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundRule {
    pub name: String,
    pub frontend_ip_configurations: Vec<String>,
    pub backend_address_pool: String,
    pub idle_timeout_in_minutes: u32,
}

impl Properties for LoadBalancerProperties {
    fn is_satisfied_by(&self, existing: &Self) -> bool {
        self.location == existing.location
            && self.frontend_ip_configurations == existing.frontend_ip_configurations
            && self.backend_address_pools == existing.backend_address_pools
            && self.load_balancing_rules == existing.load_balancing_rules
            && self.probes == existing.probes
            && self.outbound_rules == existing.outbound_rules
    }

    fn merged_with(self, existing: &Self) -> Self {
        Self {
            inbound_nat_rules: existing.inbound_nat_rules.clone(),
            ..self
        }
    }
}

impl Remote<LoadBalancerProperties> {
    pub fn first_backend_pool_id(&self) -> Option<String> {
        let pool = self.properties.as_ref()?.backend_address_pools.first()?;

        Some(self.child_id(BACKEND_ADDRESS_POOLS, pool))
    }

    pub fn first_frontend_ip_configuration_id(&self) -> Option<String> {
        let frontend = self.properties.as_ref()?.frontend_ip_configurations.first()?;

        Some(self.child_id(FRONTEND_IP_CONFIGURATIONS, &frontend.name))
    }

    pub fn inbound_nat_rules(&self) -> Option<&[Remote<InboundNatRuleProperties>]> {
        self.properties.as_ref()?.inbound_nat_rules.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use crate::resources::{interface::InboundNatRuleProperties, Properties, Remote};

    use super::{FrontendIpConfiguration, LoadBalancerProperties};

    fn balancer(nat_rules: Option<Vec<Remote<InboundNatRuleProperties>>>) -> LoadBalancerProperties {
        LoadBalancerProperties {
            location: "westeurope".into(),
            frontend_ip_configurations: vec![FrontendIpConfiguration {
                name: "demo-public-lb-frontEnd".into(),
                private_ip_allocation: None,
                subnet: None,
                public_ip_address: None,
            }],
            backend_address_pools: vec!["demo-public-lb-backendPool".into()],
            load_balancing_rules: vec![],
            probes: vec![],
            outbound_rules: vec![],
            inbound_nat_rules: nat_rules,
        }
    }

    #[test]
    fn nat_rules_do_not_affect_desired_state_comparison() {
        let existing = balancer(Some(vec![]));

        assert!(balancer(None).is_satisfied_by(&existing));
    }

    #[test]
    fn updates_keep_existing_nat_rules() {
        let existing = balancer(Some(vec![]));
        let merged = balancer(None).merged_with(&existing);

        assert_eq!(merged.inbound_nat_rules, Some(vec![]));
    }

    #[test]
    fn child_ids_derive_from_the_balancer_id() {
        let lb = Remote {
            id: "/lb".to_owned(),
            name: "demo-public-lb".to_owned(),
            properties: Some(balancer(None)),
        };

        assert_eq!(
            lb.first_backend_pool_id().as_deref(),
            Some("/lb/backendAddressPools/demo-public-lb-backendPool")
        );
        assert_eq!(
            lb.first_frontend_ip_configuration_id().as_deref(),
            Some("/lb/frontendIPConfigurations/demo-public-lb-frontEnd")
        );
        assert!(lb.inbound_nat_rules().is_none());
    }
}
