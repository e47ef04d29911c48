//! Internal, API server and egress load balancers.
//!
//! All three share one backend pool and one frontend named after the
//! balancer. The internal and API server flavours balance 6443 behind a TCP
//! probe, the public flavours add an outbound rule for node egress.

use std::{net::IpAddr, sync::Arc};

use async_trait::async_trait;

use crate::{
    error::ReconcilerError,
    naming::{backend_pool_name, frontend_ip_configuration_name},
    provider::{NetworkClients, ResourceClient},
    resources::{
        load_balancer::{
            FrontendIpConfiguration, LoadBalancerProperties, LoadBalancingRule, OutboundRule, Probe,
        },
        network::{PublicIpProperties, SubnetProperties},
        IpAllocation, ResourceId, ResourceKind, TransportProtocol,
    },
    scope::ClusterScope,
};

use super::{apply, remove, require, security_group::API_SERVER_PORT, ResourceReconciler};

pub const API_SERVER_RULE: &str = "LBRuleHTTPS";
pub const API_SERVER_PROBE: &str = "TCPProbe";
pub const OUTBOUND_RULE: &str = "OutboundNATAllProtocols";
pub const IDLE_TIMEOUT_MINUTES: u32 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadBalancerRole {
    /// Private frontend inside the control-plane subnet.
    Internal {
        vnet_resource_group: String,
        vnet_name: String,
        subnet_name: String,
        ip_address: Option<IpAddr>,
    },
    ApiServer { public_ip_name: String },
    Egress { public_ip_name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancerSpec {
    pub resource_group: String,
    pub name: String,
    pub location: String,
    pub role: LoadBalancerRole,
}

impl LoadBalancerSpec {
    pub fn internal(scope: &ClusterScope) -> Self {
        let subnet = scope.control_plane_subnet();

        Self {
            resource_group: scope.resource_group().to_owned(),
            name: scope.internal_lb_name(),
            location: scope.location().to_owned(),
            role: LoadBalancerRole::Internal {
                vnet_resource_group: scope.vnet_resource_group().to_owned(),
                vnet_name: scope.vnet().name.to_owned(),
                subnet_name: subnet.name.to_owned(),
                ip_address: subnet.internal_lb_ip_address,
            },
        }
    }

    pub fn api_server(scope: &ClusterScope, public_ip_name: &str) -> Self {
        Self {
            resource_group: scope.resource_group().to_owned(),
            name: scope.api_server_lb_name(),
            location: scope.location().to_owned(),
            role: LoadBalancerRole::ApiServer {
                public_ip_name: public_ip_name.to_owned(),
            },
        }
    }

    pub fn egress(scope: &ClusterScope) -> Self {
        Self {
            resource_group: scope.resource_group().to_owned(),
            name: scope.egress_lb_name(),
            location: scope.location().to_owned(),
            role: LoadBalancerRole::Egress {
                public_ip_name: scope.egress_ip_name(),
            },
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self.role {
            LoadBalancerRole::Internal { .. } => ResourceKind::InternalLoadBalancer,
            _ => ResourceKind::PublicLoadBalancer,
        }
    }

    pub fn id(&self) -> ResourceId {
        ResourceId::new(self.resource_group.as_str(), self.name.as_str())
    }

    fn balances_api_server(&self) -> bool {
        !matches!(self.role, LoadBalancerRole::Egress { .. })
    }

    fn is_public(&self) -> bool {
        !matches!(self.role, LoadBalancerRole::Internal { .. })
    }

    /// Desired state around an already resolved frontend.
    pub fn properties(&self, frontend: FrontendIpConfiguration) -> LoadBalancerProperties {
        let frontend_name = frontend.name.to_owned();
        let pool_name = backend_pool_name(&self.name);
        let mut properties = LoadBalancerProperties {
            location: self.location.to_owned(),
            frontend_ip_configurations: vec![frontend],
            backend_address_pools: vec![pool_name.to_owned()],
            load_balancing_rules: vec![],
            probes: vec![],
            outbound_rules: vec![],
            inbound_nat_rules: None,
        };

        if self.balances_api_server() {
            properties.probes.push(Probe {
                name: API_SERVER_PROBE.to_owned(),
                protocol: TransportProtocol::Tcp,
                port: API_SERVER_PORT,
                interval_in_seconds: 15,
                number_of_probes: 4,
            });
            properties.load_balancing_rules.push(LoadBalancingRule {
                name: API_SERVER_RULE.to_owned(),
                protocol: TransportProtocol::Tcp,
                frontend_port: API_SERVER_PORT,
                backend_port: API_SERVER_PORT,
                frontend_ip_configuration: frontend_name.to_owned(),
                backend_address_pool: pool_name.to_owned(),
                probe: API_SERVER_PROBE.to_owned(),
                idle_timeout_in_minutes: IDLE_TIMEOUT_MINUTES,
            });
        }

        if self.is_public() {
            properties.outbound_rules.push(OutboundRule {
                name: OUTBOUND_RULE.to_owned(),
                frontend_ip_configurations: vec![frontend_name],
                backend_address_pool: pool_name,
                idle_timeout_in_minutes: IDLE_TIMEOUT_MINUTES,
            });
        }

        properties
    }
}

pub struct LoadBalancerReconciler {
    load_balancers: Arc<dyn ResourceClient<LoadBalancerProperties>>,
    subnets: Arc<dyn ResourceClient<SubnetProperties>>,
    public_ips: Arc<dyn ResourceClient<PublicIpProperties>>,
}

impl LoadBalancerReconciler {
    pub fn new(clients: &NetworkClients) -> Self {
        Self {
            load_balancers: clients.load_balancers.clone(),
            subnets: clients.subnets.clone(),
            public_ips: clients.public_ips.clone(),
        }
    }

    async fn frontend(
        &self,
        scope: &ClusterScope,
        spec: &LoadBalancerSpec,
    ) -> Result<FrontendIpConfiguration, ReconcilerError> {
        let name = frontend_ip_configuration_name(&spec.name);

        match &spec.role {
            LoadBalancerRole::Internal {
                vnet_resource_group,
                vnet_name,
                subnet_name,
                ip_address,
            } => {
                let subnet = require(
                    scope,
                    &*self.subnets,
                    ResourceKind::Subnet,
                    &ResourceId::child(
                        vnet_resource_group.as_str(),
                        vnet_name.as_str(),
                        subnet_name.as_str(),
                    ),
                )
                .await?;

                Ok(FrontendIpConfiguration {
                    name,
                    private_ip_allocation: Some(IpAllocation::from_requested(*ip_address)),
                    subnet: Some(subnet.as_sub_resource()),
                    public_ip_address: None,
                })
            }
            LoadBalancerRole::ApiServer { public_ip_name }
            | LoadBalancerRole::Egress { public_ip_name } => {
                let public_ip = require(
                    scope,
                    &*self.public_ips,
                    ResourceKind::PublicIp,
                    &ResourceId::new(spec.resource_group.as_str(), public_ip_name.as_str()),
                )
                .await?;

                Ok(FrontendIpConfiguration {
                    name,
                    private_ip_allocation: None,
                    subnet: None,
                    public_ip_address: Some(public_ip.as_sub_resource()),
                })
            }
        }
    }
}

#[async_trait]
impl ResourceReconciler for LoadBalancerReconciler {
    type Spec = LoadBalancerSpec;

    async fn reconcile(
        &self,
        scope: &ClusterScope,
        spec: &LoadBalancerSpec,
    ) -> Result<(), ReconcilerError> {
        let frontend = self.frontend(scope, spec).await?;

        apply(
            scope,
            &*self.load_balancers,
            spec.kind(),
            &spec.id(),
            spec.properties(frontend),
        )
        .await?;

        Ok(())
    }

    async fn delete(
        &self,
        scope: &ClusterScope,
        spec: &LoadBalancerSpec,
    ) -> Result<(), ReconcilerError> {
        remove(scope, &*self.load_balancers, spec.kind(), &spec.id()).await
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        resources::{load_balancer::FrontendIpConfiguration, ResourceKind},
        scope::tests::demo_scope,
    };

    use super::LoadBalancerSpec;

    fn frontend(name: &str) -> FrontendIpConfiguration {
        FrontendIpConfiguration {
            name: name.to_owned(),
            private_ip_allocation: None,
            subnet: None,
            public_ip_address: None,
        }
    }

    #[test]
    fn internal_balancer_serves_the_api_server_without_egress() {
        let spec = LoadBalancerSpec::internal(&demo_scope(false));
        let properties = spec.properties(frontend("demo-internal-lb-frontEnd"));

        assert_eq!(spec.kind(), ResourceKind::InternalLoadBalancer);
        assert_eq!(properties.backend_address_pools, vec!["demo-internal-lb-backendPool"]);
        assert_eq!(properties.load_balancing_rules[0].frontend_port, 6443);
        assert!(properties.outbound_rules.is_empty());
    }

    #[test]
    fn api_server_balancer_adds_an_outbound_rule() {
        let spec = LoadBalancerSpec::api_server(&demo_scope(false), "pip-apiserver-1");
        let properties = spec.properties(frontend("demo-public-lb-frontEnd"));

        assert_eq!(spec.kind(), ResourceKind::PublicLoadBalancer);
        assert_eq!(properties.load_balancing_rules.len(), 1);
        assert_eq!(
            properties.outbound_rules[0].frontend_ip_configurations,
            vec!["demo-public-lb-frontEnd"]
        );
    }

    #[test]
    fn egress_balancer_only_carries_outbound_traffic() {
        let spec = LoadBalancerSpec::egress(&demo_scope(true));
        let properties = spec.properties(frontend("demo-outbound-lb-frontEnd"));

        assert_eq!(spec.name, "demo-outbound-lb");
        assert!(properties.load_balancing_rules.is_empty());
        assert!(properties.probes.is_empty());
        assert_eq!(properties.outbound_rules.len(), 1);
    }
}
