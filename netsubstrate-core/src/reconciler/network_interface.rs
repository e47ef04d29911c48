//! Machine network interfaces and their SSH inbound NAT rules.

use std::{collections::HashSet, ops::RangeInclusive, sync::Arc};

use async_trait::async_trait;
use log::{debug, info};

use crate::{
    capability::resolve_accelerated_networking,
    cluster::{NetworkInterfaceSpec, Role},
    error::{Annotate, Operation, ReconcilerError},
    helpers::RequireProperties,
    naming::nat_rule_id,
    provider::{NetworkClients, ResourceClient, SkuCapabilities},
    resources::{
        interface::{
            InboundNatRuleProperties, InterfaceIpConfiguration, NetworkInterfaceProperties,
            IP_CONFIGURATION_NAME,
        },
        load_balancer::LoadBalancerProperties,
        network::{PublicIpProperties, SubnetProperties},
        IpAllocation, Remote, ResourceId, ResourceKind, SubResource, TransportProtocol,
    },
    scope::ClusterScope,
};

use super::{apply, remove, require, security_group::SSH_PORT, ResourceReconciler};

pub const FALLBACK_SSH_PORTS: RangeInclusive<u16> = 2201..=2219;
pub const NAT_IDLE_TIMEOUT_MINUTES: u32 = 4;

/// Picks the frontend port for a new SSH NAT rule: 22 when free, otherwise
/// the lowest free port of 2201..=2219.
pub fn allocate_frontend_port(used: &HashSet<u16>) -> Option<u16> {
    if !used.contains(&SSH_PORT) {
        return Some(SSH_PORT);
    }

    FALLBACK_SSH_PORTS.into_iter().find(|port| !used.contains(port))
}

pub struct NetworkInterfaceReconciler {
    interfaces: Arc<dyn ResourceClient<NetworkInterfaceProperties>>,
    subnets: Arc<dyn ResourceClient<SubnetProperties>>,
    load_balancers: Arc<dyn ResourceClient<LoadBalancerProperties>>,
    public_ips: Arc<dyn ResourceClient<PublicIpProperties>>,
    nat_rules: Arc<dyn ResourceClient<InboundNatRuleProperties>>,
    skus: Arc<dyn SkuCapabilities>,
}

impl NetworkInterfaceReconciler {
    pub fn new(clients: &NetworkClients) -> Self {
        Self {
            interfaces: clients.network_interfaces.clone(),
            subnets: clients.subnets.clone(),
            load_balancers: clients.load_balancers.clone(),
            public_ips: clients.public_ips.clone(),
            nat_rules: clients.inbound_nat_rules.clone(),
            skus: clients.skus.clone(),
        }
    }

    /// Reconciles every interface in order, stopping at the first failure.
    pub async fn reconcile_all(
        &self,
        scope: &ClusterScope,
        specs: &[NetworkInterfaceSpec],
    ) -> Result<(), ReconcilerError> {
        for spec in specs {
            self.reconcile(scope, spec).await?;
        }

        Ok(())
    }

    /// Deletes every interface in order, stopping at the first failure.
    pub async fn delete_all(
        &self,
        scope: &ClusterScope,
        specs: &[NetworkInterfaceSpec],
    ) -> Result<(), ReconcilerError> {
        for spec in specs {
            self.delete(scope, spec).await?;
        }

        Ok(())
    }

    /// Ensures the per-machine SSH NAT rule exists on `lb` and returns its id.
    ///
    /// The balancer has to come with its properties and current rule list,
    /// every rule with its frontend port.
    /// An existing rule with the same name is left untouched.
    pub async fn create_inbound_nat_rule(
        &self,
        scope: &ClusterScope,
        lb_id: &ResourceId,
        lb: &Remote<LoadBalancerProperties>,
        rule_name: &str,
    ) -> Result<String, ReconcilerError> {
        let missing_rules = || {
            ReconcilerError::configuration(format!(
                "couldn't get existing inbound NAT rules of load balancer '{}'",
                lb.name
            ))
        };
        let rules = lb
            .require_properties_or_else(missing_rules)?
            .inbound_nat_rules
            .as_deref()
            .ok_or_else(missing_rules)?;

        if rules.iter().any(|rule| rule.name == rule_name) {
            debug!("Inbound NAT rule '{rule_name}' already exists, skipping...");
            return Ok(nat_rule_id(&lb.id, rule_name));
        }

        let used = rules
            .iter()
            .map(|rule| {
                rule.properties
                    .as_ref()
                    .map(|properties| properties.frontend_port)
                    .ok_or_else(|| {
                        ReconcilerError::configuration(format!(
                            "inbound NAT rule '{}' of load balancer '{}' has no known frontend port",
                            rule.name, lb.name
                        ))
                    })
            })
            .collect::<Result<HashSet<_>, _>>()?;

        let frontend_port =
            allocate_frontend_port(&used).ok_or_else(|| ReconcilerError::PortRangeExhausted {
                load_balancer: lb.name.to_owned(),
                rule: rule_name.to_owned(),
            })?;

        let frontend = lb.first_frontend_ip_configuration_id().ok_or_else(|| {
            ReconcilerError::configuration(format!(
                "load balancer '{}' has no frontend IP configuration",
                lb.name
            ))
        })?;

        let rule = InboundNatRuleProperties {
            frontend_ip_configuration: frontend.into(),
            frontend_port,
            backend_port: SSH_PORT,
            protocol: TransportProtocol::Tcp,
            enable_floating_ip: false,
            idle_timeout_in_minutes: NAT_IDLE_TIMEOUT_MINUTES,
        };

        info!("Creating inbound NAT rule '{rule_name}' on frontend port {frontend_port}...");

        let created = scope
            .call()
            .run(self.nat_rules.create_or_update(
                &ResourceId::child(lb_id.resource_group.as_str(), lb_id.name.as_str(), rule_name),
                rule,
            ))
            .await
            .annotate(Operation::CreateOrUpdate, ResourceKind::InboundNatRule, rule_name)?;

        Ok(created.id)
    }

    async fn backend_pool(
        &self,
        scope: &ClusterScope,
        kind: ResourceKind,
        lb_name: &str,
    ) -> Result<(ResourceId, Remote<LoadBalancerProperties>, SubResource), ReconcilerError> {
        let lb_id = ResourceId::new(scope.resource_group(), lb_name);
        let lb = require(scope, &*self.load_balancers, kind, &lb_id).await?;
        let pool = lb.first_backend_pool_id().ok_or_else(|| {
            ReconcilerError::configuration(format!(
                "load balancer '{lb_name}' has no backend address pool"
            ))
        })?;

        Ok((lb_id, lb, pool.into()))
    }

    async fn try_reconcile(
        &self,
        scope: &ClusterScope,
        spec: &NetworkInterfaceSpec,
    ) -> Result<(), ReconcilerError> {
        let subnet = require(
            scope,
            &*self.subnets,
            ResourceKind::Subnet,
            &ResourceId::child(
                spec.vnet_resource_group.as_str(),
                spec.vnet_name.as_str(),
                spec.subnet_name.as_str(),
            ),
        )
        .await?;

        let mut backend_pools = Vec::with_capacity(2);
        let mut nat_rules = Vec::with_capacity(1);

        if let Some(lb_name) = &spec.public_lb_name {
            let (lb_id, lb, pool) = self
                .backend_pool(scope, ResourceKind::PublicLoadBalancer, lb_name)
                .await?;
            backend_pools.push(pool);

            if spec.machine_role == Role::ControlPlane {
                let rule = self
                    .create_inbound_nat_rule(scope, &lb_id, &lb, spec.nat_rule_name())
                    .await?;
                nat_rules.push(SubResource::from(rule));
            }
        }

        if let Some(lb_name) = &spec.internal_lb_name {
            let (_, _, pool) = self
                .backend_pool(scope, ResourceKind::InternalLoadBalancer, lb_name)
                .await?;
            backend_pools.push(pool);
        }

        let public_ip = match &spec.public_ip_name {
            Some(name) => Some(
                require(
                    scope,
                    &*self.public_ips,
                    ResourceKind::PublicIp,
                    &ResourceId::new(scope.resource_group(), name.as_str()),
                )
                .await?
                .as_sub_resource(),
            ),
            None => None,
        };

        let accelerated_networking = resolve_accelerated_networking(
            spec.accelerated_networking,
            &spec.vm_size,
            &*self.skus,
            scope.call(),
        )
        .await?;

        let properties = NetworkInterfaceProperties {
            location: scope.location().to_owned(),
            ip_configurations: vec![InterfaceIpConfiguration {
                name: IP_CONFIGURATION_NAME.to_owned(),
                subnet: subnet.as_sub_resource(),
                private_ip_allocation: IpAllocation::from_requested(spec.static_ip_address),
                load_balancer_backend_address_pools: backend_pools,
                load_balancer_inbound_nat_rules: nat_rules,
                public_ip_address: public_ip,
            }],
            enable_accelerated_networking: accelerated_networking,
        };

        apply(
            scope,
            &*self.interfaces,
            ResourceKind::NetworkInterface,
            &ResourceId::new(scope.resource_group(), spec.name.as_str()),
            properties,
        )
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ResourceReconciler for NetworkInterfaceReconciler {
    type Spec = NetworkInterfaceSpec;

    async fn reconcile(
        &self,
        scope: &ClusterScope,
        spec: &NetworkInterfaceSpec,
    ) -> Result<(), ReconcilerError> {
        self.try_reconcile(scope, spec)
            .await
            .annotate(Operation::Reconcile, ResourceKind::NetworkInterface, &spec.name)
    }

    async fn delete(
        &self,
        scope: &ClusterScope,
        spec: &NetworkInterfaceSpec,
    ) -> Result<(), ReconcilerError> {
        remove(
            scope,
            &*self.interfaces,
            ResourceKind::NetworkInterface,
            &ResourceId::new(scope.resource_group(), spec.name.as_str()),
        )
        .await?;

        if let Some(lb_name) = &spec.public_lb_name {
            remove(
                scope,
                &*self.nat_rules,
                ResourceKind::InboundNatRule,
                &ResourceId::child(scope.resource_group(), lb_name.as_str(), spec.nat_rule_name()),
            )
            .await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use crate::{
        capability::{SkuCatalog, SkuInfo},
        cluster::Role,
        error::{ClientError, Operation, ReconcilerError},
        provider::memory::MemoryProvider,
        reconciler::ResourceReconciler,
        resources::{
            interface::{InboundNatRuleProperties, NetworkInterfaceProperties},
            load_balancer::{FrontendIpConfiguration, LoadBalancerProperties},
            network::{SubnetProperties, VirtualNetworkProperties},
            IpAllocation, Remote, ResourceId, ResourceKind, TransportProtocol,
        },
        scope::{
            tests::{demo_scope, machine, SUBSCRIPTION},
            ClusterScope,
        },
    };

    use super::{allocate_frontend_port, NetworkInterfaceReconciler};

    const RG: &str = "demo-rg";

    fn balancer(name: &str) -> LoadBalancerProperties {
        LoadBalancerProperties {
            location: "westeurope".to_owned(),
            frontend_ip_configurations: vec![FrontendIpConfiguration {
                name: format!("{name}-frontEnd"),
                private_ip_allocation: None,
                subnet: None,
                public_ip_address: None,
            }],
            backend_address_pools: vec![format!("{name}-backendPool")],
            load_balancing_rules: vec![],
            probes: vec![],
            outbound_rules: vec![],
            inbound_nat_rules: None,
        }
    }

    fn nat_rule(frontend_port: u16) -> InboundNatRuleProperties {
        InboundNatRuleProperties {
            frontend_ip_configuration: "/lb/frontEnd".to_owned().into(),
            frontend_port,
            backend_port: 22,
            protocol: TransportProtocol::Tcp,
            enable_floating_ip: false,
            idle_timeout_in_minutes: 4,
        }
    }

    async fn seeded_provider(ports: &[u16]) -> MemoryProvider {
        let provider = MemoryProvider::new(SUBSCRIPTION).with_skus(
            SkuCatalog::default()
                .with_sku(
                    "Standard_D2s_v3",
                    SkuInfo {
                        accelerated_networking: true,
                    },
                )
                .with_sku("Standard_B2s", SkuInfo::default()),
        );

        provider
            .insert(
                ResourceId::new(RG, "demo-vnet"),
                VirtualNetworkProperties {
                    location: "westeurope".to_owned(),
                    address_prefixes: vec!["10.0.0.0/16".parse().unwrap()],
                },
            )
            .await;
        for (subnet, cidr) in [
            ("demo-controlplane-subnet", "10.0.0.0/24"),
            ("demo-node-subnet", "10.0.1.0/24"),
        ] {
            provider
                .insert(
                    ResourceId::child(RG, "demo-vnet", subnet),
                    SubnetProperties {
                        address_prefixes: vec![cidr.parse().unwrap()],
                        network_security_group: None,
                        route_table: None,
                    },
                )
                .await;
        }
        for lb in ["demo-public-lb", "demo-internal-lb"] {
            provider.insert(ResourceId::new(RG, lb), balancer(lb)).await;
        }
        for (index, port) in ports.iter().enumerate() {
            provider
                .insert(
                    ResourceId::child(RG, "demo-public-lb", format!("existing-{index}")),
                    nat_rule(*port),
                )
                .await;
        }

        provider
    }

    fn control_plane_nic(scope: &ClusterScope, name: &str) -> crate::cluster::NetworkInterfaceSpec {
        scope
            .nic_spec_for(&machine(name, Role::ControlPlane, "Standard_D2s_v3"))
            .unwrap()
    }

    async fn nat_rule_port(provider: &MemoryProvider, machine: &str) -> Option<u16> {
        provider
            .lookup::<InboundNatRuleProperties>(&ResourceId::child(RG, "demo-public-lb", machine))
            .await
            .and_then(|rule| rule.properties)
            .map(|rule| rule.frontend_port)
    }

    #[test]
    fn ssh_port_is_preferred() {
        assert_eq!(allocate_frontend_port(&HashSet::new()), Some(22));
        assert_eq!(allocate_frontend_port(&HashSet::from([2201])), Some(22));
    }

    #[test]
    fn first_free_fallback_port_is_used() {
        assert_eq!(allocate_frontend_port(&HashSet::from([22, 2201, 2202])), Some(2203));
        assert_eq!(allocate_frontend_port(&HashSet::from([22, 2202])), Some(2201));
    }

    #[test]
    fn fallback_range_is_bounded() {
        let mut used: HashSet<u16> = (2201..=2219).collect();
        used.insert(22);

        assert_eq!(allocate_frontend_port(&used), None);

        used.remove(&2219);
        assert_eq!(allocate_frontend_port(&used), Some(2219));
    }

    #[tokio::test]
    async fn control_plane_nic_joins_both_pools_and_gets_a_nat_rule() {
        let provider = seeded_provider(&[22, 2201, 2202]).await;
        let scope = demo_scope(false);
        let spec = control_plane_nic(&scope, "demo-control-plane-0");

        NetworkInterfaceReconciler::new(&provider.clients())
            .reconcile(&scope, &spec)
            .await
            .unwrap();

        let nic = provider
            .lookup::<NetworkInterfaceProperties>(&ResourceId::new(RG, "demo-control-plane-0-nic"))
            .await
            .and_then(|nic| nic.properties)
            .unwrap();
        let ip_configuration = &nic.ip_configurations[0];
        let pools: Vec<_> = ip_configuration
            .load_balancer_backend_address_pools
            .iter()
            .map(|pool| pool.id.rsplit('/').next().unwrap().to_owned())
            .collect();

        assert_eq!(ip_configuration.name, "pipConfig");
        assert_eq!(pools, vec!["demo-public-lb-backendPool", "demo-internal-lb-backendPool"]);
        assert!(ip_configuration.load_balancer_inbound_nat_rules[0]
            .id
            .ends_with("/loadBalancers/demo-public-lb/inboundNatRules/demo-control-plane-0"));
        assert!(nic.enable_accelerated_networking);
        assert_eq!(nat_rule_port(&provider, "demo-control-plane-0").await, Some(2203));
    }

    #[tokio::test]
    async fn nat_rule_creation_is_idempotent() {
        let provider = seeded_provider(&[]).await;
        let scope = demo_scope(false);
        let clients = provider.clients();
        let reconciler = NetworkInterfaceReconciler::new(&clients);
        let lb_id = ResourceId::new(RG, "demo-public-lb");

        for _ in 0..2 {
            let lb = clients.load_balancers.get(&lb_id).await.unwrap();
            reconciler
                .create_inbound_nat_rule(&scope, &lb_id, &lb, "demo-control-plane-0")
                .await
                .unwrap();
        }

        let lb = clients.load_balancers.get(&lb_id).await.unwrap();
        assert_eq!(lb.inbound_nat_rules().map(<[_]>::len), Some(1));
        assert_eq!(provider.journal().await.len(), 1);
        assert_eq!(nat_rule_port(&provider, "demo-control-plane-0").await, Some(22));
    }

    #[tokio::test]
    async fn exhausted_port_range_creates_nothing() {
        let mut ports = vec![22];
        ports.extend(2201..=2219);
        let provider = seeded_provider(&ports).await;
        let scope = demo_scope(false);
        let clients = provider.clients();
        let lb_id = ResourceId::new(RG, "demo-public-lb");
        let lb = clients.load_balancers.get(&lb_id).await.unwrap();

        let error = NetworkInterfaceReconciler::new(&clients)
            .create_inbound_nat_rule(&scope, &lb_id, &lb, "demo-control-plane-0")
            .await
            .unwrap_err();

        assert!(matches!(error, ReconcilerError::PortRangeExhausted { .. }));
        assert!(provider.journal().await.is_empty());
        assert_eq!(nat_rule_port(&provider, "demo-control-plane-0").await, None);
    }

    #[tokio::test]
    async fn balancer_without_rule_list_is_a_configuration_error() {
        let provider = seeded_provider(&[]).await;
        let scope = demo_scope(false);
        let clients = provider.clients();
        let lb_id = ResourceId::new(RG, "demo-public-lb");
        let mut lb = clients.load_balancers.get(&lb_id).await.unwrap();
        lb.properties.as_mut().unwrap().inbound_nat_rules = None;

        let error = NetworkInterfaceReconciler::new(&clients)
            .create_inbound_nat_rule(&scope, &lb_id, &lb, "demo-control-plane-0")
            .await
            .unwrap_err();

        assert!(matches!(error, ReconcilerError::Configuration(_)));

        lb.properties = None;
        let error = NetworkInterfaceReconciler::new(&clients)
            .create_inbound_nat_rule(&scope, &lb_id, &lb, "demo-control-plane-0")
            .await
            .unwrap_err();

        assert!(matches!(error, ReconcilerError::Configuration(_)));
        assert!(provider.journal().await.is_empty());
    }

    #[tokio::test]
    async fn rule_with_unknown_port_blocks_allocation() {
        let provider = seeded_provider(&[]).await;
        let scope = demo_scope(false);
        let clients = provider.clients();
        let lb_id = ResourceId::new(RG, "demo-public-lb");
        let mut lb = clients.load_balancers.get(&lb_id).await.unwrap();
        lb.properties.as_mut().unwrap().inbound_nat_rules = Some(vec![Remote {
            id: format!("{}/inboundNatRules/demo-control-plane-1", lb.id),
            name: "demo-control-plane-1".to_owned(),
            properties: None,
        }]);

        let error = NetworkInterfaceReconciler::new(&clients)
            .create_inbound_nat_rule(&scope, &lb_id, &lb, "demo-control-plane-0")
            .await
            .unwrap_err();

        assert!(matches!(error, ReconcilerError::Configuration(_)));
        assert!(provider.journal().await.is_empty());
        assert_eq!(nat_rule_port(&provider, "demo-control-plane-0").await, None);
    }

    #[tokio::test]
    async fn node_nic_defaults_follow_the_sku() {
        let provider = seeded_provider(&[]).await;
        let scope = demo_scope(false);
        let spec = scope
            .nic_spec_for(&machine("demo-md-0", Role::Node, "Standard_B2s"))
            .unwrap();

        NetworkInterfaceReconciler::new(&provider.clients())
            .reconcile(&scope, &spec)
            .await
            .unwrap();

        let nic = provider
            .lookup::<NetworkInterfaceProperties>(&ResourceId::new(RG, "demo-md-0-nic"))
            .await
            .and_then(|nic| nic.properties)
            .unwrap();

        assert!(!nic.enable_accelerated_networking);
        assert_eq!(nic.ip_configurations[0].private_ip_allocation, IpAllocation::Dynamic);
        assert!(nic.ip_configurations[0].load_balancer_backend_address_pools.is_empty());
        assert!(nic.ip_configurations[0].load_balancer_inbound_nat_rules.is_empty());
    }

    #[tokio::test]
    async fn static_address_and_explicit_acceleration_are_kept() {
        let provider = seeded_provider(&[]).await;
        let scope = demo_scope(false);
        let mut node = machine("demo-md-0", Role::Node, "Unknown_Size");
        node.static_ip_address = Some("10.0.1.20".parse().unwrap());
        node.accelerated_networking = Some(false);

        NetworkInterfaceReconciler::new(&provider.clients())
            .reconcile(&scope, &scope.nic_spec_for(&node).unwrap())
            .await
            .unwrap();

        let nic = provider
            .lookup::<NetworkInterfaceProperties>(&ResourceId::new(RG, "demo-md-0-nic"))
            .await
            .and_then(|nic| nic.properties)
            .unwrap();

        assert_eq!(
            nic.ip_configurations[0].private_ip_allocation,
            IpAllocation::Static("10.0.1.20".parse().unwrap())
        );
    }

    #[tokio::test]
    async fn sku_lookup_failure_is_propagated() {
        let provider = seeded_provider(&[]).await;
        let scope = demo_scope(false);
        let spec = scope
            .nic_spec_for(&machine("demo-md-0", Role::Node, "Unknown_Size"))
            .unwrap();

        let error = NetworkInterfaceReconciler::new(&provider.clients())
            .reconcile(&scope, &spec)
            .await
            .unwrap_err();

        assert_eq!(
            error.client_error(),
            Some(&ClientError::not_found(ResourceKind::VmSku, "Unknown_Size"))
        );
        assert!(provider.journal().await.is_empty());
    }

    #[tokio::test]
    async fn batch_stops_at_the_first_failing_nic() {
        let provider = seeded_provider(&[]).await;
        let scope = demo_scope(false);
        let mut broken = control_plane_nic(&scope, "demo-control-plane-0");
        broken.subnet_name = "missing-subnet".to_owned();
        let healthy = control_plane_nic(&scope, "demo-control-plane-1");

        let error = NetworkInterfaceReconciler::new(&provider.clients())
            .reconcile_all(&scope, &[broken, healthy])
            .await
            .unwrap_err();

        assert!(error.is_not_found());
        assert!(error
            .to_string()
            .starts_with("Couldn't reconcile network interface 'demo-control-plane-0-nic'!"));
        assert!(provider.journal().await.is_empty());
    }

    #[tokio::test]
    async fn delete_removes_nic_and_nat_rule_and_tolerates_missing_ones() {
        let provider = seeded_provider(&[]).await;
        let scope = demo_scope(false);
        let reconciler = NetworkInterfaceReconciler::new(&provider.clients());
        let specs = vec![
            control_plane_nic(&scope, "demo-control-plane-0"),
            control_plane_nic(&scope, "demo-control-plane-1"),
        ];
        reconciler.reconcile(&scope, &specs[0]).await.unwrap();

        reconciler.delete_all(&scope, &specs).await.unwrap();

        assert_eq!(nat_rule_port(&provider, "demo-control-plane-0").await, None);
        assert_eq!(
            provider
                .lookup::<NetworkInterfaceProperties>(&ResourceId::new(
                    RG,
                    "demo-control-plane-0-nic"
                ))
                .await,
            None
        );
    }

    #[tokio::test]
    async fn delete_stops_on_provider_errors() {
        let provider = seeded_provider(&[]).await;
        let scope = demo_scope(false);
        let specs = vec![
            control_plane_nic(&scope, "demo-control-plane-0"),
            control_plane_nic(&scope, "demo-control-plane-1"),
        ];
        let reconciler = NetworkInterfaceReconciler::new(&provider.clients());
        reconciler.reconcile_all(&scope, &specs).await.unwrap();
        provider.take_journal().await;
        provider
            .inject_fault(
                Operation::Delete,
                ResourceKind::NetworkInterface,
                "demo-control-plane-0-nic",
                ClientError::Throttled,
                Some(1),
            )
            .await;

        let error = reconciler.delete_all(&scope, &specs).await.unwrap_err();

        assert!(error.is_retryable());
        assert!(provider.journal().await.is_empty());
        assert_eq!(nat_rule_port(&provider, "demo-control-plane-1").await, Some(2201));
    }
}
