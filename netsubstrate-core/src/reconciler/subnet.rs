use std::{net::IpAddr, sync::Arc};

use async_trait::async_trait;
use ipnet::IpNet;

use crate::{
    cluster::{Role, SubnetDescriptor},
    error::ReconcilerError,
    helpers::AndIfSome,
    provider::{NetworkClients, ResourceClient},
    resources::{
        network::{
            RouteTableProperties, SecurityGroupProperties, SubnetProperties,
            VirtualNetworkProperties,
        },
        ResourceId, ResourceKind,
    },
    scope::ClusterScope,
};

use super::{apply, remove, require, ResourceReconciler};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetSpec {
    pub name: String,
    pub role: Role,
    pub vnet_resource_group: String,
    pub vnet_name: String,
    pub cidr_block: IpNet,
    pub ipv6_cidr_block: Option<IpNet>,
    pub security_group: ResourceId,
    pub route_table: Option<ResourceId>,
    pub internal_lb_ip_address: Option<IpAddr>,
}

impl SubnetSpec {
    pub fn for_subnet(scope: &ClusterScope, subnet: &SubnetDescriptor) -> Self {
        Self {
            name: subnet.name.to_owned(),
            role: subnet.role,
            vnet_resource_group: scope.vnet_resource_group().to_owned(),
            vnet_name: scope.vnet().name.to_owned(),
            cidr_block: subnet.cidr_block,
            ipv6_cidr_block: subnet.ipv6_cidr_block.filter(|_| scope.is_ipv6_enabled()),
            security_group: ResourceId::new(scope.resource_group(), subnet.security_group.as_str()),
            route_table: subnet
                .route_table
                .as_ref()
                .map(|name| ResourceId::new(scope.resource_group(), name.as_str())),
            internal_lb_ip_address: subnet.internal_lb_ip_address,
        }
    }

    pub fn id(&self) -> ResourceId {
        ResourceId::child(
            self.vnet_resource_group.as_str(),
            self.vnet_name.as_str(),
            self.name.as_str(),
        )
    }

    pub fn address_prefixes(&self) -> Vec<IpNet> {
        vec![self.cidr_block].and_if_some(
            || self.ipv6_cidr_block,
            |mut prefixes: Vec<IpNet>, ipv6: IpNet| {
                prefixes.push(ipv6);
                prefixes
            },
        )
    }

    /// The static internal load balancer address has to be routable inside the subnet.
    pub fn validate(&self) -> Result<(), ReconcilerError> {
        match self.internal_lb_ip_address {
            Some(address) if !self.cidr_block.contains(&address) => {
                Err(ReconcilerError::configuration(format!(
                    "internal load balancer address {address} is outside of subnet '{}' ({})",
                    self.name, self.cidr_block
                )))
            }
            _ => Ok(()),
        }
    }
}

pub struct SubnetReconciler {
    subnets: Arc<dyn ResourceClient<SubnetProperties>>,
    virtual_networks: Arc<dyn ResourceClient<VirtualNetworkProperties>>,
    security_groups: Arc<dyn ResourceClient<SecurityGroupProperties>>,
    route_tables: Arc<dyn ResourceClient<RouteTableProperties>>,
}

impl SubnetReconciler {
    pub fn new(clients: &NetworkClients) -> Self {
        Self {
            subnets: clients.subnets.clone(),
            virtual_networks: clients.virtual_networks.clone(),
            security_groups: clients.security_groups.clone(),
            route_tables: clients.route_tables.clone(),
        }
    }
}

#[async_trait]
impl ResourceReconciler for SubnetReconciler {
    type Spec = SubnetSpec;

    async fn reconcile(&self, scope: &ClusterScope, spec: &SubnetSpec) -> Result<(), ReconcilerError> {
        spec.validate()?;

        require(
            scope,
            &*self.virtual_networks,
            ResourceKind::VirtualNetwork,
            &ResourceId::new(spec.vnet_resource_group.as_str(), spec.vnet_name.as_str()),
        )
        .await?;

        let security_group = require(
            scope,
            &*self.security_groups,
            ResourceKind::SecurityGroup,
            &spec.security_group,
        )
        .await?;

        let route_table = match &spec.route_table {
            Some(id) => Some(
                require(scope, &*self.route_tables, ResourceKind::RouteTable, id)
                    .await?
                    .as_sub_resource(),
            ),
            None => None,
        };

        let properties = SubnetProperties {
            address_prefixes: spec.address_prefixes(),
            network_security_group: Some(security_group.as_sub_resource()),
            route_table,
        };

        apply(scope, &*self.subnets, ResourceKind::Subnet, &spec.id(), properties).await?;

        Ok(())
    }

    async fn delete(&self, scope: &ClusterScope, spec: &SubnetSpec) -> Result<(), ReconcilerError> {
        remove(scope, &*self.subnets, ResourceKind::Subnet, &spec.id()).await
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        error::ReconcilerError,
        provider::memory::MemoryProvider,
        reconciler::ResourceReconciler,
        resources::{
            network::{SubnetProperties, VirtualNetworkProperties},
            ResourceId,
        },
        scope::tests::{demo_scope, SUBSCRIPTION},
    };

    use super::{SubnetReconciler, SubnetSpec};

    #[test]
    fn internal_lb_address_must_be_inside_the_subnet() {
        let scope = demo_scope(false);
        let mut spec = SubnetSpec::for_subnet(&scope, scope.control_plane_subnet());

        assert!(spec.validate().is_ok());

        spec.internal_lb_ip_address = Some("10.0.1.10".parse().unwrap());
        assert!(matches!(
            spec.validate(),
            Err(ReconcilerError::Configuration(_))
        ));
    }

    #[test]
    fn dual_stack_subnets_carry_both_prefixes() {
        let scope = demo_scope(true);
        let spec = SubnetSpec::for_subnet(&scope, scope.node_subnet());

        assert_eq!(spec.address_prefixes().len(), 2);
        assert_eq!(
            spec.route_table,
            Some(ResourceId::new("demo-rg", "demo-node-routetable"))
        );
    }

    #[tokio::test]
    async fn missing_security_group_is_fatal() {
        let provider = MemoryProvider::new(SUBSCRIPTION);
        let scope = demo_scope(false);
        let spec = SubnetSpec::for_subnet(&scope, scope.control_plane_subnet());
        provider
            .insert(
                ResourceId::new("demo-rg", "demo-vnet"),
                VirtualNetworkProperties {
                    location: "westeurope".to_owned(),
                    address_prefixes: vec!["10.0.0.0/16".parse().unwrap()],
                },
            )
            .await;

        let error = SubnetReconciler::new(&provider.clients())
            .reconcile(&scope, &spec)
            .await
            .unwrap_err();

        assert!(error.is_not_found());
        assert!(error.to_string().contains("network security group 'demo-controlplane-nsg'"));
        assert_eq!(provider.lookup::<SubnetProperties>(&spec.id()).await, None);
    }
}
