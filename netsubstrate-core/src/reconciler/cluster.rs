//! Cluster-level ordering of the per-kind reconcilers.
//!
//! Reconcile walks dependencies forwards and Delete walks them backwards.
//! Both stop at the first failing step and are safe to re-run from scratch.

use std::sync::Arc;

use log::{debug, info};

use crate::{
    error::{Annotate, Operation, ReconcilerError},
    naming,
    provider::{AvailabilityZones, NetworkClients},
    resources::ResourceKind,
    scope::{ClusterScope, FailureDomain},
};

use super::{
    group::{GroupReconciler, GroupSpec},
    load_balancer::{LoadBalancerReconciler, LoadBalancerSpec},
    public_ip::{PublicIpReconciler, PublicIpSpec},
    route_table::{RouteTableReconciler, RouteTableSpec},
    security_group::{SecurityGroupReconciler, SecurityGroupSpec},
    subnet::{SubnetReconciler, SubnetSpec},
    vnet::{VnetReconciler, VnetSpec},
    ResourceReconciler,
};

pub struct ClusterReconciler {
    groups: GroupReconciler,
    vnets: VnetReconciler,
    security_groups: SecurityGroupReconciler,
    route_tables: RouteTableReconciler,
    subnets: SubnetReconciler,
    load_balancers: LoadBalancerReconciler,
    public_ips: PublicIpReconciler,
    zones: Arc<dyn AvailabilityZones>,
}

impl ClusterReconciler {
    pub fn new(clients: &NetworkClients) -> Self {
        Self {
            groups: GroupReconciler::new(clients),
            vnets: VnetReconciler::new(clients),
            security_groups: SecurityGroupReconciler::new(clients),
            route_tables: RouteTableReconciler::new(clients),
            subnets: SubnetReconciler::new(clients),
            load_balancers: LoadBalancerReconciler::new(clients),
            public_ips: PublicIpReconciler::new(clients),
            zones: clients.zones.clone(),
        }
    }

    pub async fn reconcile(&self, scope: &mut ClusterScope) -> Result<(), ReconcilerError> {
        info!("Reconciling network of cluster '{}'...", scope.cluster_name());

        assign_api_server_ip(scope);
        self.discover_failure_domains(scope).await?;

        let scope = &*scope;

        self.groups
            .reconcile(scope, &GroupSpec::for_cluster(scope))
            .await?;
        self.vnets
            .reconcile(scope, &VnetSpec::for_cluster(scope))
            .await?;

        for subnet in scope.network().subnets() {
            self.security_groups
                .reconcile(scope, &SecurityGroupSpec::for_subnet(scope, subnet))
                .await?;
        }

        for route_table in route_tables(scope) {
            self.route_tables.reconcile(scope, &route_table).await?;
        }

        for subnet in scope.network().subnets() {
            self.subnets
                .reconcile(scope, &SubnetSpec::for_subnet(scope, subnet))
                .await?;
        }

        self.load_balancers
            .reconcile(scope, &LoadBalancerSpec::internal(scope))
            .await?;

        let api_server_ip = PublicIpSpec::api_server(scope, &scope.resolved_api_server_ip_name());
        self.public_ips.reconcile(scope, &api_server_ip).await?;
        self.load_balancers
            .reconcile(scope, &LoadBalancerSpec::api_server(scope, &api_server_ip.name))
            .await?;

        if scope.is_ipv6_enabled() {
            debug!("IPv6 is enabled, reconciling egress load balancer...");
            self.public_ips
                .reconcile(scope, &PublicIpSpec::egress(scope))
                .await?;
            self.load_balancers
                .reconcile(scope, &LoadBalancerSpec::egress(scope))
                .await?;
        }

        info!("Network of cluster '{}' is reconciled", scope.cluster_name());

        Ok(())
    }

    pub async fn delete(&self, scope: &ClusterScope) -> Result<(), ReconcilerError> {
        info!("Deleting network of cluster '{}'...", scope.cluster_name());

        let api_server_ip = PublicIpSpec::api_server(scope, &scope.resolved_api_server_ip_name());

        self.load_balancers
            .delete(scope, &LoadBalancerSpec::api_server(scope, &api_server_ip.name))
            .await?;
        self.public_ips.delete(scope, &api_server_ip).await?;

        if scope.is_ipv6_enabled() {
            self.load_balancers
                .delete(scope, &LoadBalancerSpec::egress(scope))
                .await?;
            self.public_ips
                .delete(scope, &PublicIpSpec::egress(scope))
                .await?;
        }

        self.load_balancers
            .delete(scope, &LoadBalancerSpec::internal(scope))
            .await?;

        for subnet in scope.network().subnets() {
            self.subnets
                .delete(scope, &SubnetSpec::for_subnet(scope, subnet))
                .await?;
        }

        for route_table in route_tables(scope) {
            self.route_tables.delete(scope, &route_table).await?;
        }

        for subnet in scope.network().subnets().into_iter().rev() {
            self.security_groups
                .delete(scope, &SecurityGroupSpec::for_subnet(scope, subnet))
                .await?;
        }

        self.vnets
            .delete(scope, &VnetSpec::for_cluster(scope))
            .await?;
        self.groups
            .delete(scope, &GroupSpec::for_cluster(scope))
            .await?;

        info!("Network of cluster '{}' is deleted", scope.cluster_name());

        Ok(())
    }

    /// Records every zone of the region as control-plane eligible. Zones
    /// recorded earlier are kept even when the region stops reporting them.
    async fn discover_failure_domains(&self, scope: &mut ClusterScope) -> Result<(), ReconcilerError> {
        let zones = scope
            .call()
            .run(self.zones.list_zones(scope.location()))
            .await
            .annotate(Operation::Get, ResourceKind::AvailabilityZones, scope.location())?;

        debug!("Discovered {} zone(s) in '{}'", zones.len(), scope.location());

        for zone in zones {
            scope.set_failure_domain(
                zone,
                FailureDomain {
                    control_plane: true,
                },
            );
        }

        Ok(())
    }
}

/// Fills the API server IP and DNS names unless already assigned.
fn assign_api_server_ip(scope: &mut ClusterScope) {
    if scope.api_server_ip_name().is_none() {
        let name = scope.resolved_api_server_ip_name();
        scope.set_api_server_ip_name(name);
    }

    if scope.api_server_dns_name().is_none() {
        let dns_name = match &scope.network().api_server_ip.dns_name {
            Some(dns_name) => dns_name.to_owned(),
            None => naming::fqdn(&scope.resolved_api_server_ip_name(), scope.location()),
        };
        scope.set_api_server_dns_name(dns_name);
    }
}

/// Node route table first, then a distinct control-plane one if named.
fn route_tables(scope: &ClusterScope) -> Vec<RouteTableSpec> {
    let mut tables: Vec<RouteTableSpec> = Vec::with_capacity(2);

    for subnet in [scope.node_subnet(), scope.control_plane_subnet()] {
        if let Some(table) = RouteTableSpec::for_subnet(scope, subnet) {
            if !tables.contains(&table) {
                tables.push(table);
            }
        }
    }

    tables
}
