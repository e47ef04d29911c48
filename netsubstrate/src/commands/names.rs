use anyhow::Context;
use netsubstrate_core::{
    cluster::Role, naming, resources::ResourceKind, scope::AllocatedState,
};
use netsubstrate_macros::TableRow;
use serde::Serialize;

use crate::{
    cli::NamesArgs,
    config::ClusterConfig,
    output::{CliPrint, TableCellOption},
};

#[derive(Serialize, TableRow)]
#[serde(rename_all = "camelCase")]
pub struct NameView {
    kind: ResourceKind,
    #[name_column]
    name: String,
    parent: TableCellOption<String>,
}

impl NameView {
    fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            parent: None.into(),
        }
    }

    fn child_of(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into()).into();
        self
    }
}

pub fn names(args: NamesArgs) -> anyhow::Result<()> {
    let config =
        ClusterConfig::load(&args.config).context("Couldn't load the cluster configuration!")?;

    derived_names(&config)?.print(args.output)
}

/// Every name a reconciliation of `config` would use, in creation order.
fn derived_names(config: &ClusterConfig) -> anyhow::Result<Vec<NameView>> {
    let scope = config.scope(AllocatedState::default());
    let network = scope.network();
    let mut names = vec![
        NameView::new(ResourceKind::ResourceGroup, scope.resource_group()),
        NameView::new(ResourceKind::VirtualNetwork, scope.vnet().name.as_str()),
    ];

    for subnet in network.subnets() {
        names.push(NameView::new(ResourceKind::SecurityGroup, subnet.security_group.as_str()));
    }

    for subnet in network.subnets() {
        if let Some(route_table) = &subnet.route_table {
            names.push(NameView::new(ResourceKind::RouteTable, route_table.as_str()));
        }
    }

    for subnet in network.subnets() {
        names.push(
            NameView::new(ResourceKind::Subnet, subnet.name.as_str())
                .child_of(scope.vnet().name.as_str()),
        );
    }

    names.push(NameView::new(ResourceKind::InternalLoadBalancer, scope.internal_lb_name()));
    let api_server_ip = scope.resolved_api_server_ip_name();
    let dns_name = network
        .api_server_ip
        .dns_name
        .clone()
        .unwrap_or_else(|| naming::fqdn(&api_server_ip, scope.location()));

    names.push(NameView::new(ResourceKind::PublicIp, api_server_ip.as_str()));
    // DNS label of the API server IP
    names.push(NameView::new(ResourceKind::PublicIp, dns_name).child_of(api_server_ip.as_str()));
    names.push(NameView::new(ResourceKind::PublicLoadBalancer, scope.api_server_lb_name()));

    if scope.is_ipv6_enabled() {
        names.push(NameView::new(ResourceKind::PublicIp, scope.egress_ip_name()));
        names.push(NameView::new(ResourceKind::PublicLoadBalancer, scope.egress_lb_name()));
    }

    for machine in &config.machines {
        let nic = scope
            .nic_spec_for(machine)
            .with_context(|| format!("Couldn't resolve the interface of '{}'!", machine.name))?;

        names.push(NameView::new(ResourceKind::NetworkInterface, nic.name.as_str()));

        match &nic.public_lb_name {
            Some(public_lb) if nic.machine_role == Role::ControlPlane => names.push(
                NameView::new(ResourceKind::InboundNatRule, nic.nat_rule_name())
                    .child_of(public_lb.as_str()),
            ),
            _ => {}
        }
    }

    Ok(names)
}
