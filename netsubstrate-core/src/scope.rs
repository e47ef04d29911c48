use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    call::CallContext,
    cluster::{
        nic_name, ClusterIdentity, ClusterNetworkSpec, MachineDescriptor, NetworkInterfaceSpec,
        NetworkInterfaceSpecBuilder, Role, SubnetDescriptor, VnetDescriptor,
    },
    error::ReconcilerError,
    naming,
};

/// Values derived while reconciling, persisted by the caller afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AllocatedState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_server_ip_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_server_dns_name: Option<String>,
    pub failure_domains: BTreeMap<String, FailureDomain>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureDomain {
    pub control_plane: bool,
}

/// Everything a single reconciliation pass reads, plus the handful of
/// derived fields it is allowed to write.
#[derive(Debug, Clone)]
pub struct ClusterScope {
    identity: ClusterIdentity,
    network: ClusterNetworkSpec,
    allocated: AllocatedState,
    call: CallContext,
}

impl ClusterScope {
    pub fn new(
        identity: ClusterIdentity,
        network: ClusterNetworkSpec,
        allocated: AllocatedState,
    ) -> Self {
        Self {
            identity,
            network,
            allocated,
            call: CallContext::default(),
        }
    }

    pub fn with_call_context(mut self, call: CallContext) -> Self {
        self.call = call;
        self
    }

    pub fn identity(&self) -> &ClusterIdentity {
        &self.identity
    }

    pub fn cluster_name(&self) -> &str {
        &self.identity.cluster_name
    }

    pub fn subscription_id(&self) -> &str {
        &self.identity.subscription_id
    }

    pub fn resource_group(&self) -> &str {
        &self.identity.resource_group
    }

    pub fn location(&self) -> &str {
        &self.identity.location
    }

    pub fn network(&self) -> &ClusterNetworkSpec {
        &self.network
    }

    pub fn vnet(&self) -> &VnetDescriptor {
        &self.network.vnet
    }

    pub fn vnet_resource_group(&self) -> &str {
        self.network
            .vnet
            .resource_group
            .as_deref()
            .unwrap_or(&self.identity.resource_group)
    }

    pub fn control_plane_subnet(&self) -> &SubnetDescriptor {
        &self.network.control_plane_subnet
    }

    pub fn node_subnet(&self) -> &SubnetDescriptor {
        &self.network.node_subnet
    }

    pub fn is_ipv6_enabled(&self) -> bool {
        self.network.is_ipv6_enabled()
    }

    pub fn call(&self) -> &CallContext {
        &self.call
    }

    pub fn allocated(&self) -> &AllocatedState {
        &self.allocated
    }

    pub fn into_allocated(self) -> AllocatedState {
        self.allocated
    }

    pub fn api_server_ip_name(&self) -> Option<&str> {
        self.allocated.api_server_ip_name.as_deref()
    }

    pub fn api_server_dns_name(&self) -> Option<&str> {
        self.allocated.api_server_dns_name.as_deref()
    }

    /// Assigned name, else the requested one, else the generated one.
    pub fn resolved_api_server_ip_name(&self) -> String {
        self.api_server_ip_name()
            .or(self.network.api_server_ip.name.as_deref())
            .map(str::to_owned)
            .unwrap_or_else(|| {
                naming::api_server_ip_name(
                    self.subscription_id(),
                    self.resource_group(),
                    self.cluster_name(),
                )
            })
    }

    pub fn failure_domains(&self) -> &BTreeMap<String, FailureDomain> {
        &self.allocated.failure_domains
    }

    pub fn internal_lb_name(&self) -> String {
        naming::internal_lb_name(self.cluster_name())
    }

    pub fn api_server_lb_name(&self) -> String {
        naming::api_server_lb_name(self.cluster_name())
    }

    pub fn egress_lb_name(&self) -> String {
        naming::egress_lb_name(self.cluster_name())
    }

    pub fn egress_ip_name(&self) -> String {
        naming::egress_ip_name(
            self.subscription_id(),
            self.resource_group(),
            self.cluster_name(),
        )
    }

    pub(crate) fn set_api_server_ip_name(&mut self, name: String) {
        debug!("Assigned API server IP name '{name}'");
        self.allocated.api_server_ip_name = Some(name);
    }

    pub(crate) fn set_api_server_dns_name(&mut self, dns_name: String) {
        debug!("Assigned API server DNS name '{dns_name}'");
        self.allocated.api_server_dns_name = Some(dns_name);
    }

    pub(crate) fn set_failure_domain(&mut self, zone: String, domain: FailureDomain) {
        self.allocated.failure_domains.insert(zone, domain);
    }

    /// Resolves which subnet, load balancers and public IP a machine's
    /// interface attaches to.
    pub fn nic_spec_for(
        &self,
        machine: &MachineDescriptor,
    ) -> Result<NetworkInterfaceSpec, ReconcilerError> {
        let mut builder = NetworkInterfaceSpecBuilder::default();

        builder
            .name(nic_name(&machine.name))
            .machine_name(machine.name.as_str())
            .machine_role(machine.role)
            .subnet_name(self.network.subnet_for(machine.role).name.as_str())
            .vnet_name(self.vnet().name.as_str())
            .vnet_resource_group(self.vnet_resource_group())
            .vm_size(machine.vm_size.as_str());

        match machine.role {
            Role::ControlPlane => {
                builder
                    .public_lb_name(self.api_server_lb_name())
                    .internal_lb_name(self.internal_lb_name());
            }
            Role::Node if self.is_ipv6_enabled() => {
                builder.public_lb_name(self.egress_lb_name());
            }
            Role::Node => {}
        }

        if let Some(address) = machine.static_ip_address {
            builder.static_ip_address(address);
        }

        if let Some(public_ip) = &machine.public_ip_name {
            builder.public_ip_name(public_ip.as_str());
        }

        if let Some(accelerated) = machine.accelerated_networking {
            builder.accelerated_networking(accelerated);
        }

        builder
            .build()
            .map_err(|err| ReconcilerError::configuration(err.to_string()))
    }
}
