//! Provider backed by in-process maps.
//!
//! Assigns provider ids, exposes a load balancer's inbound NAT rules on
//! `get`, cascades deletes to child resources and journals every mutation.
//! Faults can be injected per operation and resource to exercise error paths.

use std::{collections::BTreeMap, marker::PhantomData, sync::Arc};

use async_trait::async_trait;
use log::trace;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{
    capability::SkuCatalog,
    error::{ClientError, Operation},
    naming::{child_id, resource_path},
    resources::{
        interface::{InboundNatRuleProperties, NetworkInterfaceProperties},
        load_balancer::LoadBalancerProperties,
        network::{
            GroupProperties, PublicIpProperties, RouteTableProperties, SecurityGroupProperties,
            SubnetProperties, VirtualNetworkProperties,
        },
        Properties, Remote, ResourceId, ResourceKind,
    },
};

use super::{AvailabilityZones, NetworkClients, ResourceClient, SkuCapabilities};

pub type Store<P> = BTreeMap<ResourceId, Remote<P>>;

/// A create-or-update or delete the provider accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mutation {
    pub operation: Operation,
    pub kind: ResourceKind,
    pub resource_group: String,
    pub name: String,
}

#[derive(Debug, Clone)]
struct Fault {
    operation: Operation,
    collection: &'static str,
    name: String,
    error: ClientError,
    remaining: Option<usize>,
}

#[derive(Debug, Default)]
pub struct MemoryState {
    groups: Store<GroupProperties>,
    virtual_networks: Store<VirtualNetworkProperties>,
    security_groups: Store<SecurityGroupProperties>,
    route_tables: Store<RouteTableProperties>,
    subnets: Store<SubnetProperties>,
    load_balancers: Store<LoadBalancerProperties>,
    public_ips: Store<PublicIpProperties>,
    network_interfaces: Store<NetworkInterfaceProperties>,
    inbound_nat_rules: Store<InboundNatRuleProperties>,
    journal: Vec<Mutation>,
    faults: Vec<Fault>,
}

impl MemoryState {
    fn take_fault(
        &mut self,
        operation: Operation,
        kind: ResourceKind,
        name: &str,
    ) -> Option<ClientError> {
        let index = self.faults.iter().position(|fault| {
            fault.operation == operation
                && fault.collection == kind.collection()
                && fault.name == name
        })?;

        let fault = &mut self.faults[index];
        let error = fault.error.clone();

        if let Some(remaining) = fault.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);

            if *remaining == 0 {
                self.faults.remove(index);
            }
        }

        Some(error)
    }

    fn record(&mut self, operation: Operation, kind: ResourceKind, id: &ResourceId) {
        trace!("{operation} {kind} '{id}'");

        self.journal.push(Mutation {
            operation,
            kind,
            resource_group: id.resource_group.to_owned(),
            name: id.name.to_owned(),
        });
    }

    fn resource_count(&self) -> usize {
        self.groups.len()
            + self.virtual_networks.len()
            + self.security_groups.len()
            + self.route_tables.len()
            + self.subnets.len()
            + self.load_balancers.len()
            + self.public_ips.len()
            + self.network_interfaces.len()
            + self.inbound_nat_rules.len()
    }
}

/// Typed access to one of the maps of [`MemoryState`].
pub trait MemoryCollection<P: Properties> {
    const KIND: ResourceKind;
    const PARENT: Option<ResourceKind> = None;

    fn store(&self) -> &Store<P>;
    fn store_mut(&mut self) -> &mut Store<P>;

    fn parent_exists(&self, _id: &ResourceId) -> bool {
        true
    }

    /// Strips whatever the collection does not own before storing.
    fn prepare(properties: P) -> P {
        properties
    }

    /// Fills in provider-populated views on read.
    fn decorate(&self, _id: &ResourceId, _resource: &mut Remote<P>) {}

    /// Removes resources that go away together with `id`.
    fn cascade(&mut self, _id: &ResourceId) {}
}

macro_rules! plain_collection {
    ($props:ty, $field:ident, $kind:expr) => {
        impl MemoryCollection<$props> for MemoryState {
            const KIND: ResourceKind = $kind;

            fn store(&self) -> &Store<$props> {
                &self.$field
            }

            fn store_mut(&mut self) -> &mut Store<$props> {
                &mut self.$field
            }
        }
    };
}

plain_collection!(SecurityGroupProperties, security_groups, ResourceKind::SecurityGroup);
plain_collection!(RouteTableProperties, route_tables, ResourceKind::RouteTable);
plain_collection!(PublicIpProperties, public_ips, ResourceKind::PublicIp);
plain_collection!(
    NetworkInterfaceProperties,
    network_interfaces,
    ResourceKind::NetworkInterface
);

impl MemoryCollection<GroupProperties> for MemoryState {
    const KIND: ResourceKind = ResourceKind::ResourceGroup;

    fn store(&self) -> &Store<GroupProperties> {
        &self.groups
    }

    fn store_mut(&mut self) -> &mut Store<GroupProperties> {
        &mut self.groups
    }

    fn cascade(&mut self, id: &ResourceId) {
        let group = id.resource_group.as_str();

        self.virtual_networks.retain(|key, _| key.resource_group != group);
        self.security_groups.retain(|key, _| key.resource_group != group);
        self.route_tables.retain(|key, _| key.resource_group != group);
        self.subnets.retain(|key, _| key.resource_group != group);
        self.load_balancers.retain(|key, _| key.resource_group != group);
        self.public_ips.retain(|key, _| key.resource_group != group);
        self.network_interfaces.retain(|key, _| key.resource_group != group);
        self.inbound_nat_rules.retain(|key, _| key.resource_group != group);
    }
}

impl MemoryCollection<VirtualNetworkProperties> for MemoryState {
    const KIND: ResourceKind = ResourceKind::VirtualNetwork;

    fn store(&self) -> &Store<VirtualNetworkProperties> {
        &self.virtual_networks
    }

    fn store_mut(&mut self) -> &mut Store<VirtualNetworkProperties> {
        &mut self.virtual_networks
    }

    fn cascade(&mut self, id: &ResourceId) {
        self.subnets.retain(|key, _| !is_child_of(key, id));
    }
}

impl MemoryCollection<SubnetProperties> for MemoryState {
    const KIND: ResourceKind = ResourceKind::Subnet;
    const PARENT: Option<ResourceKind> = Some(ResourceKind::VirtualNetwork);

    fn store(&self) -> &Store<SubnetProperties> {
        &self.subnets
    }

    fn store_mut(&mut self) -> &mut Store<SubnetProperties> {
        &mut self.subnets
    }

    fn parent_exists(&self, id: &ResourceId) -> bool {
        parent_id(id).is_some_and(|parent| self.virtual_networks.contains_key(&parent))
    }
}

impl MemoryCollection<LoadBalancerProperties> for MemoryState {
    const KIND: ResourceKind = ResourceKind::LoadBalancer;

    fn store(&self) -> &Store<LoadBalancerProperties> {
        &self.load_balancers
    }

    fn store_mut(&mut self) -> &mut Store<LoadBalancerProperties> {
        &mut self.load_balancers
    }

    fn prepare(properties: LoadBalancerProperties) -> LoadBalancerProperties {
        LoadBalancerProperties {
            inbound_nat_rules: None,
            ..properties
        }
    }

    fn decorate(&self, id: &ResourceId, resource: &mut Remote<LoadBalancerProperties>) {
        let rules = self
            .inbound_nat_rules
            .iter()
            .filter(|(key, _)| is_child_of(key, id))
            .map(|(_, rule)| rule.clone())
            .collect();

        if let Some(properties) = resource.properties.as_mut() {
            properties.inbound_nat_rules = Some(rules);
        }
    }

    fn cascade(&mut self, id: &ResourceId) {
        self.inbound_nat_rules.retain(|key, _| !is_child_of(key, id));
    }
}

impl MemoryCollection<InboundNatRuleProperties> for MemoryState {
    const KIND: ResourceKind = ResourceKind::InboundNatRule;
    const PARENT: Option<ResourceKind> = Some(ResourceKind::LoadBalancer);

    fn store(&self) -> &Store<InboundNatRuleProperties> {
        &self.inbound_nat_rules
    }

    fn store_mut(&mut self) -> &mut Store<InboundNatRuleProperties> {
        &mut self.inbound_nat_rules
    }

    fn parent_exists(&self, id: &ResourceId) -> bool {
        parent_id(id).is_some_and(|parent| self.load_balancers.contains_key(&parent))
    }
}

fn parent_id(id: &ResourceId) -> Option<ResourceId> {
    id.parent
        .as_ref()
        .map(|parent| ResourceId::new(id.resource_group.as_str(), parent.as_str()))
}

fn is_child_of(key: &ResourceId, parent: &ResourceId) -> bool {
    key.resource_group == parent.resource_group && key.parent.as_ref() == Some(&parent.name)
}

fn provider_id<P>(subscription_id: &str, id: &ResourceId) -> String
where
    P: Properties,
    MemoryState: MemoryCollection<P>,
{
    let kind = <MemoryState as MemoryCollection<P>>::KIND;

    match (&id.parent, <MemoryState as MemoryCollection<P>>::PARENT) {
        (Some(parent), Some(parent_kind)) => child_id(
            &resource_path(subscription_id, &id.resource_group, parent_kind, parent),
            kind.collection(),
            &id.name,
        ),
        _ => resource_path(subscription_id, &id.resource_group, kind, &id.name),
    }
}

fn read<P>(state: &MemoryState, id: &ResourceId) -> Option<Remote<P>>
where
    P: Properties,
    MemoryState: MemoryCollection<P>,
{
    let mut resource = <MemoryState as MemoryCollection<P>>::store(state)
        .get(id)
        .cloned()?;

    <MemoryState as MemoryCollection<P>>::decorate(state, id, &mut resource);

    Some(resource)
}

fn write<P>(state: &mut MemoryState, subscription_id: &str, id: &ResourceId, properties: P) -> Remote<P>
where
    P: Properties,
    MemoryState: MemoryCollection<P>,
{
    let mut resource = Remote {
        id: provider_id::<P>(subscription_id, id),
        name: id.name.to_owned(),
        properties: Some(<MemoryState as MemoryCollection<P>>::prepare(properties)),
    };

    <MemoryState as MemoryCollection<P>>::store_mut(state).insert(id.clone(), resource.clone());

    <MemoryState as MemoryCollection<P>>::decorate(state, id, &mut resource);

    resource
}

pub struct MemoryClient<P> {
    subscription_id: Arc<str>,
    state: Arc<RwLock<MemoryState>>,
    _properties: PhantomData<fn() -> P>,
}

impl<P> MemoryClient<P> {
    fn new(subscription_id: Arc<str>, state: Arc<RwLock<MemoryState>>) -> Self {
        Self {
            subscription_id,
            state,
            _properties: PhantomData,
        }
    }
}

#[async_trait]
impl<P> ResourceClient<P> for MemoryClient<P>
where
    P: Properties,
    MemoryState: MemoryCollection<P>,
{
    async fn get(&self, id: &ResourceId) -> Result<Remote<P>, ClientError> {
        let kind = <MemoryState as MemoryCollection<P>>::KIND;
        let mut state = self.state.write().await;

        if let Some(error) = state.take_fault(Operation::Get, kind, &id.name) {
            return Err(error);
        }

        read(&state, id).ok_or_else(|| ClientError::not_found(kind, id.name.as_str()))
    }

    async fn create_or_update(
        &self,
        id: &ResourceId,
        properties: P,
    ) -> Result<Remote<P>, ClientError> {
        let kind = <MemoryState as MemoryCollection<P>>::KIND;
        let mut state = self.state.write().await;

        if let Some(error) = state.take_fault(Operation::CreateOrUpdate, kind, &id.name) {
            return Err(error);
        }

        if !<MemoryState as MemoryCollection<P>>::parent_exists(&state, id) {
            let parent_kind = <MemoryState as MemoryCollection<P>>::PARENT.unwrap_or(kind);

            return Err(ClientError::not_found(
                parent_kind,
                id.parent.clone().unwrap_or_default(),
            ));
        }

        let resource = write(&mut state, &self.subscription_id, id, properties);
        state.record(Operation::CreateOrUpdate, kind, id);

        Ok(resource)
    }

    async fn delete(&self, id: &ResourceId) -> Result<(), ClientError> {
        let kind = <MemoryState as MemoryCollection<P>>::KIND;
        let mut state = self.state.write().await;

        if let Some(error) = state.take_fault(Operation::Delete, kind, &id.name) {
            return Err(error);
        }

        <MemoryState as MemoryCollection<P>>::store_mut(&mut state)
            .remove(id)
            .ok_or_else(|| ClientError::not_found(kind, id.name.as_str()))?;
        <MemoryState as MemoryCollection<P>>::cascade(&mut state, id);
        state.record(Operation::Delete, kind, id);

        Ok(())
    }
}

struct MemoryZones {
    state: Arc<RwLock<MemoryState>>,
    zones: BTreeMap<String, Vec<String>>,
}

#[async_trait]
impl AvailabilityZones for MemoryZones {
    async fn list_zones(&self, location: &str) -> Result<Vec<String>, ClientError> {
        let mut state = self.state.write().await;

        if let Some(error) =
            state.take_fault(Operation::Get, ResourceKind::AvailabilityZones, location)
        {
            return Err(error);
        }

        Ok(self.zones.get(location).cloned().unwrap_or_default())
    }
}

struct MemorySkus {
    state: Arc<RwLock<MemoryState>>,
    catalog: SkuCatalog,
}

#[async_trait]
impl SkuCapabilities for MemorySkus {
    async fn has_accelerated_networking(&self, vm_size: &str) -> Result<bool, ClientError> {
        {
            let mut state = self.state.write().await;

            if let Some(error) = state.take_fault(Operation::Get, ResourceKind::VmSku, vm_size) {
                return Err(error);
            }
        }

        self.catalog.has_accelerated_networking(vm_size).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stored<P> {
    pub id: ResourceId,
    pub resource: Remote<P>,
}

/// Serializable copy of every stored resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProviderSnapshot {
    pub resource_groups: Vec<Stored<GroupProperties>>,
    pub virtual_networks: Vec<Stored<VirtualNetworkProperties>>,
    pub security_groups: Vec<Stored<SecurityGroupProperties>>,
    pub route_tables: Vec<Stored<RouteTableProperties>>,
    pub subnets: Vec<Stored<SubnetProperties>>,
    pub load_balancers: Vec<Stored<LoadBalancerProperties>>,
    pub public_ips: Vec<Stored<PublicIpProperties>>,
    pub network_interfaces: Vec<Stored<NetworkInterfaceProperties>>,
    pub inbound_nat_rules: Vec<Stored<InboundNatRuleProperties>>,
}

fn to_stored<P: Clone>(store: &Store<P>) -> Vec<Stored<P>> {
    store
        .iter()
        .map(|(id, resource)| Stored {
            id: id.clone(),
            resource: resource.clone(),
        })
        .collect()
}

fn from_stored<P>(stored: Vec<Stored<P>>) -> Store<P> {
    stored
        .into_iter()
        .map(|stored| (stored.id, stored.resource))
        .collect()
}

#[derive(Clone)]
pub struct MemoryProvider {
    subscription_id: Arc<str>,
    state: Arc<RwLock<MemoryState>>,
    zones: BTreeMap<String, Vec<String>>,
    skus: SkuCatalog,
}

impl MemoryProvider {
    pub fn new(subscription_id: &str) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            state: Default::default(),
            zones: BTreeMap::new(),
            skus: SkuCatalog::default(),
        }
    }

    pub fn with_zones<I, Z>(mut self, location: &str, zones: I) -> Self
    where
        I: IntoIterator<Item = Z>,
        Z: Into<String>,
    {
        self.zones
            .insert(location.to_owned(), zones.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_skus(mut self, skus: SkuCatalog) -> Self {
        self.skus = skus;
        self
    }

    fn client<P>(&self) -> Arc<dyn ResourceClient<P>>
    where
        P: Properties,
        MemoryState: MemoryCollection<P>,
    {
        Arc::new(MemoryClient::new(
            self.subscription_id.clone(),
            self.state.clone(),
        ))
    }

    pub fn clients(&self) -> NetworkClients {
        NetworkClients {
            groups: self.client(),
            virtual_networks: self.client(),
            security_groups: self.client(),
            route_tables: self.client(),
            subnets: self.client(),
            load_balancers: self.client(),
            public_ips: self.client(),
            network_interfaces: self.client(),
            inbound_nat_rules: self.client(),
            zones: Arc::new(MemoryZones {
                state: self.state.clone(),
                zones: self.zones.clone(),
            }),
            skus: Arc::new(MemorySkus {
                state: self.state.clone(),
                catalog: self.skus.clone(),
            }),
        }
    }

    /// Stores a resource directly, bypassing faults and the journal.
    pub async fn insert<P>(&self, id: ResourceId, properties: P) -> Remote<P>
    where
        P: Properties,
        MemoryState: MemoryCollection<P>,
    {
        let mut state = self.state.write().await;

        write(&mut state, &self.subscription_id, &id, properties)
    }

    /// Reads a resource directly, bypassing faults.
    pub async fn lookup<P>(&self, id: &ResourceId) -> Option<Remote<P>>
    where
        P: Properties,
        MemoryState: MemoryCollection<P>,
    {
        read(&*self.state.read().await, id)
    }

    /// Makes `operation` on the named resource fail with `error`, `times`
    /// times or forever when `None`.
    pub async fn inject_fault(
        &self,
        operation: Operation,
        kind: ResourceKind,
        name: &str,
        error: ClientError,
        times: Option<usize>,
    ) {
        self.state.write().await.faults.push(Fault {
            operation,
            collection: kind.collection(),
            name: name.to_owned(),
            error,
            remaining: times,
        });
    }

    pub async fn clear_faults(&self) {
        self.state.write().await.faults.clear();
    }

    pub async fn journal(&self) -> Vec<Mutation> {
        self.state.read().await.journal.clone()
    }

    pub async fn take_journal(&self) -> Vec<Mutation> {
        std::mem::take(&mut self.state.write().await.journal)
    }

    pub async fn resource_count(&self) -> usize {
        self.state.read().await.resource_count()
    }

    pub async fn snapshot(&self) -> ProviderSnapshot {
        let state = self.state.read().await;

        ProviderSnapshot {
            resource_groups: to_stored(&state.groups),
            virtual_networks: to_stored(&state.virtual_networks),
            security_groups: to_stored(&state.security_groups),
            route_tables: to_stored(&state.route_tables),
            subnets: to_stored(&state.subnets),
            load_balancers: to_stored(&state.load_balancers),
            public_ips: to_stored(&state.public_ips),
            network_interfaces: to_stored(&state.network_interfaces),
            inbound_nat_rules: to_stored(&state.inbound_nat_rules),
        }
    }

    pub async fn restore(&self, snapshot: ProviderSnapshot) {
        let mut state = self.state.write().await;

        state.groups = from_stored(snapshot.resource_groups);
        state.virtual_networks = from_stored(snapshot.virtual_networks);
        state.security_groups = from_stored(snapshot.security_groups);
        state.route_tables = from_stored(snapshot.route_tables);
        state.subnets = from_stored(snapshot.subnets);
        state.load_balancers = from_stored(snapshot.load_balancers);
        state.public_ips = from_stored(snapshot.public_ips);
        state.network_interfaces = from_stored(snapshot.network_interfaces);
        state.inbound_nat_rules = from_stored(snapshot.inbound_nat_rules);
    }
}
