use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    error::ReconcilerError,
    provider::{NetworkClients, ResourceClient},
    resources::{
        network::{IpVersion, PublicIpProperties},
        ResourceId, ResourceKind,
    },
    scope::ClusterScope,
};

use super::{apply, remove, ResourceReconciler};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicIpSpec {
    pub resource_group: String,
    pub name: String,
    pub location: String,
    pub version: IpVersion,
    pub dns_name: Option<String>,
}

impl PublicIpSpec {
    pub fn api_server(scope: &ClusterScope, name: &str) -> Self {
        Self {
            resource_group: scope.resource_group().to_owned(),
            name: name.to_owned(),
            location: scope.location().to_owned(),
            version: IpVersion::Ipv4,
            dns_name: scope.api_server_dns_name().map(str::to_owned),
        }
    }

    pub fn egress(scope: &ClusterScope) -> Self {
        Self {
            resource_group: scope.resource_group().to_owned(),
            name: scope.egress_ip_name(),
            location: scope.location().to_owned(),
            version: IpVersion::Ipv4,
            dns_name: None,
        }
    }

    pub fn id(&self) -> ResourceId {
        ResourceId::new(self.resource_group.as_str(), self.name.as_str())
    }
}

pub struct PublicIpReconciler {
    client: Arc<dyn ResourceClient<PublicIpProperties>>,
}

impl PublicIpReconciler {
    pub fn new(clients: &NetworkClients) -> Self {
        Self {
            client: clients.public_ips.clone(),
        }
    }
}

#[async_trait]
impl ResourceReconciler for PublicIpReconciler {
    type Spec = PublicIpSpec;

    async fn reconcile(&self, scope: &ClusterScope, spec: &PublicIpSpec) -> Result<(), ReconcilerError> {
        let properties = PublicIpProperties {
            location: spec.location.to_owned(),
            version: spec.version,
            dns_name: spec.dns_name.clone(),
        };

        apply(scope, &*self.client, ResourceKind::PublicIp, &spec.id(), properties).await?;

        Ok(())
    }

    async fn delete(&self, scope: &ClusterScope, spec: &PublicIpSpec) -> Result<(), ReconcilerError> {
        remove(scope, &*self.client, ResourceKind::PublicIp, &spec.id()).await
    }
}
