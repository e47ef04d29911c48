use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    cluster::{Role, SubnetDescriptor},
    error::ReconcilerError,
    helpers::AndIf,
    provider::{NetworkClients, ResourceClient},
    resources::{
        network::{SecurityGroupProperties, SecurityRule},
        ResourceId, ResourceKind, TransportProtocol,
    },
    scope::ClusterScope,
};

use super::{apply, remove, ResourceReconciler};

pub const SSH_PORT: u16 = 22;
pub const API_SERVER_PORT: u16 = 6443;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityGroupSpec {
    pub resource_group: String,
    pub name: String,
    pub location: String,
    pub rules: Vec<SecurityRule>,
}

impl SecurityGroupSpec {
    /// Control-plane groups admit SSH and the API server, node groups admit nothing.
    pub fn for_subnet(scope: &ClusterScope, subnet: &SubnetDescriptor) -> Self {
        let rules = Vec::<SecurityRule>::with_capacity(2).and_if(
            subnet.role == Role::ControlPlane,
            |mut rules: Vec<SecurityRule>| {
                rules.push(SecurityRule {
                    name: "allow_ssh".to_owned(),
                    description: "Allow SSH".to_owned(),
                    protocol: TransportProtocol::Tcp,
                    destination_port: SSH_PORT,
                    priority: 100,
                });
                rules.push(SecurityRule {
                    name: "allow_apiserver".to_owned(),
                    description: "Allow K8s API Server".to_owned(),
                    protocol: TransportProtocol::Tcp,
                    destination_port: API_SERVER_PORT,
                    priority: 101,
                });
                rules
            },
        );

        Self {
            resource_group: scope.resource_group().to_owned(),
            name: subnet.security_group.to_owned(),
            location: scope.location().to_owned(),
            rules,
        }
    }

    pub fn id(&self) -> ResourceId {
        ResourceId::new(self.resource_group.as_str(), self.name.as_str())
    }
}

pub struct SecurityGroupReconciler {
    client: Arc<dyn ResourceClient<SecurityGroupProperties>>,
}

impl SecurityGroupReconciler {
    pub fn new(clients: &NetworkClients) -> Self {
        Self {
            client: clients.security_groups.clone(),
        }
    }
}

#[async_trait]
impl ResourceReconciler for SecurityGroupReconciler {
    type Spec = SecurityGroupSpec;

    async fn reconcile(
        &self,
        scope: &ClusterScope,
        spec: &SecurityGroupSpec,
    ) -> Result<(), ReconcilerError> {
        let properties = SecurityGroupProperties {
            location: spec.location.to_owned(),
            security_rules: spec.rules.clone(),
        };

        apply(scope, &*self.client, ResourceKind::SecurityGroup, &spec.id(), properties).await?;

        Ok(())
    }

    async fn delete(
        &self,
        scope: &ClusterScope,
        spec: &SecurityGroupSpec,
    ) -> Result<(), ReconcilerError> {
        remove(scope, &*self.client, ResourceKind::SecurityGroup, &spec.id()).await
    }
}

#[cfg(test)]
mod tests {
    use crate::scope::tests::demo_scope;

    use super::SecurityGroupSpec;

    #[test]
    fn only_the_control_plane_group_opens_ports() {
        let scope = demo_scope(false);
        let control_plane = SecurityGroupSpec::for_subnet(&scope, scope.control_plane_subnet());
        let node = SecurityGroupSpec::for_subnet(&scope, scope.node_subnet());

        let ports: Vec<_> = control_plane
            .rules
            .iter()
            .map(|rule| rule.destination_port)
            .collect();

        assert_eq!(control_plane.name, "demo-controlplane-nsg");
        assert_eq!(ports, vec![22, 6443]);
        assert!(node.rules.is_empty());
    }
}
