use std::{fs::File, path::Path};

use log::debug;
use netsubstrate_core::{
    capability::SkuCatalog,
    cluster::{ClusterIdentity, ClusterNetworkSpec, MachineDescriptor},
    provider::memory::{MemoryProvider, ProviderSnapshot},
    scope::{AllocatedState, ClusterScope},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Io error: {}", .0)]
    IoError(std::io::Error),
    #[error("Serialization error: {}", .0)]
    SerializationError(serde_yaml::Error),
    #[error("Deserialization error: {}", .0)]
    DeserializationError(serde_yaml::Error),
}

/// Cluster description read by every command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    #[serde(flatten)]
    pub identity: ClusterIdentity,
    pub network: ClusterNetworkSpec,
    #[serde(default)]
    pub machines: Vec<MachineDescriptor>,
    /// availability zones the provider reports for the cluster location
    #[serde(default)]
    pub zones: Vec<String>,
    #[serde(default)]
    pub skus: SkuCatalog,
}

impl ClusterConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!("Used cluster config path: {path:?}");

        let file = File::open(path).map_err(ConfigError::IoError)?;

        serde_yaml::from_reader(file).map_err(ConfigError::DeserializationError)
    }

    pub fn provider(&self) -> MemoryProvider {
        MemoryProvider::new(&self.identity.subscription_id)
            .with_zones(&self.identity.location, self.zones.iter().cloned())
            .with_skus(self.skus.clone())
    }

    pub fn scope(&self, allocated: AllocatedState) -> ClusterScope {
        ClusterScope::new(self.identity.clone(), self.network.clone(), allocated)
    }
}

/// What survives between invocations: the names derived while reconciling
/// and the provider contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StateFile {
    pub allocated: AllocatedState,
    pub provider: ProviderSnapshot,
}

impl StateFile {
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("State file {path:?} doesn't exist yet, starting from scratch");
            return Ok(Self::default());
        }

        debug!("Used state path: {path:?}");

        let file = File::open(path).map_err(ConfigError::IoError)?;

        serde_yaml::from_reader(file).map_err(ConfigError::DeserializationError)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let file = File::options()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(ConfigError::IoError)?;

        serde_yaml::to_writer(file, self).map_err(ConfigError::SerializationError)
    }
}

#[cfg(test)]
mod tests {
    use netsubstrate_core::{cluster::Role, scope::AllocatedState};

    use super::{ClusterConfig, StateFile};

    const DEMO_CLUSTER: &str = include_str!("../../demos/demo-cluster.yaml");

    #[test]
    fn demo_cluster_parses() {
        let config: ClusterConfig = serde_yaml::from_str(DEMO_CLUSTER).unwrap();

        assert_eq!(config.identity.cluster_name, "demo");
        assert_eq!(config.identity.resource_group, "demo-rg");
        assert_eq!(config.network.control_plane_subnet.role, Role::ControlPlane);
        assert_eq!(config.machines.len(), 2);
        assert_eq!(config.zones, ["1", "2", "3"]);
        assert!(!config.skus.is_empty());
    }

    #[test]
    fn scope_carries_the_identity() {
        let config: ClusterConfig = serde_yaml::from_str(DEMO_CLUSTER).unwrap();
        let scope = config.scope(AllocatedState::default());

        assert_eq!(scope.cluster_name(), "demo");
        assert_eq!(scope.vnet_resource_group(), "demo-rg");
    }

    #[test]
    fn missing_state_file_is_empty() {
        let path = std::env::temp_dir().join("netsubstrate-missing-state-file.yaml");
        let _ = std::fs::remove_file(&path);

        assert_eq!(StateFile::load_or_default(&path).unwrap(), StateFile::default());
    }

    #[test]
    fn state_file_survives_a_save() {
        let path = std::env::temp_dir().join(format!(
            "netsubstrate-state-{}.yaml",
            std::process::id()
        ));
        let mut state = StateFile::default();
        state.allocated.api_server_ip_name = Some("pip-demo-apiserver".to_owned());

        state.save(&path).unwrap();
        let loaded = StateFile::load_or_default(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded, state);
    }
}
