use std::path::Path;

use anyhow::Context;
use log::info;
use netsubstrate_core::{
    cluster::NetworkInterfaceSpec,
    error::Operation,
    provider::memory::{MemoryProvider, Mutation},
    resources::ResourceKind,
    scope::{AllocatedState, ClusterScope},
};
use netsubstrate_macros::TableRow;
use serde::Serialize;

use crate::{
    cli::OutputFormat,
    config::{ClusterConfig, StateFile},
    output::CliPrint,
};

pub mod delete;
pub mod names;
pub mod reconcile;

/// Config, restored provider and previously allocated names of one run.
pub struct Session {
    pub config: ClusterConfig,
    pub provider: MemoryProvider,
    pub allocated: AllocatedState,
}

impl Session {
    pub async fn open(config_path: &Path, state_path: Option<&Path>) -> anyhow::Result<Self> {
        let config = ClusterConfig::load(config_path)
            .context("Couldn't load the cluster configuration!")?;
        let state = match state_path {
            Some(path) => StateFile::load_or_default(path).context("Couldn't load the state file!")?,
            None => StateFile::default(),
        };

        let provider = config.provider();
        provider.restore(state.provider).await;

        Ok(Self {
            config,
            provider,
            allocated: state.allocated,
        })
    }

    pub fn interfaces(&self, scope: &ClusterScope) -> anyhow::Result<Vec<NetworkInterfaceSpec>> {
        self.config
            .machines
            .iter()
            .map(|machine| {
                scope
                    .nic_spec_for(machine)
                    .with_context(|| format!("Couldn't resolve the interface of '{}'!", machine.name))
            })
            .collect()
    }

    /// Writes the state file, prints the recorded mutations and only then
    /// surfaces `result`, so a failed run still leaves its progress behind.
    pub async fn finish(
        self,
        allocated: AllocatedState,
        state_path: Option<&Path>,
        output: OutputFormat,
        result: anyhow::Result<()>,
    ) -> anyhow::Result<()> {
        let mutations = self.provider.take_journal().await;

        if let Some(path) = state_path {
            let state = StateFile {
                allocated,
                provider: self.provider.snapshot().await,
            };

            state.save(path).context("Couldn't save the state file!")?;
            info!("State saved to {path:?}");
        }

        if mutations.is_empty() {
            info!("No changes were necessary");
        } else {
            mutations
                .iter()
                .map(MutationView::from)
                .collect::<Vec<_>>()
                .print(output)?;
        }

        result
    }
}

#[derive(Serialize, TableRow)]
#[serde(rename_all = "camelCase")]
pub struct MutationView<'a> {
    operation: Operation,
    kind: ResourceKind,
    resource_group: &'a str,
    #[name_column]
    name: &'a str,
}

impl<'a> From<&'a Mutation> for MutationView<'a> {
    fn from(value: &'a Mutation) -> Self {
        Self {
            operation: value.operation,
            kind: value.kind,
            resource_group: &value.resource_group,
            name: &value.name,
        }
    }
}
