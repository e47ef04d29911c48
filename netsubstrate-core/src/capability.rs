use std::collections::BTreeMap;

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    call::CallContext,
    error::{Annotate, ClientError, Operation, ReconcilerError},
    provider::SkuCapabilities,
    resources::ResourceKind,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkuInfo {
    #[serde(default)]
    pub accelerated_networking: bool,
}

/// Static table of VM sizes and what they support.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkuCatalog {
    skus: BTreeMap<String, SkuInfo>,
}

impl SkuCatalog {
    pub fn with_sku(mut self, vm_size: &str, info: SkuInfo) -> Self {
        self.skus.insert(vm_size.to_owned(), info);
        self
    }

    pub fn get(&self, vm_size: &str) -> Option<&SkuInfo> {
        self.skus.get(vm_size)
    }

    pub fn is_empty(&self) -> bool {
        self.skus.is_empty()
    }
}

#[async_trait]
impl SkuCapabilities for SkuCatalog {
    async fn has_accelerated_networking(&self, vm_size: &str) -> Result<bool, ClientError> {
        self.get(vm_size)
            .map(|info| info.accelerated_networking)
            .ok_or_else(|| ClientError::not_found(ResourceKind::VmSku, vm_size))
    }
}

/// Returns the requested flag as is, falling back to the SKU lookup only
/// when the caller left it unset. Lookup failures propagate.
pub async fn resolve_accelerated_networking(
    requested: Option<bool>,
    vm_size: &str,
    skus: &dyn SkuCapabilities,
    call: &CallContext,
) -> Result<bool, ReconcilerError> {
    if let Some(requested) = requested {
        return Ok(requested);
    }

    let supported = call
        .run(skus.has_accelerated_networking(vm_size))
        .await
        .annotate(Operation::Get, ResourceKind::VmSku, vm_size)?;

    debug!("Accelerated networking defaults to {supported} for '{vm_size}'");

    Ok(supported)
}

#[cfg(test)]
mod tests {
    use crate::{call::CallContext, error::ClientError, resources::ResourceKind};

    use super::{resolve_accelerated_networking, SkuCatalog, SkuInfo};

    fn catalog() -> SkuCatalog {
        SkuCatalog::default()
            .with_sku(
                "Standard_D2s_v3",
                SkuInfo {
                    accelerated_networking: true,
                },
            )
            .with_sku("Standard_B2s", SkuInfo::default())
    }

    #[tokio::test]
    async fn explicit_preference_skips_the_lookup() {
        let resolved =
            resolve_accelerated_networking(Some(true), "Unknown_Size", &catalog(), &CallContext::default())
                .await
                .unwrap();

        assert!(resolved);
    }

    #[tokio::test]
    async fn unset_preference_uses_the_sku() {
        let context = CallContext::default();

        assert!(resolve_accelerated_networking(None, "Standard_D2s_v3", &catalog(), &context)
            .await
            .unwrap());
        assert!(!resolve_accelerated_networking(None, "Standard_B2s", &catalog(), &context)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn unknown_sku_is_an_error_not_a_default() {
        let error =
            resolve_accelerated_networking(None, "Unknown_Size", &catalog(), &CallContext::default())
                .await
                .unwrap_err();

        assert_eq!(
            error.client_error(),
            Some(&ClientError::not_found(ResourceKind::VmSku, "Unknown_Size"))
        );
    }

    #[test]
    fn catalog_deserializes_from_a_map() {
        let parsed: SkuCatalog = serde_json::from_value(serde_json::json!({
            "Standard_D2s_v3": { "acceleratedNetworking": true },
            "Standard_B2s": {}
        }))
        .unwrap();

        assert_eq!(parsed, catalog());
    }
}
