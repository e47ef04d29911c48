//! Deterministic resource and DNS names.
//!
//! Everything here is a pure function of the cluster identity, so re-running
//! a reconciliation re-derives the same names without any name registry.

use crate::resources::ResourceKind;

pub const PUBLIC_IP_PREFIX: &str = "pip";
pub const API_SERVER_PURPOSE: &str = "apiserver";
pub const EGRESS_PURPOSE: &str = "cluster";
pub const DNS_ZONE: &str = "cloudapp.azure.com";
pub const PROVIDER_NAMESPACE: &str = "Microsoft.Network";

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a.
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Lowercase hex hash of `{subscription}/{resource group}/{cluster}`.
pub fn cluster_hash(subscription_id: &str, resource_group: &str, cluster_name: &str) -> String {
    let identity = format!("{subscription_id}/{resource_group}/{cluster_name}");

    format!("{:x}", fnv1a_32(identity.as_bytes()))
}

pub fn public_ip_name(purpose: &str, hash: &str) -> String {
    format!("{PUBLIC_IP_PREFIX}-{purpose}-{hash}")
}

pub fn api_server_ip_name(subscription_id: &str, resource_group: &str, cluster_name: &str) -> String {
    public_ip_name(
        API_SERVER_PURPOSE,
        &cluster_hash(subscription_id, resource_group, cluster_name),
    )
}

pub fn egress_ip_name(subscription_id: &str, resource_group: &str, cluster_name: &str) -> String {
    public_ip_name(
        EGRESS_PURPOSE,
        &cluster_hash(subscription_id, resource_group, cluster_name),
    )
}

pub fn fqdn(name: &str, location: &str) -> String {
    format!("{name}.{location}.{DNS_ZONE}")
}

pub fn internal_lb_name(cluster_name: &str) -> String {
    format!("{cluster_name}-internal-lb")
}

pub fn api_server_lb_name(cluster_name: &str) -> String {
    format!("{cluster_name}-public-lb")
}

pub fn egress_lb_name(cluster_name: &str) -> String {
    format!("{cluster_name}-outbound-lb")
}

pub fn backend_pool_name(lb_name: &str) -> String {
    format!("{lb_name}-backendPool")
}

pub fn frontend_ip_configuration_name(lb_name: &str) -> String {
    format!("{lb_name}-frontEnd")
}

pub fn child_id(parent_id: &str, collection: &str, name: &str) -> String {
    format!("{parent_id}/{collection}/{name}")
}

pub fn nat_rule_id(lb_id: &str, rule_name: &str) -> String {
    child_id(lb_id, ResourceKind::InboundNatRule.collection(), rule_name)
}

/// Provider id of a top-level resource.
pub fn resource_path(
    subscription_id: &str,
    resource_group: &str,
    kind: ResourceKind,
    name: &str,
) -> String {
    match kind {
        ResourceKind::ResourceGroup => {
            format!("/subscriptions/{subscription_id}/resourceGroups/{resource_group}")
        }
        kind => format!(
            "/subscriptions/{subscription_id}/resourceGroups/{resource_group}/providers/{PROVIDER_NAMESPACE}/{}/{name}",
            kind.collection()
        ),
    }
}
