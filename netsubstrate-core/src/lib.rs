pub mod call;
pub mod capability;
pub mod cluster;
pub mod error;
pub mod helpers;
pub mod naming;
pub mod provider;
pub mod reconciler;
pub mod resources;
pub mod scope;
