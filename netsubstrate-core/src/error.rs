use std::{borrow::Cow, fmt::Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resources::ResourceKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Reconcile,
    Delete,
    Get,
    CreateOrUpdate,
}

impl Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Operation::Reconcile => "reconcile",
            Operation::Delete => "delete",
            Operation::Get => "get",
            Operation::CreateOrUpdate => "create or update",
        })
    }
}

/// Errors reported by the provider collaborators.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("{} '{}' was not found!", .kind, .name)]
    NotFound { kind: ResourceKind, name: String },
    #[error("Request was throttled by the provider!")]
    Throttled,
    #[error("Request timed out!")]
    Timeout,
    #[error("Provider returned an error ({}): {}", .code, .message)]
    Api { code: u16, message: String },
    #[error("Request was cancelled!")]
    Cancelled,
}

impl ClientError {
    pub fn not_found(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Throttled | Self::Timeout => true,
            Self::Api { code, .. } => *code == 429 || *code >= 500,
            Self::NotFound { .. } | Self::Cancelled => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("{}", .0)]
    Client(ClientError),
    #[error("Invalid configuration! {}", .0)]
    Configuration(Cow<'static, str>),
    #[error("No free SSH frontend port left on load balancer '{}' for NAT rule '{}'!", .load_balancer, .rule)]
    PortRangeExhausted { load_balancer: String, rule: String },
    #[error("Couldn't {} {} '{}'! Reason: {}", .operation, .kind, .name, .source)]
    Step {
        operation: Operation,
        kind: ResourceKind,
        name: String,
        #[source]
        source: Box<ReconcilerError>,
    },
}

impl ReconcilerError {
    pub fn configuration(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn annotate(self, operation: Operation, kind: ResourceKind, name: impl Into<String>) -> Self {
        Self::Step {
            operation,
            kind,
            name: name.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, with every step annotation peeled off.
    pub fn root(&self) -> &ReconcilerError {
        match self {
            Self::Step { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn client_error(&self) -> Option<&ClientError> {
        match self.root() {
            Self::Client(error) => Some(error),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.client_error().is_some_and(ClientError::is_not_found)
    }

    pub fn is_retryable(&self) -> bool {
        self.client_error().is_some_and(ClientError::is_retryable)
    }
}

impl From<ClientError> for ReconcilerError {
    fn from(value: ClientError) -> Self {
        Self::Client(value)
    }
}

pub trait Annotate<T> {
    fn annotate(
        self,
        operation: Operation,
        kind: ResourceKind,
        name: &str,
    ) -> Result<T, ReconcilerError>;
}

impl<T, E: Into<ReconcilerError>> Annotate<T> for Result<T, E> {
    fn annotate(
        self,
        operation: Operation,
        kind: ResourceKind,
        name: &str,
    ) -> Result<T, ReconcilerError> {
        self.map_err(|error| error.into().annotate(operation, kind, name))
    }
}
