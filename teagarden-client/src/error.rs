//! Error types for the client.

use crate::config::ConfigError;
use crate::gateway::{GatewayError, GatewayErrorKind};
use crate::persistence::PersistenceError;
use serde::Serialize;
use std::fmt;
use teagarden_core::{EntityKind, ValidationError};

/// User-facing error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    Validation,
    Network,
    NotFound,
    Unauthorized,
    /// 5xx, malformed payloads and conflicts.
    ServerError,
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Network => "network",
            ErrorKind::NotFound => "not found",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::ServerError => "server error",
            ErrorKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

impl From<GatewayErrorKind> for ErrorKind {
    fn from(kind: GatewayErrorKind) -> Self {
        match kind {
            GatewayErrorKind::Network => ErrorKind::Network,
            GatewayErrorKind::NotFound => ErrorKind::NotFound,
            GatewayErrorKind::Validation => ErrorKind::Validation,
            GatewayErrorKind::Unauthorized => ErrorKind::Unauthorized,
            GatewayErrorKind::Conflict | GatewayErrorKind::Server => ErrorKind::ServerError,
            GatewayErrorKind::Unknown => ErrorKind::Unknown,
        }
    }
}

/// Outcome of a store operation that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Rejected locally before any mutation or network call.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error(transparent)]
    Remote(#[from] GatewayError),
}

impl StoreError {
    pub fn not_found(kind: EntityKind, id: impl fmt::Display) -> Self {
        StoreError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Validation(_) => ErrorKind::Validation,
            StoreError::NotFound { .. } => ErrorKind::NotFound,
            StoreError::Remote(err) => err.kind.into(),
        }
    }

    /// Text suitable for a banner or notification.
    pub fn message(&self) -> String {
        match self {
            StoreError::Remote(err) => err.message.clone(),
            other => other.to_string(),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.kind() == ErrorKind::Unauthorized
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised while wiring the client together.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("Telemetry error: {0}")]
    Telemetry(String),
}
