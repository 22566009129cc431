//! Error types for GUNGNIR operations

use std::fmt;
use thiserror::Error;

/// Provider operation in which a backend failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    Set,
    Clear,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Get => "get",
            Operation::Set => "set",
            Operation::Clear => "clear",
        };
        f.write_str(name)
    }
}

/// Failures raised by a storage engine behind a backend adapter.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Connection failed: {reason}")]
    Connection { reason: String },

    #[error("Invalid connection descriptor {descriptor}: {reason}")]
    InvalidDescriptor { descriptor: String, reason: String },

    #[error("Record already exists in {table}: {id}")]
    Conflict { table: String, id: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Invalid environment configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all GUNGNIR errors.
#[derive(Debug, Error)]
pub enum GungnirError {
    /// The backend connection for `descriptor` has not been established yet.
    #[error("Provider not ready: no connection established for {descriptor}")]
    NotReady { descriptor: String },

    #[error("Failed to connect to {descriptor}: {source}")]
    ConnectFailed {
        descriptor: String,
        #[source]
        source: BackendError,
    },

    #[error("Backend error during {operation} on {table}/{id}: {source}")]
    Backend {
        operation: Operation,
        table: String,
        id: String,
        #[source]
        source: BackendError,
    },

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl GungnirError {
    pub fn not_ready(descriptor: impl Into<String>) -> Self {
        GungnirError::NotReady {
            descriptor: descriptor.into(),
        }
    }

    pub fn connect_failed(descriptor: impl Into<String>, source: BackendError) -> Self {
        GungnirError::ConnectFailed {
            descriptor: descriptor.into(),
            source,
        }
    }

    /// Wrap a backend failure with the coordinate it happened at.
    pub fn backend(
        operation: Operation,
        table: impl Into<String>,
        id: impl Into<String>,
        source: BackendError,
    ) -> Self {
        GungnirError::Backend {
            operation,
            table: table.into(),
            id: id.into(),
            source,
        }
    }

    pub fn is_not_ready(&self) -> bool {
        matches!(self, GungnirError::NotReady { .. })
    }
}

/// Result type for GUNGNIR operations.
pub type GungnirResult<T> = Result<T, GungnirError>;

// =============================================================================
// TESTS
// =============================================================================
