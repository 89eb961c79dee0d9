//! Error types for the schema registry

use thiserror::Error;

use crate::schema::StoreId;

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Schema registry errors
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Schema store unavailable: {0}")]
    Store(String),

    #[error("Malformed contract in schema {store_id}: {reason}")]
    MalformedContract { store_id: StoreId, reason: String },

    #[error("Invalid schema payload: {0}")]
    InvalidPayload(String),

    #[error("Validator compilation failed: {0}")]
    ValidatorCompile(String),

    #[error("Schema not found: {name} version {version}")]
    NotFound { name: String, version: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
