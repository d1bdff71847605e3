//! Error types for device database operations.
//!
//! Wraps the document-level [`ConfigError`] together with the storage and
//! serialization failures that can occur while resolving documents or
//! reading and writing index files.

use device_config_core::{ConfigError, ConfigErrorKind};
use thiserror::Error;

/// Errors that can occur during database operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// A document is missing, malformed, cyclic, or was used before loading.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization failure.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// JSON5 parsing failure while reading a document or an index.
    #[error("JSON5 error: {0}")]
    Json5Error(#[from] json5::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

impl DatabaseError {
    /// Returns the document error kind, if this is a [`ConfigError`].
    pub fn kind(&self) -> Option<ConfigErrorKind> {
        match self {
            DatabaseError::Config(err) => Some(err.kind()),
            _ => None,
        }
    }
}

/// Convenience alias for results with [`DatabaseError`].
pub type Result<T> = std::result::Result<T, DatabaseError>;
