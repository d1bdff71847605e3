//! Error types shared by every stage of document resolution.
//!
//! Each variant carries a human-readable message. Messages produced while
//! parsing a document are qualified with the document's filename so that
//! maintenance tooling can print them as-is.

use std::fmt;

use thiserror::Error;

/// Errors raised while parsing, resolving, or evaluating device documents.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A referenced document or import target does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Structural or type violation in a document, a condition expression,
    /// or an import specifier.
    #[error("{0}")]
    Invalid(String),

    /// An import or selector cycle. The message lists the full import stack.
    #[error("{0}")]
    CircularImport(String),

    /// A lookup was attempted before the relevant data was loaded.
    #[error("{0}")]
    NotLoaded(String),
}

/// Machine-readable kind of a [`ConfigError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigErrorKind {
    NotFound,
    Invalid,
    CircularImport,
    NotLoaded,
}

impl fmt::Display for ConfigErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConfigErrorKind::NotFound => "not-found",
            ConfigErrorKind::Invalid => "invalid",
            ConfigErrorKind::CircularImport => "circular-import",
            ConfigErrorKind::NotLoaded => "not-loaded",
        };
        f.write_str(name)
    }
}

impl ConfigError {
    /// Builds an [`Invalid`](Self::Invalid) error qualified with `filename`.
    pub fn invalid(filename: &str, message: impl fmt::Display) -> Self {
        ConfigError::Invalid(format!("{filename}: {message}"))
    }

    /// Returns the machine-readable kind of this error.
    pub fn kind(&self) -> ConfigErrorKind {
        match self {
            ConfigError::NotFound(_) => ConfigErrorKind::NotFound,
            ConfigError::Invalid(_) => ConfigErrorKind::Invalid,
            ConfigError::CircularImport(_) => ConfigErrorKind::CircularImport,
            ConfigError::NotLoaded(_) => ConfigErrorKind::NotLoaded,
        }
    }

    /// Returns the message without the kind.
    pub fn message(&self) -> &str {
        match self {
            ConfigError::NotFound(m)
            | ConfigError::Invalid(m)
            | ConfigError::CircularImport(m)
            | ConfigError::NotLoaded(m) => m,
        }
    }
}

/// Convenience alias for results with [`ConfigError`].
pub type Result<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_is_filename_qualified() {
        let err = ConfigError::invalid("0x0086/zw100.json", "label must be a string");
        assert_eq!(err.kind(), ConfigErrorKind::Invalid);
        assert_eq!(err.to_string(), "0x0086/zw100.json: label must be a string");
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ConfigErrorKind::CircularImport.to_string(), "circular-import");
        assert_eq!(
            ConfigError::NotLoaded("index".into()).kind(),
            ConfigErrorKind::NotLoaded
        );
    }
}
