//! Error types for configuration loading and validation.

use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The underlying `config` crate failed to build or deserialize the tree.
    #[error("failed to load configuration")]
    Load {
        /// Source error from the layered loader.
        #[source]
        source: config::ConfigError,
    },
    /// A field failed a validation rule after loading.
    #[error("invalid configuration field '{field}' in '{section}': {reason}")]
    InvalidField {
        /// Section that failed validation.
        section: String,
        /// Field that failed validation.
        field: String,
        /// Human-readable reason for the failure.
        reason: String,
    },
    /// The settings file path was provided but unreadable.
    #[error("settings file '{path}' could not be read")]
    Io {
        /// Path that was attempted.
        path: String,
        /// Source IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;
