//! Process-level errors surfaced during bootstrap, mapped to the exit codes
//! the CLI returns (0 clean, 1 fatal config, 2 DB unreachable, 3 uncaught
//! panic).

use thiserror::Error;

/// Result alias for bootstrap operations.
pub type AppResult<T> = Result<T, AppError>;

/// Failures that can abort startup or the run loop before a graceful
/// shutdown completes.
#[derive(Debug, Error)]
pub enum AppError {
    /// The settings file or `RIVEN_*` environment overrides did not produce
    /// a valid, loadable configuration tree.
    #[error("configuration error: {0}")]
    Config(#[from] riven_config::ConfigError),

    /// A loaded configuration failed startup validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(riven_config::ConfigError),

    /// The Postgres pool could not be established, or migrations failed to
    /// apply, after the configured connection retries.
    #[error("database unreachable: {0}")]
    Database(#[from] sqlx::Error),

    /// The Store's own initialisation (migrations) failed.
    #[error("store initialisation failed: {0}")]
    Store(#[from] riven_store::StoreError),

    /// Registering the Prometheus metrics collectors failed.
    #[error("telemetry initialisation failed: {0}")]
    Telemetry(#[from] riven_telemetry::TelemetryError),

    /// Installing the tracing subscriber failed.
    #[error("logging initialisation failed: {0}")]
    Logging(anyhow::Error),
}

impl AppError {
    /// Process exit code this error maps to.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::InvalidConfig(_) | Self::Telemetry(_) | Self::Logging(_) => 1,
            Self::Database(_) | Self::Store(_) => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_maps_to_exit_code_one() {
        let err = AppError::InvalidConfig(riven_config::ConfigError::InvalidField {
                section: "api".to_string(),
                field: "api_key".to_string(),
                reason: "must not be empty".to_string(),
        });
        assert_eq!(err.exit_code(), 1);
    }
}
