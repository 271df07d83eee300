//! Errors surfaced by service adapters themselves, distinct from the
//! pipeline-level taxonomy in `riven-core::error` (which a handler derives
//! from these at the call site).

use thiserror::Error;

/// Result alias for a capability call.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors a capability implementation can report back to its handler.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The capability exists but this operation is not implemented by the
    /// configured adapter.
    #[error("operation '{operation}' is not supported by this service")]
    Unsupported {
        /// Name of the unsupported operation.
        operation: &'static str,
    },

    /// Network/timeout/5xx from the backend.
    #[error("transient service error: {0}")]
    Transient(String),

    /// The backend rejected the request outright (bad credentials, disabled
    /// account, etc).
    #[error("service rejected request: {0}")]
    Rejected(String),

    /// The service is not configured (missing credentials) and should be
    /// marked unhealthy by the registry.
    #[error("service misconfigured: {0}")]
    Misconfigured(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_reports_operation_name() {
        let err = ServiceError::Unsupported {
            operation: "request_cache",
        };
        assert!(err.to_string().contains("request_cache"));
    }
}
