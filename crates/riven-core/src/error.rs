//! Closed error taxonomy for pipeline handlers.

use crate::model::BlacklistReason;
use thiserror::Error;

/// Result alias for pipeline handler outcomes.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Every handler outcome collapses to one of these variants. The Dispatcher,
/// not the handler, decides retry vs. fail from the variant alone.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Network error, timeout, 5xx, or rate-limit hit. Retried with backoff up
    /// to a bounded attempt count.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Logical mismatch between a stream and the item. Blacklists the
    /// offending stream and re-enqueues the scrape stage.
    #[error("content rejected: {reason:?}: {detail}")]
    ContentRejected {
        /// Uniform blacklist reason to record.
        reason: BlacklistReason,
        /// Human-readable detail for logs.
        detail: String,
    },

    /// Debrid reports the candidate uncached and unable to cache now.
    #[error("not available yet: {0}")]
    NotAvailableYet(String),

    /// Unrecoverable: sets state `Failed`, no further autonomous retries.
    #[error("permanent failure: {0}")]
    Permanent(String),

    /// Missing/invalid credentials for a service; marks it unhealthy.
    #[error("service misconfigured: {0}")]
    Config(String),

    /// Programmer error or invariant violation. The transaction aborts, the
    /// transition is NOT recorded, the event is retried once, and a
    /// high-priority alert is emitted.
    #[error("internal invariant violation: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Whether this error should ever be retried autonomously.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transient(_) | Self::NotAvailableYet(_) | Self::Internal(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_is_not_retryable() {
        assert!(!PipelineError::Permanent("no such id".into()).is_retryable());
    }

    #[test]
    fn transient_is_retryable() {
        assert!(PipelineError::Transient("timeout".into()).is_retryable());
    }
}
