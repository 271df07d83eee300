//! Infrastructure-level errors surfaced by the Dispatcher and Scheduler,
//! distinct from `riven_core::PipelineError` (which classifies a handler's
//! own outcome, not the orchestration around it).

use thiserror::Error;

/// Result alias for dispatcher/scheduler operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Failures that abort a single dispatch cycle rather than a handler outcome.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The Store failed to commit the transition transaction.
    #[error("store error: {0}")]
    Store(#[from] riven_store::StoreError),

    /// A service call failed in a way a handler should have classified but
    /// didn't (programmer error at the call site).
    #[error("unclassified service error: {0}")]
    Service(#[from] riven_services::ServiceError),
}
