//! Errors surfaced by the Store.

use thiserror::Error;

/// Result alias for Store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Every Store failure is one of: a retryable I/O error, or a constraint
/// violation the caller is expected to interpret (e.g. duplicate infohash on
/// the blacklist is treated as "already blacklisted").
#[derive(Debug, Error)]
pub enum StoreError {
    /// Any database I/O error; callers re-enqueue with backoff.
    #[error("store io error: {0}")]
    Io(#[from] sqlx::Error),

    /// A unique/foreign-key constraint was violated in a way the caller can
    /// recover from without treating it as a hard failure.
    #[error("store conflict: {0}")]
    Conflict(String),

    /// The requested item does not exist.
    #[error("item {0} not found")]
    ItemNotFound(i64),
}
