//! Manual Session Manager (C10): a time-bounded override that suspends
//! autonomous scheduling for one item while a caller selects a stream and
//! files by hand, then resumes autonomous flow on commit or expiry.

use riven_core::{EventSource, Session, SessionState, State, Stream};
use riven_store::{StoreError, TransitionAttributes};
use thiserror::Error;
use uuid::Uuid;

use crate::context::Context;

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Underlying persistence failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// The session is not `Open` (already committed, cancelled, or expired).
    #[error("session {0} is not open")]
    NotOpen(Uuid),
    /// `commit` was called before a stream was selected.
    #[error("session {0} has no selected stream")]
    NoStreamSelected(Uuid),
    /// `commit` was called before any files were selected.
    #[error("session {0} has no selected files")]
    NoFilesSelected(Uuid),
    /// The session's TTL has elapsed.
    #[error("session {0} has expired")]
    Expired(Uuid),
}

/// Result alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Default time-to-live for a manual session before it auto-expires.
pub const DEFAULT_TTL_SECONDS: i64 = 15 * 60;

/// Opens, drives, and closes manual override sessions, bypassing the
/// Ranker's automatic selection on commit.
#[derive(Clone)]
pub struct SessionManager {
    ctx: Context,
    ttl_seconds: i64,
}

impl SessionManager {
    /// Build a manager over `ctx` using the default session TTL.
    #[must_use]
    pub fn new(ctx: Context) -> Self {
        Self {
            ctx,
            ttl_seconds: DEFAULT_TTL_SECONDS,
        }
    }

    /// Override the session TTL (tests only; production uses the default).
    #[must_use]
    pub fn with_ttl_seconds(mut self, ttl_seconds: i64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    /// Open a session for `item_id`. Cancels any pending autonomous event for
    /// the item.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Store` on a persistence failure.
    pub async fn open(&self, item_id: i64) -> SessionResult<Session> {
        let now = self.ctx.now();
        self.ctx.queue.cancel(item_id);
        let session = self.ctx.store.open_session(item_id, self.ttl_seconds, now).await?;
        Ok(session)
    }

    /// Trigger a one-off scrape for the session's item and return the top
    /// `top_k` ranked candidates, without touching the item's autonomous
    /// state.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotOpen`/`Expired` if the session cannot accept
    /// input, or `SessionError::Store` on a persistence failure.
    pub async fn list_scrape_results(&self, session_id: Uuid, top_k: usize) -> SessionResult<Vec<Stream>> {
        let session = self.live_session(session_id).await?;
        let (item, _) = self.ctx.store.load_item(session.item_id, 0).await?;

        // Best-effort: a session bypasses the Dispatcher's retry policy, so a
        // scrape failure here is surfaced to the caller rather than scheduled.
        if let Err(err) = crate::pipeline::run_scraper(&self.ctx, &item).await {
            tracing::debug!(item_id = item.id, error = %err, "session scrape attempt failed");
        }
        Ok(self.ctx.streams.top_k(item.id, top_k).await?)
    }

    /// Record the user's chosen stream for the session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotOpen`/`Expired`, or `SessionError::Store` on
    /// a persistence failure.
    pub async fn select_stream(&self, session_id: Uuid, stream_id: i64) -> SessionResult<()> {
        self.live_session(session_id).await?;
        self.ctx.store.set_session_stream(session_id, stream_id).await?;
        Ok(())
    }

    /// Record the user's chosen files within the selected stream.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotOpen`/`Expired`, or `SessionError::Store` on
    /// a persistence failure.
    pub async fn select_files(&self, session_id: Uuid, files: Vec<String>) -> SessionResult<()> {
        self.live_session(session_id).await?;
        self.ctx.store.set_session_files(session_id, files).await?;
        Ok(())
    }

    /// Commit the session: set the active stream to the user's selection,
    /// record a `Downloaded` transition using the user's chosen files
    /// (bypassing the Ranker entirely), and close the session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NoStreamSelected`/`NoFilesSelected` if the
    /// session is incomplete, `SessionError::NotOpen`/`Expired` if it can no
    /// longer accept a commit, or `SessionError::Store` on a persistence
    /// failure.
    pub async fn commit(&self, session_id: Uuid) -> SessionResult<()> {
        let session = self.live_session(session_id).await?;
        let stream_id = session
        .selected_stream_id
        .ok_or(SessionError::NoStreamSelected(session_id))?;
        if session.selected_files.is_empty() {
            return Err(SessionError::NoFilesSelected(session_id));
        }

        self.ctx
        .store
        .set_session_state(session_id, SessionState::Committing)
        .await?;
        let now = self.ctx.now();

        self.ctx.store.set_active_stream(session.item_id, Some(stream_id)).await?;
        self.ctx
        .store
        .record_transition(
            session.item_id,
            State::Downloaded,
            now,
            TransitionAttributes {
                file_name: session.selected_files.first().cloned(),
                failed_attempts: Some(0),
                next_retry_at: None,
                ..Default::default()
            },
        )
        .await?;

        self.close(session_id).await
    }

    /// Close the session (whether committed, explicitly cancelled, or
    /// expired) and resume autonomous scheduling for its item.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Store` on a persistence failure.
    pub async fn close(&self, session_id: Uuid) -> SessionResult<()> {
        let session = self.ctx.store.load_session(session_id).await?;
        self.ctx
        .store
        .set_session_state(session_id, SessionState::Closed)
        .await?;
        let now = self.ctx.now();
        self.ctx
        .queue
        .push(session.item_id, EventSource::Api, now, 0);
        Ok(())
    }

    /// Close an already-expired session found by the Scheduler's sweep,
    /// without re-checking liveness.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Store` on a persistence failure.
    pub async fn expire(&self, session: &Session) -> SessionResult<()> {
        self.close(session.id).await
    }

    async fn live_session(&self, session_id: Uuid) -> SessionResult<Session> {
        let session = self.ctx.store.load_session(session_id).await?;
        if session.state != SessionState::Open {
            return Err(SessionError::NotOpen(session_id));
        }
        if session.is_expired(self.ctx.now()) {
            return Err(SessionError::Expired(session_id));
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ttl_is_fifteen_minutes() {
        assert_eq!(DEFAULT_TTL_SECONDS, 900);
    }
}
