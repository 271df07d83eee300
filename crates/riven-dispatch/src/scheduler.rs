//! Scheduler (C9): the periodic jobs that feed the Event Queue without
//! waiting for an external trigger — content polling, library rescan, retry
//! sweep, ongoing/unreleased rechecks, and manual-session expiry.
//!
//! Implemented as a single cooperative tick loop rather than one
//! `tokio::time::interval` per job: each job tracks its own next-due instant
//! and the loop only sleeps until the next of those, which keeps the whole
//! scheduler's concurrency story to one task.

use std::time::Duration;

use chrono::{DateTime, Utc};
use riven_core::EventSource;
use riven_services::model::ExternalItemRef;
use riven_store::{ItemPredicate, NewItem};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::context::Context;
use crate::dispatcher::priority_for;
use crate::session::SessionManager;

/// Tuning for the periodic jobs. Defaults are conservative; production
/// deployments tune these from settings.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// How often the tick loop wakes to check due jobs.
    pub tick_interval: Duration,
    /// How often each `ContentSource` is polled.
    pub content_poll_interval: Duration,
    /// How often the retry-due sweep runs.
    pub retry_sweep_interval: Duration,
    /// How often the ongoing-show recheck sweep runs.
    pub ongoing_sweep_interval: Duration,
    /// How often the unreleased-show recheck sweep runs.
    pub unreleased_sweep_interval: Duration,
    /// How often the library is rescanned for drift.
    pub library_rescan_interval: Duration,
    /// How often expired manual sessions are swept and closed.
    pub session_sweep_interval: Duration,
    /// Max rows fetched per sweep, to bound a single tick's work.
    pub sweep_batch_limit: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(10),
            content_poll_interval: Duration::from_secs(5 * 60),
            retry_sweep_interval: Duration::from_secs(60),
            ongoing_sweep_interval: Duration::from_secs(60 * 60),
            unreleased_sweep_interval: Duration::from_secs(60 * 60),
            library_rescan_interval: Duration::from_secs(60 * 60),
            session_sweep_interval: Duration::from_secs(30),
            sweep_batch_limit: 200,
        }
    }
}

/// Runs the periodic jobs that keep autonomous scheduling moving forward
/// even when no external webhook or API call is driving it.
pub struct Scheduler {
    ctx: Context,
    config: SchedulerConfig,
    sessions: SessionManager,
    shutdown: CancellationToken,
}

impl Scheduler {
    /// Build a scheduler over `ctx` with the given job cadence.
    #[must_use]
    pub fn new(ctx: Context, config: SchedulerConfig) -> Self {
        let sessions = SessionManager::new(ctx.clone());
        Self {
            ctx,
            config,
            sessions,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that, when cancelled, stops the tick loop after its current
    /// pass completes.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run every job once immediately, then on its own cadence, until the
    /// shutdown token is cancelled.
    pub async fn run(&self) {
        let start = self.ctx.now();
        let mut next_content_poll = start;
        let mut next_retry_sweep = start;
        let mut next_ongoing_sweep = start;
        let mut next_unreleased_sweep = start;
        let mut next_library_rescan = start;
        let mut next_session_sweep = start;

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            let now = self.ctx.now();

            if now >= next_content_poll {
                self.poll_content_sources(now).await;
                next_content_poll = now + self.config.content_poll_interval;
            }
            if now >= next_retry_sweep {
                self.sweep(now, ItemPredicate::RetryDue(now), "retry_sweep").await;
                next_retry_sweep = now + self.config.retry_sweep_interval;
            }
            if now >= next_ongoing_sweep {
                self.sweep(now, ItemPredicate::OngoingDue(now), "ongoing_recheck").await;
                next_ongoing_sweep = now + self.config.ongoing_sweep_interval;
            }
            if now >= next_unreleased_sweep {
                self.sweep(now, ItemPredicate::UnreleasedDue(now), "unreleased_recheck")
                .await;
                next_unreleased_sweep = now + self.config.unreleased_sweep_interval;
            }
            if now >= next_library_rescan {
                self.rescan_library().await;
                next_library_rescan = now + self.config.library_rescan_interval;
            }
            if now >= next_session_sweep {
                self.sweep_expired_sessions(now).await;
                next_session_sweep = now + self.config.session_sweep_interval;
            }

            tokio::select! {
                () = tokio::time::sleep(self.config.tick_interval) => {}
                () = self.shutdown.cancelled() => break,
            }
        }
    }

    /// Poll every enabled `ContentSource` for new external items, admit them
    /// into the Store, and enqueue the resulting Indexer events.
    async fn poll_content_sources(&self, now: DateTime<Utc>) {
        let since = now - self.config.content_poll_interval;
        let mut enqueued = 0u32;

        for source in self.ctx.services.active_content_sources() {
            match source.poll(since).await {
                Ok(item_refs) => {
                    for item_ref in item_refs {
                        match self.admit(&item_ref, now).await {
                            Ok(item_id) => {
                                self.ctx.queue.push(item_id, EventSource::Scheduler, now, 0);
                                enqueued += 1;
                            }
                            Err(err) => {
                                error!(source = source.name(), error = %err, "failed to admit polled item");
                            }
                        }
                    }
                }
                Err(err) => {
                    warn!(source = source.name(), error = %err, "content source poll failed");
                }
            }
        }

        self.publish_tick("content_poll", enqueued);
    }

    async fn admit(&self, item_ref: &ExternalItemRef, now: DateTime<Utc>) -> riven_store::StoreResult<i64> {
        let new_item = NewItem {
            kind: item_ref.kind,
            parent_id: None,
            imdb_id: item_ref.imdb_id.clone(),
            tvdb_id: item_ref.tvdb_id.clone(),
            tmdb_id: item_ref.tmdb_id.clone(),
            trakt_id: item_ref.trakt_id.clone(),
            title: item_ref.title.clone().unwrap_or_default(),
            year: None,
            aired_at: item_ref.aired_at,
            network: None,
            country: None,
            genres: Vec::new(),
            is_anime: false,
            requested_by: item_ref.requested_by.clone(),
            season_number: item_ref.season_number,
            episode_number: item_ref.episode_number,
        };
        self.ctx.store.insert_item(new_item, now).await
    }

    /// Run one `ItemPredicate` sweep and enqueue an event for every item it
    /// returns.
    async fn sweep(&self, now: DateTime<Utc>, predicate: ItemPredicate, job_name: &str) {
        match self
        .ctx
        .store
        .items_needing(predicate, self.config.sweep_batch_limit)
        .await
        {
            Ok(items) => {
                let enqueued = u32::try_from(items.len()).unwrap_or(u32::MAX);
                for item in &items {
                    self.ctx
                    .queue
                    .push(item.id, EventSource::Scheduler, now, priority_for(item, now));
                }
                if i64::from(enqueued) == self.config.sweep_batch_limit {
                    warn!(job = job_name, limit = self.config.sweep_batch_limit, "sweep hit its batch limit; more items remain due");
                }
                self.publish_tick(job_name, enqueued);
            }
            Err(err) => {
                error!(job = job_name, error = %err, "sweep query failed");
            }
        }
    }

    /// Walk the library tree looking for symlinks whose source no longer
    /// resolves. Logs drift; does not mutate the Store, since a
    /// missing source is the rclone mount's concern, not this item's.
    async fn rescan_library(&self) {
        let root = self.ctx.fsops.library_root().to_path_buf();
        let mut broken = 0u32;
        let mut scanned = 0u32;

        for entry in walkdir::WalkDir::new(&root)
        .into_iter()
        .filter_map(Result::ok)
        {
            let path = entry.path();
            let Ok(metadata) = tokio::fs::symlink_metadata(path).await else {
                continue;
            };
            if !metadata.file_type().is_symlink() {
                continue;
            }
            scanned += 1;
            if tokio::fs::metadata(path).await.is_err() {
                broken += 1;
                warn!(path = %path.display(), "library symlink target no longer resolves");
            }
        }

        if broken > 0 {
            warn!(scanned, broken, "library rescan found broken symlinks");
        }
        self.publish_tick("library_rescan", scanned);
    }

    /// Close every manual session whose TTL has elapsed, resuming autonomous
    /// scheduling for their items.
    async fn sweep_expired_sessions(&self, now: DateTime<Utc>) {
        match self.ctx.store.expired_sessions(now).await {
            Ok(sessions) => {
                let enqueued = u32::try_from(sessions.len()).unwrap_or(u32::MAX);
                for session in &sessions {
                    if let Err(err) = self.sessions.expire(session).await {
                        error!(session_id = %session.id, error = %err, "failed to close expired session");
                    }
                }
                self.publish_tick("session_expiry", enqueued);
            }
            Err(err) => {
                error!(error = %err, "expired-session query failed");
            }
        }
    }

    fn publish_tick(&self, job: &str, enqueued: u32) {
        let _ = self.ctx.bus.publish(riven_events::Event::SchedulerTick {
                job: job.to_owned(),
                enqueued,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_cadence() {
        let config = SchedulerConfig::default();
        assert_eq!(config.content_poll_interval, Duration::from_secs(300));
        assert_eq!(config.session_sweep_interval, Duration::from_secs(30));
    }
}
