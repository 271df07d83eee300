//! Dispatcher (C7): one worker pool per `ServiceKind`, the `in_flight` set,
//! and the single transaction that commits each handler's outcome.
//!
//! The main loop never calls a handler directly from the pop — it acquires a
//! permit from that service's pool first, so a saturated pool naturally
//! backpressures the queue instead of dropping events.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use riven_core::state_machine::{self, NextAction, ServiceAvailability, ServiceKind, StreamAvailability};
use riven_core::{EventSource, ItemKind, MediaItem, PipelineError, State};
use riven_store::TransitionAttributes;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::context::Context;
use crate::error::DispatchResult;
use crate::pipeline::{self, HandlerOutcome};

/// Per-service worker pool sizes.
#[derive(Debug, Clone, Copy)]
pub struct PoolSizes {
    /// Concurrent Indexer invocations.
    pub indexer: usize,
    /// Concurrent Scraping invocations.
    pub scraping: usize,
    /// Concurrent Downloader invocations.
    pub downloader: usize,
    /// Concurrent Symlinker invocations.
    pub symlinker: usize,
    /// Concurrent Updater invocations.
    pub updater: usize,
    /// Concurrent PostProcessor invocations.
    pub post_processor: usize,
}

impl Default for PoolSizes {
    fn default() -> Self {
        Self {
            indexer: 3,
            scraping: 8,
            downloader: 4,
            symlinker: 2,
            updater: 2,
            post_processor: 1,
        }
    }
}

/// One tier of the piecewise scraping backoff table: attempts up to and
/// including `up_to_attempt` wait `delay` before the next try. `None` marks
/// the catch-all tier applied beyond every other tier's bound.
#[derive(Debug, Clone, Copy)]
pub struct BackoffTier {
    /// Upper (inclusive) bound on `scraped_times` this tier applies to.
    pub up_to_attempt: Option<u32>,
    /// Delay before the next scrape attempt.
    pub delay: chrono::Duration,
}

/// Bounded attempts before a stage is abandoned autonomously, and the
/// cooldown before the stage may be attempted again after a `Config` error.
#[derive(Debug, Clone)]
pub struct RetryLimits {
    /// Maximum consecutive `Transient` failures before `Failed`.
    pub max_attempts: i32,
    /// How long a misconfigured service is skipped before being retried.
    pub cooldown: chrono::Duration,
    /// Piecewise scraping backoff table, evaluated in order; matches
    /// `riven_core::retry::scrape_backoff`'s tiers by default but is
    /// operator-configurable via settings.
    pub scrape_backoff: Vec<BackoffTier>,
}

impl RetryLimits {
    /// Look up the delay for the given `scraped_times`, using the first tier
    /// whose `up_to_attempt` bound is met, or the catch-all (`None`) tier.
    /// Falls back to `riven_core::retry::scrape_backoff`'s fixed table if no
    /// tiers are configured at all.
    #[must_use]
    pub fn scrape_backoff_for(&self, scraped_times: i32) -> chrono::Duration {
        if self.scrape_backoff.is_empty() {
            return riven_core::retry::scrape_backoff(scraped_times);
        }
        let attempt = u32::try_from(scraped_times.max(0)).unwrap_or(u32::MAX);
        self.scrape_backoff
        .iter()
        .find(|tier| tier.up_to_attempt.is_none_or(|bound| attempt <= bound))
        .map_or_else(|| riven_core::retry::scrape_backoff(scraped_times), |tier| tier.delay)
    }
}

impl Default for RetryLimits {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            cooldown: chrono::Duration::hours(6),
            scrape_backoff: vec![
                BackoffTier { up_to_attempt: Some(2), delay: chrono::Duration::minutes(30) },
                BackoffTier { up_to_attempt: Some(5), delay: chrono::Duration::hours(2) },
                BackoffTier { up_to_attempt: Some(10), delay: chrono::Duration::hours(24) },
                BackoffTier { up_to_attempt: None, delay: chrono::Duration::hours(168) },
            ],
        }
    }
}

#[derive(Clone)]
struct Pools {
    indexer: Arc<Semaphore>,
    scraping: Arc<Semaphore>,
    downloader: Arc<Semaphore>,
    symlinker: Arc<Semaphore>,
    updater: Arc<Semaphore>,
    post_processor: Arc<Semaphore>,
}

impl Pools {
    fn new(sizes: PoolSizes) -> Self {
        Self {
            indexer: Arc::new(Semaphore::new(sizes.indexer)),
            scraping: Arc::new(Semaphore::new(sizes.scraping)),
            downloader: Arc::new(Semaphore::new(sizes.downloader)),
            symlinker: Arc::new(Semaphore::new(sizes.symlinker)),
            updater: Arc::new(Semaphore::new(sizes.updater)),
            post_processor: Arc::new(Semaphore::new(sizes.post_processor)),
        }
    }

    fn for_kind(&self, kind: ServiceKind) -> &Arc<Semaphore> {
        match kind {
            ServiceKind::Indexer => &self.indexer,
            ServiceKind::Scraping => &self.scraping,
            ServiceKind::Downloader => &self.downloader,
            ServiceKind::Symlinker => &self.symlinker,
            ServiceKind::Updater => &self.updater,
            ServiceKind::PostProcessor => &self.post_processor,
        }
    }
}

/// Pulls due events, runs the matching Pipeline Handler on the service's
/// worker pool, and commits the outcome in a single transaction.
pub struct Dispatcher {
    ctx: Context,
    pools: Pools,
    retry: RetryLimits,
    shutdown: CancellationToken,
}

impl Dispatcher {
    /// Build a dispatcher over `ctx` with the given pool sizes and retry
    /// policy.
    #[must_use]
    pub fn new(ctx: Context, pool_sizes: PoolSizes, retry: RetryLimits) -> Self {
        Self {
            ctx,
            pools: Pools::new(pool_sizes),
            retry,
            shutdown: CancellationToken::new(),
        }
    }

    /// A token that, when cancelled, stops the loop from popping new events
    /// while letting in-flight work drain.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run the dispatch loop until the shutdown token is cancelled, then wait
    /// up to `grace_period` for in-flight work to finish before returning.
    pub async fn run(&self, grace_period: Duration) {
        let mut tasks = JoinSet::new();

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            let now = self.ctx.now();
            match self.ctx.queue.pop_due(now) {
                Some(event) => {
                    let ctx = self.ctx.clone();
                    let pools = self.pools.clone();
                    let retry = self.retry.clone();
                    let shutdown = self.shutdown.clone();
                    tasks.spawn(async move {
                            let item_id = event.item_id;
                            if let Err(err) = dispatch_one(&ctx, &pools, &retry, &shutdown, item_id).await
                            {
                                error!(item_id, error = %err, "dispatch cycle failed; item stays eligible for a later event");
                            }
                            ctx.queue.release(item_id);
                    });
                }
                None => {
                    tokio::select! {
                        () = self.ctx.queue.wait_for_work(Duration::from_millis(500)) => {}
                        () = self.shutdown.cancelled() => break,
                    }
                }
            }

            while tasks.try_join_next().is_some() {}
        }

        let _ = tokio::time::timeout(grace_period, async {
                while tasks.join_next().await.is_some() {}
        })
        .await;
    }
}

pub(crate) fn priority_for(item: &MediaItem, now: DateTime<Utc>) -> i32 {
    if now - item.requested_at <= chrono::Duration::hours(24) {
        0
    } else {
        1
    }
}

fn backoff_for_attempt(failed_attempts: i32) -> chrono::Duration {
    let exponent = failed_attempts.clamp(0, 10);
    let secs = 30i64.saturating_mul(1i64 << exponent);
    chrono::Duration::seconds(secs.min(3600))
}

fn publish_transition(ctx: &Context, item_id: i64, from: State, to: State) {
    let _ = ctx.bus.publish(riven_events::Event::ItemStateChanged {
            item_id,
            from: from.as_str().to_owned(),
            to: to.as_str().to_owned(),
    });
}

async fn dispatch_one(
    ctx: &Context,
    pools: &Pools,
    retry: &RetryLimits,
    shutdown: &CancellationToken,
    item_id: i64,
) -> DispatchResult<()> {
    let now = ctx.now();
    let (item, children) = ctx.store.load_item(item_id, 1).await?;

    if matches!(item.kind, ItemKind::Show | ItemKind::Season) {
        return handle_aggregate(ctx, &item, &children, now).await;
    }

    let availability = ServiceAvailability {
        indexer_enabled: ctx.services.indexer_enabled(),
        any_scraper_enabled: ctx.services.any_scraper_enabled(&item),
        downloader_enabled: ctx.services.downloader_enabled(),
        updater_enabled: ctx.services.updater_enabled(),
        post_processor_enabled: ctx.services.post_processor_enabled(),
    };
    let has_candidate = ctx.streams.select_next_candidate(item.id).await?.is_some();
    let stream_availability = StreamAvailability { has_candidate };

    match state_machine::next_action(&item, availability, stream_availability, now) {
        NextAction::FanOut => {
            unreachable!("leaf items (Movie/Episode) never fan out")
        }
        NextAction::Terminal => Ok(()),
        NextAction::WaitUntil(at) => {
            ctx.queue
            .push(item.id, EventSource::Scheduler, at, priority_for(&item, now));
            Ok(())
        }
        NextAction::NextService(kind) => run_service(ctx, pools, retry, shutdown, &item, kind).await,
    }
}

async fn handle_aggregate(
    ctx: &Context,
    item: &MediaItem,
    children: &[MediaItem],
    now: DateTime<Utc>,
) -> DispatchResult<()> {
    if children.is_empty() {
        // Not yet indexed into Seasons/Episodes; the Requested->Indexed
        // transition for this item itself still goes through run_service.
        let availability = ServiceAvailability {
            indexer_enabled: ctx.services.indexer_enabled(),
            any_scraper_enabled: false,
            downloader_enabled: false,
            updater_enabled: false,
            post_processor_enabled: false,
        };
        if item.state == State::Requested {
            if let NextAction::NextService(ServiceKind::Indexer) = state_machine::next_action(
                item,
                availability,
                StreamAvailability { has_candidate: false },
                now,
            ) {
                ctx.queue
                .push(item.id, EventSource::Scheduler, now, priority_for(item, now));
            }
        }
        return Ok(());
    }

    let derived = state_machine::aggregate_state(
        &children.iter().map(|child| child.state).collect::<Vec<_>>(),
    );
    if derived != item.state {
        ctx.store
        .record_transition(item.id, derived, now, TransitionAttributes::default())
        .await?;
        publish_transition(ctx, item.id, item.state, derived);
        if derived == State::Completed {
            let _ = ctx
            .bus
            .publish(riven_events::Event::ItemCompleted { item_id: item.id });
        }
    }

    for child in children {
        if child.state != State::Completed {
            ctx.queue.push(
                child.id,
                EventSource::Service("Dispatcher".to_owned()),
                now,
                priority_for(child, now),
            );
        }
    }
    Ok(())
}

async fn run_service(
    ctx: &Context,
    pools: &Pools,
    retry: &RetryLimits,
    shutdown: &CancellationToken,
    item: &MediaItem,
    kind: ServiceKind,
) -> DispatchResult<()> {
    let semaphore = pools.for_kind(kind).clone();
    let permit = semaphore
    .acquire_owned()
    .await
    .expect("worker pool semaphore is never closed");

    if shutdown.is_cancelled() {
        drop(permit);
        record_cancelled(item, kind);
        return Ok(());
    }

    let now = ctx.now();
    let outcome = tokio::select! {
        result = run_handler(ctx, item, kind) => result,
        () = shutdown.cancelled() => {
            drop(permit);
            record_cancelled(item, kind);
            return Ok(());
        }
    };
    drop(permit);

    match outcome {
        Ok(handler_outcome) => commit_success(ctx, item, handler_outcome, now, retry).await,
        Err(err) => commit_failure(ctx, item, kind, err, retry, now).await,
    }
}

fn record_cancelled(item: &MediaItem, kind: ServiceKind) {
    info!(item_id = item.id, ?kind, "stage cancelled cooperatively; not a retry");
}

async fn run_handler(
    ctx: &Context,
    item: &MediaItem,
    kind: ServiceKind,
) -> riven_core::PipelineResult<HandlerOutcome> {
    match kind {
        ServiceKind::Indexer => pipeline::run_indexer(ctx, item).await,
        ServiceKind::Scraping => pipeline::run_scraper(ctx, item).await,
        ServiceKind::Downloader => pipeline::run_downloader(ctx, item).await,
        ServiceKind::Symlinker => pipeline::run_symlinker(ctx, item).await,
        ServiceKind::Updater => pipeline::run_updater(ctx, item).await,
        ServiceKind::PostProcessor => Ok(pipeline::run_post_processor(ctx, item).await),
    }
}

async fn commit_success(
    ctx: &Context,
    item: &MediaItem,
    outcome: HandlerOutcome,
    now: DateTime<Utc>,
    retry: &RetryLimits,
) -> DispatchResult<()> {
    let from = item.state;
    match outcome {
        HandlerOutcome::Indexed { metadata: _, child_ids } => {
            ctx.store
            .record_transition(
                item.id,
                State::Indexed,
                now,
                TransitionAttributes {
                    indexed_at: Some(now),
                    failed_attempts: Some(0),
                    next_retry_at: None,
                    ..Default::default()
                },
            )
            .await?;
            publish_transition(ctx, item.id, from, State::Indexed);

            if item.kind == ItemKind::Show {
                for &season_id in &child_ids {
                    let _ = ctx.bus.publish(riven_events::Event::ShowNewSeason {
                            show_id: item.id,
                            season_id,
                    });
                }
            }
            for child_id in child_ids {
                ctx.queue
                .push(child_id, EventSource::Service("Indexer".to_owned()), now, 0);
            }
            // Re-evaluate this item so a Show/Season fans out immediately
            // rather than waiting for an unrelated external trigger.
            ctx.queue
            .push(item.id, EventSource::Service("Indexer".to_owned()), now, 0);
        }
        HandlerOutcome::Scraped { added } => {
            if added > 0 {
                ctx.store
                .record_transition(
                    item.id,
                    State::Scraped,
                    now,
                    TransitionAttributes {
                        scraped_at: Some(now),
                        scraped_times: Some(0),
                        failed_attempts: Some(0),
                        next_retry_at: None,
                        ..Default::default()
                    },
                )
                .await?;
                publish_transition(ctx, item.id, from, State::Scraped);
                ctx.queue
                .push(item.id, EventSource::Service("Scraping".to_owned()), now, 0);
            } else {
                let scraped_times = item.scraped_times + 1;
                let next_retry_at = now + retry.scrape_backoff_for(scraped_times);
                ctx.store
                .record_transition(
                    item.id,
                    from,
                    now,
                    TransitionAttributes {
                        scraped_times: Some(scraped_times),
                        next_retry_at: Some(next_retry_at),
                        ..Default::default()
                    },
                )
                .await?;
                ctx.queue
                .push(item.id, EventSource::Scheduler, next_retry_at, priority_for(item, now));
            }
        }
        HandlerOutcome::Downloaded { stream_id: _, selection } => {
            let path = std::path::Path::new(&selection.file.path);
            let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&selection.file.path)
            .to_owned();
            let folder = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(|parent| parent.to_string_lossy().into_owned());

            ctx.store
            .record_transition(
                item.id,
                State::Downloaded,
                now,
                TransitionAttributes {
                    file_name: Some(file_name),
                    folder,
                    file_size: Some(selection.file.size_bytes),
                    failed_attempts: Some(0),
                    next_retry_at: None,
                    ..Default::default()
                },
            )
            .await?;
            publish_transition(ctx, item.id, from, State::Downloaded);
            ctx.queue
            .push(item.id, EventSource::Service("Downloader".to_owned()), now, 0);
        }
        HandlerOutcome::Symlinked { path } => {
            ctx.store
            .record_transition(
                item.id,
                State::Symlinked,
                now,
                TransitionAttributes {
                    symlinked_at: Some(now),
                    symlink_path: Some(path),
                    failed_attempts: Some(0),
                    next_retry_at: None,
                    ..Default::default()
                },
            )
            .await?;
            publish_transition(ctx, item.id, from, State::Symlinked);
            ctx.queue
            .push(item.id, EventSource::Service("Symlinker".to_owned()), now, 0);
        }
        HandlerOutcome::Updated => {
            ctx.store
            .record_transition(
                item.id,
                State::Completed,
                now,
                TransitionAttributes {
                    updated_at: Some(now),
                    failed_attempts: Some(0),
                    next_retry_at: None,
                    ..Default::default()
                },
            )
            .await?;
            publish_transition(ctx, item.id, from, State::Completed);
            let _ = ctx
            .bus
            .publish(riven_events::Event::ItemCompleted { item_id: item.id });
            ctx.queue
            .push(item.id, EventSource::Service("Updater".to_owned()), now, 0);
        }
        HandlerOutcome::PostProcessed => {
            ctx.store.mark_post_processed(item.id).await?;
        }
    }
    Ok(())
}

async fn commit_failure(
    ctx: &Context,
    item: &MediaItem,
    kind: ServiceKind,
    err: PipelineError,
    retry: &RetryLimits,
    now: DateTime<Utc>,
) -> DispatchResult<()> {
    match err {
        PipelineError::ContentRejected { reason, detail } => {
            // The Downloader handler already blacklisted the offending stream
            // and tried the next candidate itself; reaching here means the
            // live set was exhausted mid-try. Re-enqueue the scrape stage.
            debug!(item_id = item.id, ?reason, detail, "re-enqueuing scrape stage after rejection");
            ctx.queue
            .push(item.id, EventSource::Service(format!("{kind:?}")), now, priority_for(item, now));
            Ok(())
        }
        PipelineError::NotAvailableYet(detail) => {
            debug!(item_id = item.id, detail, "candidate set exhausted; backing off");
            let scraped_times = item.scraped_times + 1;
            let next_retry_at = now + retry.scrape_backoff_for(scraped_times);
            ctx.store
            .record_transition(
                item.id,
                item.state,
                now,
                TransitionAttributes {
                    scraped_times: Some(scraped_times),
                    next_retry_at: Some(next_retry_at),
                    ..Default::default()
                },
            )
            .await?;
            ctx.queue
            .push(item.id, EventSource::Scheduler, next_retry_at, priority_for(item, now));
            Ok(())
        }
        PipelineError::Transient(detail) => {
            if item.failed_attempts + 1 >= retry.max_attempts {
                warn!(item_id = item.id, detail, "transient retries exhausted; failing item");
                fail_permanently(ctx, item, &detail, now).await
            } else {
                let delay = backoff_for_attempt(item.failed_attempts);
                ctx.store
                .record_transition(
                    item.id,
                    item.state,
                    now,
                    TransitionAttributes {
                        failed_attempts: Some(item.failed_attempts + 1),
                        next_retry_at: Some(now + delay),
                        ..Default::default()
                    },
                )
                .await?;
                ctx.queue
                .push(item.id, EventSource::Scheduler, now + delay, priority_for(item, now));
                Ok(())
            }
        }
        PipelineError::Permanent(detail) => fail_permanently(ctx, item, &detail, now).await,
        PipelineError::Config(detail) => {
            warn!(item_id = item.id, ?kind, detail, "service misconfigured; skipping stage for the cooldown");
            ctx.queue
            .push(item.id, EventSource::Scheduler, now + retry.cooldown, priority_for(item, now));
            Ok(())
        }
        PipelineError::Internal(detail) => {
            error!(item_id = item.id, detail, "pipeline invariant violated; transition not recorded, retrying once");
            ctx.queue
            .push(item.id, EventSource::Scheduler, now + chrono::Duration::seconds(5), 0);
            Ok(())
        }
    }
}

async fn fail_permanently(
    ctx: &Context,
    item: &MediaItem,
    detail: &str,
    now: DateTime<Utc>,
) -> DispatchResult<()> {
    ctx.store
    .record_transition(
        item.id,
        State::Failed,
        now,
        TransitionAttributes {
            next_retry_at: None,
            ..Default::default()
        },
    )
    .await?;
    publish_transition(ctx, item.id, item.state, State::Failed);
    let _ = ctx.bus.publish(riven_events::Event::ItemFailed {
            item_id: item.id,
            reason: detail.to_owned(),
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_saturates() {
        assert_eq!(backoff_for_attempt(0), chrono::Duration::seconds(30));
        assert_eq!(backoff_for_attempt(1), chrono::Duration::seconds(60));
        assert_eq!(backoff_for_attempt(10), chrono::Duration::seconds(3600));
        assert_eq!(backoff_for_attempt(20), chrono::Duration::seconds(3600));
    }

    #[test]
    fn scrape_backoff_for_matches_default_tiers() {
        let retry = RetryLimits::default();
        assert_eq!(retry.scrape_backoff_for(1), chrono::Duration::minutes(30));
        assert_eq!(retry.scrape_backoff_for(2), chrono::Duration::minutes(30));
        assert_eq!(retry.scrape_backoff_for(3), chrono::Duration::hours(2));
        assert_eq!(retry.scrape_backoff_for(5), chrono::Duration::hours(2));
        assert_eq!(retry.scrape_backoff_for(6), chrono::Duration::hours(24));
        assert_eq!(retry.scrape_backoff_for(10), chrono::Duration::hours(24));
        assert_eq!(retry.scrape_backoff_for(11), chrono::Duration::hours(168));
        assert_eq!(retry.scrape_backoff_for(1000), chrono::Duration::hours(168));
    }

    #[test]
    fn scrape_backoff_for_falls_back_when_no_tiers_configured() {
        let retry = RetryLimits { scrape_backoff: vec![], ..RetryLimits::default() };
        assert_eq!(
            retry.scrape_backoff_for(3),
            riven_core::retry::scrape_backoff(3)
        );
    }

    #[test]
    fn scrape_backoff_for_matches_hardcoded_table_across_the_board() {
        let retry = RetryLimits::default();
        for attempt in 0..20 {
            assert_eq!(
                retry.scrape_backoff_for(attempt),
                riven_core::retry::scrape_backoff(attempt),
                "attempt {attempt} diverges from the fixed table"
            );
        }
    }
}
