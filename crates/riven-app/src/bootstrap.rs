//! Wires the Store (C2), Service Registry (C4), Stream Registry (C3), Event
//! Queue (C6), Event Bus (C11) and Fsops into a shared [`Context`], then
//! spawns the Dispatcher (C7) and Scheduler (C9) and runs them until a
//! shutdown signal arrives.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use riven_core::ranker::FlatRanker;
use riven_dispatch::{
    BackoffTier as DispatchBackoffTier, Context, Dispatcher, EventQueue, Fsops, PoolSizes,
    RetryLimits, Scheduler, SchedulerConfig as DispatchSchedulerConfig, SizeBounds,
    StreamFilterConfig, StreamRegistry,
};
use riven_events::EventBus;
use riven_services::{RateLimitConfig as ServiceRateLimitConfig, ServiceRegistry, SystemClock, TokenBucketLimiter};
use riven_store::Store;
use riven_telemetry::{
    LogFormat as TelemetryLogFormat, LoggingConfig as TelemetryLoggingConfig, Metrics, init_logging,
};
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::error::{AppError, AppResult};

/// CLI/environment overrides layered on top of the loaded settings file.
#[derive(Debug, Clone, Default)]
pub struct AppOptions {
    /// Path to the settings file; `None` uses the default location.
    pub settings_path: Option<PathBuf>,
    /// Overrides `api.port` from the loaded configuration.
    pub port_override: Option<u16>,
    /// Drops and recreates the `public` schema before migrations run,
    /// instead of applying them on top of whatever is already there.
    pub hard_reset_db: bool,
}

/// Grace period given to in-flight dispatcher work after a shutdown signal
/// before the process gives up waiting on it.
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// Load and validate configuration, wire every component together, and run
/// the Dispatcher and Scheduler until a shutdown signal arrives.
///
/// # Errors
///
/// Returns [`AppError`] for any bootstrap failure; the CLI maps the variant
/// to the exit codes in.
pub async fn run_app(options: AppOptions) -> AppResult<()> {
    let mut config = riven_config::load(options.settings_path.as_deref())?;
    if let Some(port) = options.port_override {
        config.api.port = port;
    }
    riven_config::validate(&config).map_err(AppError::InvalidConfig)?;

    init_logging(&telemetry_logging_config(&config)).map_err(AppError::Logging)?;
    let metrics = Metrics::new()?;

    info!(port = config.api.port, hard_reset_db = options.hard_reset_db, "starting riven");

    if options.hard_reset_db {
        hard_reset_schema(&config.store.database_url).await?;
    }

    let pool = PgPoolOptions::new()
    .max_connections(config.store.max_connections)
    .connect(&config.store.database_url)
    .await?;
    let store = Store::new(pool).await?;

    let clock = Arc::new(SystemClock);
    let limiters = build_limiters(&config.rate_limits);
    let streams = StreamRegistry::new(
        store.clone(),
        Arc::new(FlatRanker),
        convert_stream_filters(&config.stream_filters),
    );
    let queue = Arc::new(EventQueue::new());
    let bus = EventBus::new();
    let fsops = Fsops::new(config.library.mount_root.clone(), config.library.library_root.clone());

    let ctx = Context {
        store,
        streams,
        services: ServiceRegistry::new(),
        queue,
        bus,
        fsops,
        clock,
        limiters,
    };

    let dispatcher = Dispatcher::new(
        ctx.clone(),
        PoolSizes {
            indexer: config.pools.indexer,
            scraping: config.pools.scraping,
            downloader: config.pools.downloader,
            symlinker: config.pools.symlinker,
            updater: config.pools.updater,
            post_processor: config.pools.post_processor,
        },
        RetryLimits {
            max_attempts: config.retry.max_attempts,
            cooldown: config.retry.config_error_cooldown(),
            scrape_backoff: convert_scrape_backoff(&config.retry.scrape_backoff),
        },
    );
    let scheduler = Scheduler::new(ctx.clone(), convert_scheduler_config(&config.scheduler));

    let dispatcher_shutdown = dispatcher.shutdown_token();
    let scheduler_shutdown = scheduler.shutdown_token();

    let dispatcher_handle = tokio::spawn(async move { dispatcher.run(SHUTDOWN_GRACE_PERIOD).await });
    let scheduler_handle = tokio::spawn(async move { scheduler.run().await });

    wait_for_shutdown_signal().await;
    info!("shutdown signal received; draining dispatcher and scheduler");
    dispatcher_shutdown.cancel();
    scheduler_shutdown.cancel();

    let _ = dispatcher_handle.await;
    let _ = scheduler_handle.await;
    let snapshot = metrics.snapshot();
    info!(queue_depth = snapshot.queue_depth, in_flight = snapshot.in_flight_items, "shutdown complete");

    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Drops and recreates the `public` schema so `Store::new`'s migrations
/// apply to an empty database.
async fn hard_reset_schema(database_url: &str) -> AppResult<()> {
    let pool = PgPoolOptions::new().max_connections(1).connect(database_url).await?;
    sqlx::query("DROP SCHEMA public CASCADE").execute(&pool).await?;
    sqlx::query("CREATE SCHEMA public").execute(&pool).await?;
    pool.close().await;
    Ok(())
}

fn build_limiters(
    configured: &std::collections::BTreeMap<String, riven_config::RateLimitConfig>,
) -> Arc<HashMap<String, Arc<TokenBucketLimiter>>> {
    let limiters = configured
    .iter()
    .map(|(backend, limit)| {
            let limiter = TokenBucketLimiter::new(ServiceRateLimitConfig {
                    burst: limit.burst,
                    replenish_period: limit.replenish_period(),
            });
            (backend.clone(), Arc::new(limiter))
    })
    .collect();
    Arc::new(limiters)
}

fn convert_stream_filters(config: &riven_config::StreamFilterConfig) -> StreamFilterConfig {
    StreamFilterConfig {
        movie_size_bounds: convert_size_bounds(&config.movie_size_bounds),
        episode_size_bounds: convert_size_bounds(&config.episode_size_bounds),
        allowed_resolutions: config.allowed_resolutions.clone(),
    }
}

fn convert_size_bounds(config: &riven_config::SizeBoundsConfig) -> SizeBounds {
    SizeBounds {
        min_bytes: config.min_bytes,
        max_bytes: config.max_bytes,
    }
}

fn convert_scrape_backoff(tiers: &[riven_config::BackoffTier]) -> Vec<DispatchBackoffTier> {
    tiers
    .iter()
    .map(|tier| DispatchBackoffTier {
            up_to_attempt: tier.up_to_attempt,
            delay: chrono::Duration::seconds(i64::try_from(tier.delay_seconds).unwrap_or(i64::MAX)),
    })
    .collect()
}

fn convert_scheduler_config(config: &riven_config::SchedulerConfig) -> DispatchSchedulerConfig {
    DispatchSchedulerConfig {
        tick_interval: config.tick_interval(),
        content_poll_interval: config.content_poll_interval(),
        retry_sweep_interval: config.retry_sweep_interval(),
        ongoing_sweep_interval: config.ongoing_recheck_interval(),
        unreleased_sweep_interval: config.unreleased_recheck_interval(),
        library_rescan_interval: config.library_rescan_interval(),
        session_sweep_interval: config.session_sweep_interval(),
        sweep_batch_limit: config.sweep_batch_limit,
    }
}

fn telemetry_logging_config(config: &riven_config::RivenConfig) -> TelemetryLoggingConfig<'_> {
    TelemetryLoggingConfig {
        level: &config.logging.filter,
        format: match config.logging.format {
            riven_config::LogFormat::Text => TelemetryLogFormat::Pretty,
            riven_config::LogFormat::Json => TelemetryLogFormat::Json,
        },
        build_sha: riven_telemetry::build_sha(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convert_scheduler_config_preserves_batch_limit() {
        let config = riven_config::SchedulerConfig::default();
        let converted = convert_scheduler_config(&config);
        assert_eq!(converted.sweep_batch_limit, config.sweep_batch_limit);
        assert_eq!(converted.tick_interval, config.tick_interval());
    }

    #[test]
    fn convert_stream_filters_preserves_bounds() {
        let config = riven_config::StreamFilterConfig::default();
        let converted = convert_stream_filters(&config);
        assert_eq!(converted.movie_size_bounds.min_bytes, config.movie_size_bounds.min_bytes);
    }

    #[test]
    fn convert_scrape_backoff_preserves_tier_order_and_seconds() {
        let tiers = vec![
            riven_config::BackoffTier { up_to_attempt: Some(2), delay_seconds: 1_800 },
            riven_config::BackoffTier { up_to_attempt: None, delay_seconds: 604_800 },
        ];
        let converted = convert_scrape_backoff(&tiers);
        assert_eq!(converted.len(), 2);
        assert_eq!(converted[0].up_to_attempt, Some(2));
        assert_eq!(converted[0].delay, chrono::Duration::seconds(1_800));
        assert_eq!(converted[1].up_to_attempt, None);
        assert_eq!(converted[1].delay, chrono::Duration::seconds(604_800));
    }
}
