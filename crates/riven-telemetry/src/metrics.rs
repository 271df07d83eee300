//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes counters/gauges relevant to the dispatcher, event queue, and
//! worker pools.

use std::convert::TryFrom;
use std::time::Duration;

use anyhow::{Context, Result};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use serde::Serialize;

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: std::sync::Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    http_requests_total: IntCounterVec,
    events_emitted_total: IntCounterVec,
    dispatch_outcomes_total: IntCounterVec,
    streams_blacklisted_total: IntCounterVec,
    queue_depth: IntGauge,
    in_flight_items: IntGauge,
    pool_active_workers: IntGaugeVec,
    config_watch_latency_ms: IntGauge,
    config_apply_latency_ms: IntGauge,
    config_update_failures_total: IntCounter,
    config_watch_slow_total: IntCounter,
    rate_limit_throttled_total: IntCounterVec,
}

/// Snapshot of selected gauges and counters for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Events currently pending in the Event Queue (C6).
    pub queue_depth: i64,
    /// Items currently claimed by a worker (I4 `in_flight` set).
    pub in_flight_items: i64,
    /// Latest latency (ms) when watching for configuration changes.
    pub config_watch_latency_ms: i64,
    /// Latest latency (ms) when applying configuration changes.
    pub config_apply_latency_ms: i64,
    /// Total count of configuration update failures observed.
    pub config_update_failures_total: u64,
    /// Total count of slow configuration watch intervals observed.
    pub config_watch_slow_total: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total HTTP requests received"),
            &["route", "code"],
        )?;
        let events_emitted_total = IntCounterVec::new(
            Opts::new("events_emitted_total", "Outbound bus events emitted by type"),
            &["type"],
        )?;
        let dispatch_outcomes_total = IntCounterVec::new(
            Opts::new(
                "dispatch_outcomes_total",
                "Pipeline handler outcomes by service and result",
            ),
            &["service", "outcome"],
        )?;
        let streams_blacklisted_total = IntCounterVec::new(
            Opts::new(
                "streams_blacklisted_total",
                "Streams moved to an item's blacklist by reason",
            ),
            &["reason"],
        )?;
        let queue_depth = IntGauge::with_opts(Opts::new(
                "event_queue_depth",
                "Events currently pending in the dispatcher's event queue",
        ))?;
        let in_flight_items = IntGauge::with_opts(Opts::new(
                "in_flight_items",
                "Items currently claimed by a dispatcher worker",
        ))?;
        let pool_active_workers = IntGaugeVec::new(
            Opts::new(
                "pool_active_workers",
                "Active workers per service worker pool",
            ),
            &["service"],
        )?;
        let config_watch_latency_ms = IntGauge::with_opts(Opts::new(
                "config_watch_latency_ms",
                "Time spent waiting for configuration updates (ms)",
        ))?;
        let config_apply_latency_ms = IntGauge::with_opts(Opts::new(
                "config_apply_latency_ms",
                "Time taken to apply configuration updates (ms)",
        ))?;
        let config_update_failures_total = IntCounter::with_opts(Opts::new(
                "config_update_failures_total",
                "Configuration update failures",
        ))?;
        let config_watch_slow_total = IntCounter::with_opts(Opts::new(
                "config_watch_slow_total",
                "Configuration updates exceeding the latency guard rail",
        ))?;
        let rate_limit_throttled_total = IntCounterVec::new(
            Opts::new(
                "rate_limit_throttled_total",
                "Backend calls delayed by a token-bucket rate limiter",
            ),
            &["backend"],
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(events_emitted_total.clone()))?;
        registry.register(Box::new(dispatch_outcomes_total.clone()))?;
        registry.register(Box::new(streams_blacklisted_total.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;
        registry.register(Box::new(in_flight_items.clone()))?;
        registry.register(Box::new(pool_active_workers.clone()))?;
        registry.register(Box::new(config_watch_latency_ms.clone()))?;
        registry.register(Box::new(config_apply_latency_ms.clone()))?;
        registry.register(Box::new(config_update_failures_total.clone()))?;
        registry.register(Box::new(config_watch_slow_total.clone()))?;
        registry.register(Box::new(rate_limit_throttled_total.clone()))?;

        Ok(Self {
                inner: std::sync::Arc::new(MetricsInner {
                        registry,
                        http_requests_total,
                        events_emitted_total,
                        dispatch_outcomes_total,
                        streams_blacklisted_total,
                        queue_depth,
                        in_flight_items,
                        pool_active_workers,
                        config_watch_latency_ms,
                        config_apply_latency_ms,
                        config_update_failures_total,
                        config_watch_slow_total,
                        rate_limit_throttled_total,
                }),
        })
    }

    /// Increment the HTTP request counter for the given route and status code.
    pub fn inc_http_request(&self, route: &str, status: u16) {
        self.inner
        .http_requests_total
        .with_label_values(&[route, &status.to_string()])
        .inc();
    }

    /// Increment the emitted outbound-bus event counter for the specific event type.
    pub fn inc_event(&self, event_type: &str) {
        self.inner
        .events_emitted_total
        .with_label_values(&[event_type])
        .inc();
    }

    /// Increment a pipeline handler outcome counter (service, outcome).
    pub fn inc_dispatch_outcome(&self, service: &str, outcome: &str) {
        self.inner
        .dispatch_outcomes_total
        .with_label_values(&[service, outcome])
        .inc();
    }

    /// Increment the blacklist counter for the given reason.
    pub fn inc_stream_blacklisted(&self, reason: &str) {
        self.inner
        .streams_blacklisted_total
        .with_label_values(&[reason])
        .inc();
    }

    /// Set the event queue depth gauge.
    pub fn set_queue_depth(&self, depth: i64) {
        self.inner.queue_depth.set(depth);
    }

    /// Set the in-flight item count gauge.
    pub fn set_in_flight_items(&self, count: i64) {
        self.inner.in_flight_items.set(count);
    }

    /// Set the active worker count for a given service pool.
    pub fn set_pool_active_workers(&self, service: &str, count: i64) {
        self.inner
        .pool_active_workers
        .with_label_values(&[service])
        .set(count);
    }

    /// Increment the rate-limit throttle counter for a backend.
    pub fn inc_rate_limit_throttled(&self, backend: &str) {
        self.inner
        .rate_limit_throttled_total
        .with_label_values(&[backend])
        .inc();
    }

    /// Record the observed latency while waiting for configuration updates.
    pub fn observe_config_watch_latency(&self, duration: Duration) {
        self.inner
        .config_watch_latency_ms
        .set(Self::duration_to_ms(duration));
    }

    /// Record the observed latency for applying configuration updates.
    pub fn observe_config_apply_latency(&self, duration: Duration) {
        self.inner
        .config_apply_latency_ms
        .set(Self::duration_to_ms(duration));
    }

    /// Increment the configuration update failure counter.
    pub fn inc_config_update_failure(&self) {
        self.inner.config_update_failures_total.inc();
    }

    /// Increment the counter tracking slow configuration applications.
    pub fn inc_config_watch_slow(&self) {
        self.inner.config_watch_slow_total.inc();
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
        .encode(&metric_families, &mut buffer)
        .context("failed to encode Prometheus metrics")?;
        String::from_utf8(buffer).context("metrics output was not valid UTF-8")
    }

    /// Take a point-in-time snapshot of the most relevant gauges and counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_depth: self.inner.queue_depth.get(),
            in_flight_items: self.inner.in_flight_items.get(),
            config_watch_latency_ms: self.inner.config_watch_latency_ms.get(),
            config_apply_latency_ms: self.inner.config_apply_latency_ms.get(),
            config_update_failures_total: self.inner.config_update_failures_total.get(),
            config_watch_slow_total: self.inner.config_watch_slow_total.get(),
        }
    }

    /// Convert a duration to milliseconds saturating at `i64::MAX`.
    pub(crate) fn duration_to_ms(duration: Duration) -> i64 {
        i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn duration_to_ms_saturates_on_large_values() {
        let duration = Duration::from_secs(u64::MAX / 2);
        assert_eq!(Metrics::duration_to_ms(duration), i64::MAX);
    }

    #[test]
    fn metrics_snapshot_reflects_updates() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.inc_http_request("/items", 200);
        metrics.inc_event("item.state_changed");
        metrics.inc_dispatch_outcome("scraper", "success");
        metrics.inc_stream_blacklisted("not_cached");
        metrics.set_queue_depth(7);
        metrics.set_in_flight_items(3);
        metrics.set_pool_active_workers("scraping", 2);
        metrics.inc_rate_limit_throttled("real_debrid");
        metrics.observe_config_watch_latency(Duration::from_millis(120));
        metrics.observe_config_apply_latency(Duration::from_millis(45));
        metrics.inc_config_update_failure();
        metrics.inc_config_watch_slow();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.queue_depth, 7);
        assert_eq!(snapshot.in_flight_items, 3);
        assert_eq!(snapshot.config_watch_latency_ms, 120);
        assert_eq!(snapshot.config_apply_latency_ms, 45);
        assert_eq!(snapshot.config_update_failures_total, 1);
        assert_eq!(snapshot.config_watch_slow_total, 1);

        let rendered = metrics.render()?;
        assert!(rendered.contains("http_requests_total"));
        assert!(rendered.contains("dispatch_outcomes_total"));
        assert!(rendered.contains("streams_blacklisted_total"));
        Ok(())
    }
}
