#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Outbound event bus (C11) for the Riven platform.
//!
//! This is distinct from the Dispatcher's internal Event Queue (C6): the bus
//! only carries fan-out notifications of committed state transitions to
//! subscribers (SSE feeds, push notifications) and never gates dispatcher
//! progress. It provides a typed event enum, sequential identifiers, and
//! replay of recent events for reconnecting subscribers (`Last-Event-ID`).
//! Internally it uses `tokio::broadcast` with a bounded buffer; when the
//! channel overflows, the oldest events are dropped.

pub mod error;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::sync::broadcast::{Receiver, Sender};
use tracing::{error, warn};

pub use error::{EventBusError, EventBusResult};

/// Identifier assigned to each event emitted by the platform.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Typed domain events surfaced on the outbound bus.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// An item's lifecycle state changed.
    ItemStateChanged {
        /// The item whose state changed.
        item_id: i64,
        /// Previous state, rendered as its canonical lowercase name.
        from: String,
        /// New state, rendered as its canonical lowercase name.
        to: String,
    },
    /// A stream was moved to an item's blacklist.
    StreamBlacklisted {
        /// The owning item.
        item_id: i64,
        /// Infohash that was blacklisted.
        infohash: String,
        /// Recorded blacklist reason.
        reason: String,
    },
    /// A scheduler tick ran (content polling, retry sweep, etc.).
    SchedulerTick {
        /// Name of the job that ran.
        job: String,
        /// Number of items it enqueued.
        enqueued: u32,
    },
    /// A service's health/enabled flag changed.
    ServiceHealthChanged {
        /// Name of the service.
        service: String,
        /// Whether the service is now healthy.
        healthy: bool,
    },
    /// An item reached a terminal successful state.
    ItemCompleted {
        /// The item that completed.
        item_id: i64,
    },
    /// An item reached a terminal failed state.
    ItemFailed {
        /// The item that failed.
        item_id: i64,
        /// Human-readable failure reason.
        reason: String,
    },
    /// A show gained a newly indexed season.
    ShowNewSeason {
        /// The show item.
        show_id: i64,
        /// The newly created season item.
        season_id: i64,
    },
}

impl Event {
    /// Machine-friendly discriminator for SSE consumers (matches the
    /// event-kind whitelist filtering style at the typed API boundary).
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ItemStateChanged {.. } => "item.state_changed",
            Self::StreamBlacklisted {.. } => "stream.blacklisted",
            Self::SchedulerTick {.. } => "scheduler.tick",
            Self::ServiceHealthChanged {.. } => "service.health_changed",
            Self::ItemCompleted {.. } => "item.completed",
            Self::ItemFailed {.. } => "item.failed",
            Self::ShowNewSeason {.. } => "show.new_season",
        }
    }
}

/// Metadata wrapper around events. Each envelope tracks the event id and
/// emission timestamp.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Monotonic identifier assigned to the wrapped event.
    pub id: EventId,
    /// Timestamp recording when the envelope was produced.
    pub timestamp: DateTime<Utc>,
    /// Wrapped event payload.
    pub event: Event,
}

/// Shared event bus built on top of `tokio::broadcast`.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    buffer: Arc<Mutex<VecDeque<EventEnvelope>>>,
    next_id: Arc<std::sync::atomic::AtomicU64>,
    replay_capacity: usize,
}

impl EventBus {
    /// Construct a new bus with the provided broadcast capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "event bus capacity must be positive");
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            next_id: Arc::new(std::sync::atomic::AtomicU64::new(1)),
            replay_capacity: capacity,
        }
    }

    /// Construct a bus with the default in-memory buffer size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Publish a new event to the bus, assigning it a sequential identifier.
    ///
    /// Returns `Err` when the broadcast send finds no active subscribers;
    /// the event is still recorded in the replay buffer regardless, so a
    /// later `subscribe`/`backlog_since` call still observes it.
    ///
    /// # Panics
    ///
    /// Panics if the replay buffer mutex has been poisoned.
    pub fn publish(&self, event: Event) -> EventBusResult<EventId> {
        let id = self
        .next_id
        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let kind = event.kind();
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };

        {
            let mut buffer = self.lock_buffer();
            if buffer.len() == self.replay_capacity {
                buffer.pop_front();
            }
            buffer.push_back(envelope.clone());
        }

        match self.sender.send(envelope) {
            Ok(_) => Ok(id),
            Err(_) => {
                warn!(event_id = id, kind, "publish had no active subscribers");
                Err(EventBusError::SendFailed {
                        event_id: id,
                        event_kind: kind,
                })
            }
        }
    }

    /// Subscribe to the bus, replaying any buffered events newer than `since_id`.
    ///
    /// # Panics
    ///
    /// Panics if the replay buffer mutex has been poisoned.
    #[must_use]
    pub fn subscribe(&self, since_id: Option<EventId>) -> EventStream {
        let mut backlog = VecDeque::new();
        if let Some(since) = since_id {
            let buffer = self.lock_buffer();
            for item in buffer.iter() {
                if item.id > since {
                    backlog.push_back(item.clone());
                }
            }
        }

        let receiver = self.sender.subscribe();
        EventStream { backlog, receiver }
    }

    /// Return a snapshot of buffered events newer than the supplied identifier.
    ///
    /// # Panics
    ///
    /// Panics if the replay buffer mutex has been poisoned.
    #[must_use]
    pub fn backlog_since(&self, since_id: EventId) -> Vec<EventEnvelope> {
        let buffer = self.lock_buffer();
        buffer
        .iter()
        .filter(|item| item.id > since_id)
        .cloned()
        .collect()
    }

    /// Returns the last assigned identifier, if any events have been published.
    ///
    /// # Panics
    ///
    /// Panics if the replay buffer mutex has been poisoned.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        let buffer = self.lock_buffer();
        buffer.back().map(|event| event.id)
    }

    fn lock_buffer(&self) -> MutexGuard<'_, VecDeque<EventEnvelope>> {
        match self.buffer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("event buffer mutex poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream wrapper that yields events either from the replay backlog or from the
/// live broadcast channel.
pub struct EventStream {
    backlog: VecDeque<EventEnvelope>,
    receiver: Receiver<EventEnvelope>,
}

impl EventStream {
    /// Receive the next event, respecting the replay backlog first.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }

        match self.receiver.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(_)) => self.receiver.recv().await.ok(),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;
    use tokio::task;
    use tokio::time::timeout;

    const PUBLISH_TIMEOUT: Duration = Duration::from_secs(1);

    #[test]
    fn event_kinds_cover_all_variants() {
        let events = [
            Event::ItemStateChanged {
                item_id: 1,
                from: "scraped".into(),
                to: "downloaded".into(),
            },
            Event::StreamBlacklisted {
                item_id: 1,
                infohash: "a".repeat(40),
                reason: "not_cached".into(),
            },
            Event::SchedulerTick {
                job: "retry_sweep".into(),
                enqueued: 3,
            },
            Event::ServiceHealthChanged {
                service: "real-debrid".into(),
                healthy: false,
            },
            Event::ItemCompleted { item_id: 1 },
            Event::ItemFailed {
                item_id: 1,
                reason: "exceeded retries".into(),
            },
            Event::ShowNewSeason {
                show_id: 1,
                season_id: 2,
            },
        ];

        let expected = [
            "item.state_changed",
            "stream.blacklisted",
            "scheduler.tick",
            "service.health_changed",
            "item.completed",
            "item.failed",
            "show.new_season",
        ];

        for (event, kind) in events.iter().zip(expected) {
            assert_eq!(event.kind(), kind);
        }
    }

    fn sample_event(id: usize) -> Event {
        Event::SchedulerTick {
            job: "retry_sweep".into(),
            enqueued: id as u32,
        }
    }

    #[tokio::test]
    async fn sequential_ids_and_replay() {
        let bus = EventBus::with_capacity(16);
        let mut stream = bus.subscribe(None);

        let mut last_id = 0;
        for i in 0..5 {
            last_id = bus.publish(sample_event(i)).expect("has a subscriber");
        }
        assert_eq!(last_id, 5);

        let mut received = Vec::new();
        for _ in 0..5 {
            if let Some(event) = stream.next().await {
                received.push(event);
            }
        }
        assert_eq!(received.len(), 5);
    }

    #[tokio::test]
    async fn publish_without_subscriber_still_buffers() {
        let bus = EventBus::with_capacity(4);
        let result = bus.publish(sample_event(0));
        assert!(result.is_err());
        assert_eq!(bus.backlog_since(0).len(), 1);
    }

    #[tokio::test]
    async fn load_test_does_not_stall_publishers() {
        let bus = Arc::new(EventBus::with_capacity(512));
        let mut stream = bus.subscribe(None);

        let publisher = {
            let bus = bus.clone();
            task::spawn(async move {
                    for i in 0..500 {
                        let _ = bus.publish(sample_event(i));
                    }
            })
        };

        let consumer = task::spawn(async move {
                let mut ids = HashSet::new();
                while ids.len() < 500 {
                    if let Some(event) = stream.next().await {
                        ids.insert(event.id);
                    }
                }
                ids
        });

        publisher.await.expect("publisher task panicked");
        let ids = consumer.await.expect("consumer task panicked");
        assert_eq!(ids.len(), 500);
    }

    #[tokio::test]
    async fn subscribe_without_since_replays_all() {
        let bus = EventBus::with_capacity(4);
        for i in 0..3 {
            let _ = bus.publish(sample_event(i));
        }
        let mut stream = bus.subscribe(Some(0));
        let mut collected = Vec::new();
        for expected_id in 1..=3 {
            collected.push(
                timeout(PUBLISH_TIMEOUT, stream.next())
                .await
                .expect("stream stalled")
                .expect("stream closed"),
            );
            assert_eq!(collected.last().unwrap().id, expected_id);
        }
        assert_eq!(collected.len(), 3);
    }

    #[tokio::test]
    async fn stream_returns_none_after_sender_dropped() {
        let mut stream = {
            let bus = EventBus::with_capacity(1);
            let stream = bus.subscribe(None);
            drop(bus);
            stream
        };
        assert!(
            stream.next().await.is_none(),
            "closing the sender should end the stream"
        );
    }
}
