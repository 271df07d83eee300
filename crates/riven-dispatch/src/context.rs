//! Shared handle passed to every pipeline handler and scheduler job.

use std::collections::HashMap;
use std::sync::Arc;

use riven_events::EventBus;
use riven_services::{Clock, ServiceRegistry, TokenBucketLimiter};
use riven_store::Store;

use crate::fsops::Fsops;
use crate::queue::EventQueue;
use crate::streams::StreamRegistry;

/// Everything a handler or scheduler job needs to do its work, grouped so
/// callers never reach for a singleton.
#[derive(Clone)]
pub struct Context {
    /// Transactional persistence (C2).
    pub store: Store,
    /// Stream Registry & Ranker glue (C3).
    pub streams: StreamRegistry,
    /// Typed handles to external collaborators (C4).
    pub services: ServiceRegistry,
    /// Internal priority queue (C6), shared with the Dispatcher and Scheduler.
    pub queue: Arc<EventQueue>,
    /// Outbound fan-out bus (C11).
    pub bus: EventBus,
    /// Library symlink templating and path-keyed locking (part of C8's
    /// Symlinker handler).
    pub fsops: Fsops,
    /// Time source, real in production, fixed in tests (C1).
    pub clock: Arc<dyn Clock>,
    /// Per-backend token-bucket limiters, keyed by service name (C1).
    pub limiters: Arc<HashMap<String, Arc<TokenBucketLimiter>>>,
}

impl Context {
    /// Current time, as seen by this context's clock.
    #[must_use]
    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    /// Acquire the named backend's rate limiter, if one is configured. A
    /// backend with no configured limiter runs unthrottled.
    pub async fn throttle(&self, backend: &str) {
        if let Some(limiter) = self.limiters.get(backend) {
            limiter.acquire().await;
        }
    }
}
