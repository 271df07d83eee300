//! Event Queue (C6): a min-heap keyed by `(run_at, priority, id)` with
//! per-item dedup and cancellation.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use riven_core::{Event, EventSource};
use tokio::sync::Notify;

/// A queued event ordered so the heap pops the soonest-due, lowest-priority,
/// lowest-id entry first.
#[derive(Debug, Clone)]
struct QueuedEvent {
    event: Event,
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.event.id == other.event.id
    }
}
impl Eq for QueuedEvent {}

impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the "smallest" event (soonest
        // due) compares greatest and surfaces first.
        other
        .event
        .run_at
        .cmp(&self.event.run_at)
        .then_with(|| other.event.priority.cmp(&self.event.priority))
        .then_with(|| other.event.id.cmp(&self.event.id))
    }
}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct Inner {
    heap: BinaryHeap<QueuedEvent>,
    /// Maps `item_id` to the id of its currently-pending event, for dedup.
    pending_by_item: HashMap<i64, u64>,
    in_flight: std::collections::HashSet<i64>,
    next_id: u64,
}

/// Thread-safe priority queue of pipeline events.
pub struct EventQueue {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
        }
    }

    /// Enqueue an event for `item_id` due at `run_at`. If the item already
    /// has a pending event, the existing entry is replaced only when the new
    /// `run_at` is sooner (or equal); otherwise this call is a no-op.
    pub fn push(
        &self,
        item_id: i64,
        emitted_by: EventSource,
        run_at: DateTime<Utc>,
        priority: i32,
    ) {
        let mut inner = self.inner.lock().expect("event queue mutex poisoned");

        if let Some(&existing_id) = inner.pending_by_item.get(&item_id) {
            let existing_run_at = inner
            .heap
            .iter()
            .find(|queued| queued.event.id == existing_id)
            .map(|queued| queued.event.run_at);
            if let Some(existing_run_at) = existing_run_at {
                if run_at >= existing_run_at {
                    return;
                }
            }
            // The new push is sooner: drop the stale heap entry outright so
            // it cannot later be popped as a duplicate for this item.
            let rebuilt: BinaryHeap<QueuedEvent> = inner
            .heap
            .drain()
            .filter(|queued| queued.event.id != existing_id)
            .collect();
            inner.heap = rebuilt;
        }

        let id = inner.next_id;
        inner.next_id += 1;
        let event = Event {
            id,
            emitted_by,
            item_id,
            run_at,
            priority,
            cancelled: false,
            created_at: Utc::now(),
            attempt: 0,
        };
        inner.pending_by_item.insert(item_id, id);
        inner.heap.push(QueuedEvent { event });
        drop(inner);
        self.notify.notify_waiters();
    }

    /// Mark every pending event for `item_id` as cancelled. The dispatcher
    /// discards cancelled events when it pops them rather than removing them
    /// from the heap eagerly.
    pub fn cancel(&self, item_id: i64) {
        let mut inner = self.inner.lock().expect("event queue mutex poisoned");
        // BinaryHeap has no in-place mutation; rebuild with cancelled flags set.
        let rebuilt: BinaryHeap<QueuedEvent> = inner
        .heap
        .drain()
        .map(|mut queued| {
                if queued.event.item_id == item_id {
                    queued.event.cancelled = true;
                }
                queued
        })
        .collect();
        inner.heap = rebuilt;
        inner.pending_by_item.remove(&item_id);
    }

    /// Pop at most one due, non-cancelled event whose item is not currently
    /// in flight. Returns `None` immediately if nothing is ready; callers
    /// that want to wait should combine this with `wait_for_work`.
    pub fn pop_due(&self, now: DateTime<Utc>) -> Option<Event> {
        let mut inner = self.inner.lock().expect("event queue mutex poisoned");
        let mut deferred = Vec::new();
        let mut result = None;

        while let Some(queued) = inner.heap.pop() {
            if queued.event.cancelled {
                inner.pending_by_item.remove(&queued.event.item_id);
                continue;
            }
            if queued.event.run_at > now {
                deferred.push(queued);
                break;
            }
            if inner.in_flight.contains(&queued.event.item_id) {
                deferred.push(queued);
                continue;
            }
            inner.in_flight.insert(queued.event.item_id);
            inner.pending_by_item.remove(&queued.event.item_id);
            result = Some(queued.event);
            break;
        }

        for queued in deferred {
            inner.heap.push(queued);
        }

        result
    }

    /// Wait until `notify_waiters` fires (a new event was pushed) or the
    /// given deadline elapses, whichever comes first.
    pub async fn wait_for_work(&self, timeout: std::time::Duration) {
        let notified = self.notify.notified();
        tokio::select! {
            () = notified => {},
            () = tokio::time::sleep(timeout) => {},
        }
    }

    /// Release `item_id` from the `in_flight` set. Called after the
    /// Dispatcher commits the transaction for an event's outcome.
    pub fn release(&self, item_id: i64) {
        let mut inner = self.inner.lock().expect("event queue mutex poisoned");
        inner.in_flight.remove(&item_id);
    }

    /// Number of items currently claimed by a worker.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.inner.lock().expect("event queue mutex poisoned").in_flight.len()
    }

    /// Number of events waiting in the heap (including cancelled tombstones
    /// not yet popped).
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("event queue mutex poisoned").heap.len()
    }

    /// Whether the queue has no pending events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn pop_due_respects_run_at_ordering() {
        let queue = EventQueue::new();
        let base = now();
        queue.push(1, EventSource::Scheduler, base + chrono::Duration::seconds(5), 0);
        queue.push(2, EventSource::Scheduler, base, 0);

        let first = queue.pop_due(base + chrono::Duration::seconds(10)).expect("due event");
        assert_eq!(first.item_id, 2);
    }

    #[test]
    fn pop_due_breaks_ties_on_priority_then_id() {
        let queue = EventQueue::new();
        let at = now();
        queue.push(1, EventSource::Scheduler, at, 5);
        queue.push(2, EventSource::Scheduler, at, 1);

        let first = queue.pop_due(at).expect("due event");
        assert_eq!(first.item_id, 2, "lower priority value wins at equal run_at");
    }

    #[test]
    fn dedup_keeps_sooner_push() {
        let queue = EventQueue::new();
        let at = now();
        queue.push(1, EventSource::Scheduler, at + chrono::Duration::minutes(10), 0);
        queue.push(1, EventSource::Scheduler, at, 0);

        assert_eq!(queue.len(), 1);
        let event = queue.pop_due(at).expect("due event");
        assert_eq!(event.run_at, at);
    }

    #[test]
    fn dedup_ignores_later_push() {
        let queue = EventQueue::new();
        let at = now();
        queue.push(1, EventSource::Scheduler, at, 0);
        queue.push(1, EventSource::Scheduler, at + chrono::Duration::minutes(10), 0);

        let event = queue.pop_due(at).expect("due event");
        assert_eq!(event.run_at, at);
    }

    #[test]
    fn in_flight_blocks_second_pop_for_same_item() {
        let queue = EventQueue::new();
        let at = now();
        queue.push(1, EventSource::Scheduler, at, 0);
        let popped = queue.pop_due(at).expect("first pop");
        assert_eq!(popped.item_id, 1);

        queue.push(1, EventSource::Scheduler, at, 0);
        assert!(queue.pop_due(at).is_none(), "item 1 is in flight");

        queue.release(1);
        assert!(queue.pop_due(at).is_some());
    }

    #[test]
    fn cancel_discards_pending_event_on_pop() {
        let queue = EventQueue::new();
        let at = now();
        queue.push(1, EventSource::Scheduler, at, 0);
        queue.cancel(1);
        assert!(queue.pop_due(at).is_none());
    }

    #[test]
    fn pop_due_defers_future_events() {
        let queue = EventQueue::new();
        let at = now();
        queue.push(1, EventSource::Scheduler, at + chrono::Duration::minutes(1), 0);
        assert!(queue.pop_due(at).is_none());
        assert!(queue.pop_due(at + chrono::Duration::minutes(2)).is_some());
    }
}
