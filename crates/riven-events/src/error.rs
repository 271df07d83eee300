//! Error type returned when a publish cannot be delivered.

use crate::EventId;
use thiserror::Error;

/// Result alias for bus operations that can fail.
pub type EventBusResult<T> = Result<T, EventBusError>;

/// Failure publishing an event. The event is still recorded in the replay
/// buffer; this only reflects whether the live broadcast channel accepted it.
#[derive(Debug, Error)]
pub enum EventBusError {
    /// No subscribers were attached when the event was sent.
    #[error("event {event_id} ({event_kind}) had no active subscribers")]
    SendFailed {
        /// Identifier assigned to the event that failed to send.
        event_id: EventId,
        /// Machine-friendly kind of the event that failed to send.
        event_kind: &'static str,
    },
}

impl EventBusError {
    /// The identifier of the event that failed to publish.
    #[must_use]
    pub const fn event_id(&self) -> EventId {
        match self {
            Self::SendFailed { event_id,.. } => *event_id,
        }
    }

    /// The kind of the event that failed to publish.
    #[must_use]
    pub const fn event_kind(&self) -> &'static str {
        match self {
            Self::SendFailed { event_kind,.. } => event_kind,
        }
    }
}
