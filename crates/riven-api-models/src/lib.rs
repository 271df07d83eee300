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
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Shared HTTP DTOs for the Riven API surface.
//!
//! Conversions live next to their DTOs so the mapping from domain objects
//! (`MediaItem`, `Stream`, `Session`) to wire shapes stays a single source of
//! truth. The HTTP server itself lives outside this crate; this one only
//! fixes the request/response contract the surface catalog implies.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use riven_core::{BlacklistReason, ItemKind, MediaItem, Session, SessionState, ShowStatus, State, Stream};
use riven_events::{Event as DomainEvent, EventEnvelope};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// RFC9457-compatible problem document surfaced on validation/runtime errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    /// URI reference identifying the problem type.
    pub kind: String,
    /// Short, human-readable summary of the issue.
    pub title: String,
    /// HTTP status code associated with the error.
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Detailed diagnostic message when available.
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Parameters that failed validation, if applicable.
    pub invalid_params: Option<Vec<ProblemInvalidParam>>,
}

/// Invalid parameter pointer surfaced alongside a [`ProblemDetails`] payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemInvalidParam {
    /// JSON Pointer to the offending field.
    pub pointer: String,
    /// Human-readable description of the validation failure.
    pub message: String,
}

/// Lightweight row returned by `GET /items`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemSummary {
    /// Store-assigned identifier.
    pub id: i64,
    /// Which of the four kinds this row represents.
    pub kind: ItemKind,
    /// Parent item id (Season→Show, Episode→Season); `None` for roots.
    pub parent_id: Option<i64>,
    /// Display title.
    pub title: String,
    /// Release year, when known.
    pub year: Option<i32>,
    /// Current lifecycle state.
    pub state: State,
    /// When the item was first requested.
    pub requested_at: DateTime<Utc>,
    /// Timestamp of the most recent state transition.
    pub last_state_at: DateTime<Utc>,
}

impl From<&MediaItem> for ItemSummary {
    fn from(item: &MediaItem) -> Self {
        Self {
            id: item.id,
            kind: item.kind,
            parent_id: item.parent_id,
            title: item.title.clone(),
            year: item.year,
            state: item.state,
            requested_at: item.requested_at,
            last_state_at: item.last_state_at,
        }
    }
}

/// Page of items returned by `GET /items`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ItemListResponse {
    /// Page of item summaries.
    pub items: Vec<ItemSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Cursor for retrieving the next page, when available.
    pub next: Option<String>,
}

/// Full item view returned by `GET /items/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemDetail {
    #[serde(flatten)]
    /// Summary fields shared with the list view.
    pub summary: ItemSummary,
    /// External IMDb identifier, when known.
    pub imdb_id: Option<String>,
    /// External TheTVDB identifier, when known.
    pub tvdb_id: Option<String>,
    /// External TheMovieDB identifier, when known.
    pub tmdb_id: Option<String>,
    /// External Trakt identifier, when known.
    pub trakt_id: Option<String>,
    /// Ordinal season number, for a `Season` or `Episode`.
    pub season_number: Option<i32>,
    /// Ordinal episode number within its season, for an `Episode`.
    pub episode_number: Option<i32>,
    /// Consecutive failed attempts at the current stage.
    pub failed_attempts: i32,
    /// Next scheduled retry time, when a retry is pending.
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Resolved source file name, for leaf items.
    pub file_name: Option<String>,
    /// Path of the created symlink, for leaf items.
    pub symlink_path: Option<String>,
    /// Derived release classification, for Show/Season.
    pub show_status: Option<ShowStatus>,
    /// Next known air date, for Show/Season.
    pub next_air_date: Option<DateTime<Utc>>,
    /// The stream currently being tried, if any.
    pub active_stream_id: Option<i64>,
}

impl From<&MediaItem> for ItemDetail {
    fn from(item: &MediaItem) -> Self {
        Self {
            summary: ItemSummary::from(item),
            imdb_id: item.imdb_id.clone(),
            tvdb_id: item.tvdb_id.clone(),
            tmdb_id: item.tmdb_id.clone(),
            trakt_id: item.trakt_id.clone(),
            season_number: item.season_number,
            episode_number: item.episode_number,
            failed_attempts: item.failed_attempts,
            next_retry_at: item.next_retry_at,
            file_name: item.file_name.clone(),
            symlink_path: item.symlink_path.clone(),
            show_status: item.show_status,
            next_air_date: item.next_air_date,
            active_stream_id: item.active_stream_id,
        }
    }
}

fn default_requested_by() -> String {
    "API".to_string()
}

impl Default for ItemKind {
    fn default() -> Self {
        Self::Movie
    }
}

/// JSON body accepted by `POST /items` (add by external id, ).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ItemCreateRequest {
    /// Which kind of root item to admit (`Movie` or `Show`).
    pub kind: ItemKind,
    #[serde(default)]
    /// External IMDb identifier.
    pub imdb_id: Option<String>,
    #[serde(default)]
    /// External TheTVDB identifier.
    pub tvdb_id: Option<String>,
    #[serde(default)]
    /// External TheMovieDB identifier.
    pub tmdb_id: Option<String>,
    #[serde(default)]
    /// External Trakt identifier.
    pub trakt_id: Option<String>,
    #[serde(default = "default_requested_by")]
    /// Who requested the item; defaults to `"API"`.
    pub requested_by: String,
}

/// Wire view of a candidate release returned by `GET /streams/{item_id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamView {
    /// Store-assigned identifier.
    pub id: i64,
    /// Owning item.
    pub item_id: i64,
    /// 40-character lowercase hex infohash.
    pub infohash: String,
    /// Title after parsing (season/episode/resolution stripped).
    pub parsed_title: String,
    /// Ranker-assigned rank; higher is better.
    pub rank: i32,
    /// Resolution tag (e.g. `"1080p"`).
    pub resolution: Option<String>,
    /// Size in bytes, when reported.
    pub size_bytes: Option<i64>,
    /// Seeder count, when reported.
    pub seeders: Option<i32>,
    /// Whether this stream has been blacklisted for its item.
    pub blacklisted: bool,
    /// Reason recorded when blacklisted.
    pub blacklist_reason: Option<BlacklistReason>,
}

impl From<&Stream> for StreamView {
    fn from(stream: &Stream) -> Self {
        Self {
            id: stream.id,
            item_id: stream.item_id,
            infohash: stream.infohash.clone(),
            parsed_title: stream.parsed_title.clone(),
            rank: stream.rank,
            resolution: stream.resolution.clone(),
            size_bytes: stream.size_bytes,
            seeders: stream.seeders,
            blacklisted: stream.blacklisted,
            blacklist_reason: stream.blacklist_reason,
        }
    }
}

/// Response body for `GET /streams/{item_id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StreamListResponse {
    /// Candidate streams known for the item, ranked order.
    pub streams: Vec<StreamView>,
}

/// JSON body accepted by `POST /streams/{item_id}/blacklist/{infohash}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlacklistRequest {
    /// Why the caller is blacklisting this infohash.
    pub reason: BlacklistReason,
}

/// Wire view of a manual override session (C10).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionView {
    /// Store-assigned identifier.
    pub id: Uuid,
    /// The item this session overrides.
    pub item_id: i64,
    /// When the session expires if not closed.
    pub expires_at: DateTime<Utc>,
    /// User-selected stream, once chosen.
    pub selected_stream_id: Option<i64>,
    /// User-selected file paths within the selected stream.
    pub selected_files: Vec<String>,
    /// Current session state.
    pub state: SessionState,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id,
            item_id: session.item_id,
            expires_at: session.expires_at,
            selected_stream_id: session.selected_stream_id,
            selected_files: session.selected_files.clone(),
            state: session.state,
        }
    }
}

/// JSON body accepted when committing a manual session: maps the user's
/// file selections onto a chosen stream, bypassing the ranker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SessionCommitRequest {
    /// Selected stream id to commit with.
    pub stream_id: i64,
    /// Selected file paths within that stream.
    pub selected_files: Vec<String>,
}

/// Response body for `GET /stats`: a coarse operational snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StatsResponse {
    /// Count of items currently in each lifecycle state, keyed by the
    /// state's canonical lowercase name.
    pub items_by_state: BTreeMap<String, i64>,
    /// Events currently pending in the Event Queue (C6).
    pub queue_depth: i64,
    /// Items currently claimed by a worker (I4 `in_flight` set).
    pub in_flight_items: i64,
}

/// JSON body accepted by `POST /webhook/show-update`: an external media
/// server or content source announcing a show changed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ShowUpdateWebhookRequest {
    #[serde(default)]
    /// External TheTVDB identifier for the show.
    pub tvdb_id: Option<String>,
    #[serde(default)]
    /// External Trakt identifier for the show.
    pub trakt_id: Option<String>,
    #[serde(default)]
    /// Human-readable show title, for logging when ids are absent.
    pub title: Option<String>,
}

/// Wire encoding of a single event for the `GET /stream` SSE feed:
/// newline-delimited JSON objects tagged by a dotted `type` discriminator.
///
/// This is deliberately a separate type from `riven_events::Event`: the bus's
/// own serde tag renders as `"item_state_changed"` (snake_case, for internal
/// replay/persistence), while the public SSE contract uses the dotted form
/// (`"item.state_changed"`). Keeping them distinct means internal event
/// renaming never silently breaks the public feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum SseEvent {
    /// An item's lifecycle state changed.
    #[serde(rename = "item.state_changed")]
    ItemStateChanged {
        /// The item whose state changed.
        id: i64,
        /// Previous state, rendered as its canonical lowercase name.
        from: String,
        /// New state, rendered as its canonical lowercase name.
        to: String,
        /// When the transition was recorded.
        at: DateTime<Utc>,
    },
    /// A stream was moved to an item's blacklist.
    #[serde(rename = "stream.blacklisted")]
    StreamBlacklisted {
        /// The owning item.
        id: i64,
        /// Infohash that was blacklisted.
        infohash: String,
        /// Recorded blacklist reason.
        reason: String,
        /// When the blacklist entry was recorded.
        at: DateTime<Utc>,
    },
    /// A scheduler tick ran (content polling, retry sweep, etc.).
    #[serde(rename = "scheduler.tick")]
    SchedulerTick {
        /// Name of the job that ran.
        job: String,
        /// Number of items it enqueued.
        enqueued: u32,
        /// When the tick ran.
        at: DateTime<Utc>,
    },
    /// A service's health/enabled flag changed.
    #[serde(rename = "service.health_changed")]
    ServiceHealthChanged {
        /// Name of the service.
        service: String,
        /// Whether the service is now healthy.
        healthy: bool,
        /// When the flag changed.
        at: DateTime<Utc>,
    },
    /// An item reached a terminal successful state.
    #[serde(rename = "item.completed")]
    ItemCompleted {
        /// The item that completed.
        id: i64,
        /// When the item completed.
        at: DateTime<Utc>,
    },
    /// An item reached a terminal failed state.
    #[serde(rename = "item.failed")]
    ItemFailed {
        /// The item that failed.
        id: i64,
        /// Human-readable failure reason.
        reason: String,
        /// When the item failed.
        at: DateTime<Utc>,
    },
    /// A show gained a newly indexed season.
    #[serde(rename = "show.new_season")]
    ShowNewSeason {
        /// The show item.
        show_id: i64,
        /// The newly created season item.
        season_id: i64,
        /// When the season was indexed.
        at: DateTime<Utc>,
    },
}

impl From<&EventEnvelope> for SseEvent {
    fn from(envelope: &EventEnvelope) -> Self {
        let at = envelope.timestamp;
        match &envelope.event {
            DomainEvent::ItemStateChanged { item_id, from, to } => Self::ItemStateChanged {
                id: *item_id,
                from: from.clone(),
                to: to.clone(),
                at,
            },
            DomainEvent::StreamBlacklisted {
                item_id,
                infohash,
                reason,
            } => Self::StreamBlacklisted {
                id: *item_id,
                infohash: infohash.clone(),
                reason: reason.clone(),
                at,
            },
            DomainEvent::SchedulerTick { job, enqueued } => Self::SchedulerTick {
                job: job.clone(),
                enqueued: *enqueued,
                at,
            },
            DomainEvent::ServiceHealthChanged { service, healthy } => Self::ServiceHealthChanged {
                service: service.clone(),
                healthy: *healthy,
                at,
            },
            DomainEvent::ItemCompleted { item_id } => Self::ItemCompleted { id: *item_id, at },
            DomainEvent::ItemFailed { item_id, reason } => Self::ItemFailed {
                id: *item_id,
                reason: reason.clone(),
                at,
            },
            DomainEvent::ShowNewSeason { show_id, season_id } => Self::ShowNewSeason {
                show_id: *show_id,
                season_id: *season_id,
                at,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_item() -> MediaItem {
        let now = Utc::now();
        MediaItem {
            id: 7,
            kind: ItemKind::Movie,
            parent_id: None,
            imdb_id: Some("tt1104001".to_string()),
            tvdb_id: None,
            tmdb_id: None,
            trakt_id: None,
            title: "Tron: Legacy".to_string(),
            year: Some(2010),
            aired_at: None,
            network: None,
            country: None,
            genres: vec![],
            is_anime: false,
            requested_at: now,
            requested_by: "API".to_string(),
            indexed_at: None,
            scraped_at: None,
            scraped_times: 0,
            symlinked_at: None,
            updated_at: None,
            last_state_at: now,
            state: State::Requested,
            failed_attempts: 0,
            next_retry_at: None,
            file_name: None,
            folder: None,
            file_size: None,
            symlink_path: None,
            show_status: None,
            next_air_date: None,
            active_stream_id: None,
            post_processed: false,
            season_number: None,
            episode_number: None,
        }
    }

    #[test]
    fn item_detail_flattens_summary_fields() {
        let item = sample_item();
        let detail = ItemDetail::from(&item);
        let json = serde_json::to_value(&detail).expect("serialize");
        assert_eq!(json["id"], 7);
        assert_eq!(json["title"], "Tron: Legacy");
        assert_eq!(json["imdb_id"], "tt1104001");
    }

    #[test]
    fn sse_event_uses_dotted_type_discriminator() {
        let envelope = EventEnvelope {
            id: 1,
            timestamp: Utc::now(),
            event: DomainEvent::ItemStateChanged {
                item_id: 7,
                from: "requested".to_string(),
                to: "indexed".to_string(),
            },
        };
        let wire = SseEvent::from(&envelope);
        let json = serde_json::to_value(&wire).expect("serialize");
        assert_eq!(json["type"], "item.state_changed");
        assert_eq!(json["id"], 7);
        assert_eq!(json["from"], "requested");
    }

    #[test]
    fn item_create_request_defaults_requested_by_to_api() {
        let json = serde_json::json!({ "kind": "movie", "imdb_id": "tt1104001" });
        let request: ItemCreateRequest = serde_json::from_value(json).expect("deserialize");
        assert_eq!(request.requested_by, "API");
    }

    #[test]
    fn stream_view_carries_blacklist_reason() {
        let stream = Stream {
            id: 1,
            item_id: 7,
            infohash: "a".repeat(40),
            raw_title: "Tron.Legacy.2010.1080p".to_string(),
            parsed_title: "Tron: Legacy".to_string(),
            rank: 42,
            resolution: Some("1080p".to_string()),
            size_bytes: Some(4_000_000_000),
            seeders: Some(12),
            source_backend: std::collections::BTreeSet::new(),
            cached: true,
            blacklisted: true,
            blacklist_reason: Some(BlacklistReason::SizeOutOfBounds),
            discovered_at: Utc::now(),
        };
        let view = StreamView::from(&stream);
        assert!(view.blacklisted);
        assert_eq!(view.blacklist_reason, Some(BlacklistReason::SizeOutOfBounds));
    }
}
