//! Core entities: `MediaItem`, `Stream`, `BlacklistEntry`, `Event`, `Session`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Discriminates the four media item kinds in the hierarchy.
///
/// `Season`'s parent is always a `Show`; `Episode`'s parent is always a
/// `Season`. `Movie` and `Show` are roots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// A standalone film.
    Movie,
    /// A television show; aggregates `Season` children.
    Show,
    /// A season of a `Show`; aggregates `Episode` children.
    Season,
    /// A single episode; a leaf item that is actually downloaded.
    Episode,
}

impl ItemKind {
    /// Whether this kind is a leaf that carries file bindings and progresses
    /// through the full `Requested..Completed` pipeline directly.
    #[must_use]
    pub const fn is_leaf(self) -> bool {
        matches!(self, Self::Movie | Self::Episode)
    }
}

/// Lifecycle state of a leaf item, plus the cross-cutting and aggregate states
/// described in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// Newly added, awaiting indexing.
    Requested,
    /// Metadata resolved (and, for Show/Season, children created).
    Indexed,
    /// At least one candidate stream is registered.
    Scraped,
    /// A candidate has been cached and file-selected by a downloader.
    Downloaded,
    /// A symlink has been created in the library tree.
    Symlinked,
    /// The media server has acknowledged the new file.
    Completed,
    /// Known to air in the future; rechecked on the configured cadence.
    Unreleased,
    /// A show/season with some but not all children aired or completed.
    Ongoing,
    /// A Show/Season aggregate: some but not all descendants are `Completed`.
    PartiallyCompleted,
    /// Exceeded retry budget or hit a `Permanent` error; requires manual retry.
    Failed,
    /// Autonomous scheduling suspended, e.g. by an open manual `Session`.
    Paused,
}

impl State {
    /// Ordinal position in the linear leaf progression, used by state
    /// monotonicity checks. Cross-cutting states have no ordinal and
    /// return `None`.
    #[must_use]
    pub const fn leaf_ordinal(self) -> Option<u8> {
        match self {
            Self::Requested => Some(0),
            Self::Indexed => Some(1),
            Self::Scraped => Some(2),
            Self::Downloaded => Some(3),
            Self::Symlinked => Some(4),
            Self::Completed => Some(5),
            _ => None,
        }
    }

    /// Canonical lowercase rendering, used for persistence labels and
    /// outbound events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Indexed => "indexed",
            Self::Scraped => "scraped",
            Self::Downloaded => "downloaded",
            Self::Symlinked => "symlinked",
            Self::Completed => "completed",
            Self::Unreleased => "unreleased",
            Self::Ongoing => "ongoing",
            Self::PartiallyCompleted => "partially_completed",
            Self::Failed => "failed",
            Self::Paused => "paused",
        }
    }
}

/// Derived show/season release classification, not itself a
/// `State` — tracked alongside the item to decide recheck cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShowStatus {
    /// No aired episodes known yet.
    Unreleased,
    /// At least one aired episode, series not yet ended.
    Ongoing,
    /// No further episodes expected.
    Ended,
    /// Not enough indexer data to classify.
    Unknown,
}

/// A movie, show, season, or episode tracked by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaItem {
    /// Store-assigned identifier.
    pub id: i64,
    /// Which of the four kinds this row represents.
    pub kind: ItemKind,
    /// Parent item id (Season→Show, Episode→Season); `None` for roots.
    pub parent_id: Option<i64>,
    /// External IMDb identifier, when known.
    pub imdb_id: Option<String>,
    /// External TheTVDB identifier, when known.
    pub tvdb_id: Option<String>,
    /// External TheMovieDB identifier, when known.
    pub tmdb_id: Option<String>,
    /// External Trakt identifier, when known.
    pub trakt_id: Option<String>,
    /// Display title.
    pub title: String,
    /// Release year, when known.
    pub year: Option<i32>,
    /// Air date, when known (leaf items and episodes).
    pub aired_at: Option<DateTime<Utc>>,
    /// Originating network, when known.
    pub network: Option<String>,
    /// Country of origin, when known.
    pub country: Option<String>,
    /// Genre tags.
    pub genres: Vec<String>,
    /// Whether this item is anime (affects library template selection and
    /// ranker context; adult status is derived separately from `genres`).
    pub is_anime: bool,
    /// When the item was first requested.
    pub requested_at: DateTime<Utc>,
    /// Who/what requested the item (`"API"`, a webhook name, etc.).
    pub requested_by: String,
    /// When the item was last indexed.
    pub indexed_at: Option<DateTime<Utc>>,
    /// When the item was last scraped.
    pub scraped_at: Option<DateTime<Utc>>,
    /// Monotonic count of scrape attempts; drives retry backoff.
    pub scraped_times: i32,
    /// When a symlink was created for this item.
    pub symlinked_at: Option<DateTime<Utc>>,
    /// When the media server last acknowledged this item.
    pub updated_at: Option<DateTime<Utc>>,
    /// Timestamp of the most recent state transition.
    pub last_state_at: DateTime<Utc>,
    /// Current lifecycle state.
    pub state: State,
    /// Consecutive failed attempts at the current stage.
    pub failed_attempts: i32,
    /// Next scheduled retry time, when a retry is pending.
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Resolved source file name, for leaf items.
    pub file_name: Option<String>,
    /// Resolved source folder, for leaf items.
    pub folder: Option<String>,
    /// Resolved file size in bytes, for leaf items.
    pub file_size: Option<i64>,
    /// Path of the created symlink, for leaf items.
    pub symlink_path: Option<String>,
    /// Derived release classification, for Show/Season.
    pub show_status: Option<ShowStatus>,
    /// Next known air date, for Show/Season.
    pub next_air_date: Option<DateTime<Utc>>,
    /// The stream currently being tried, if any.
    pub active_stream_id: Option<i64>,
    /// Whether post-processing (e.g. subtitles) has already run for this item.
    pub post_processed: bool,
    /// Ordinal season number, for a `Season` or `Episode`.
    pub season_number: Option<i32>,
    /// Ordinal episode number within its season, for an `Episode`.
    pub episode_number: Option<i32>,
}

impl MediaItem {
    /// For leaf items in `Downloaded` or later, exactly one of
    /// `active_stream_id` / `symlink_path` must be set.
    #[must_use]
    pub const fn satisfies_exclusive_binding(&self) -> bool {
        if !self.kind.is_leaf() {
            return true;
        }
        match self.state.leaf_ordinal() {
            Some(ord) if ord >= State::Downloaded.leaf_ordinal().expect("ordinal") => {
                self.active_stream_id.is_some() != self.symlink_path.is_some()
            }
            _ => true,
        }
    }
}

/// A candidate release discovered for an item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stream {
    /// Store-assigned identifier.
    pub id: i64,
    /// Owning item. A stream belongs to exactly one item.
    pub item_id: i64,
    /// 40-character lowercase hex infohash.
    pub infohash: String,
    /// Raw release title as reported by the scraper.
    pub raw_title: String,
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
    /// Scraper backends that reported this infohash (merged on duplicate
    /// upsert per the "first-seen parse" resolution).
    pub source_backend: BTreeSet<String>,
    /// Known instantly cacheable on a debrid backend.
    pub cached: bool,
    /// Whether this stream has been blacklisted for its item.
    pub blacklisted: bool,
    /// Reason recorded when blacklisted.
    pub blacklist_reason: Option<BlacklistReason>,
    /// When this stream was first discovered, used to break ties when
    /// ranking otherwise-equal candidates.
    pub discovered_at: DateTime<Utc>,
}

/// Uniform blacklist reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlacklistReason {
    /// Debrid reported the infohash as uncached and unable to cache now.
    NotCached,
    /// No files in the cached set matched the item's file-selection rules.
    NoMatchingFiles,
    /// File size fell outside the configured min/max bounds.
    SizeOutOfBounds,
    /// A show-pack stream did not contain the requested season.
    WrongSeason,
    /// A show-pack stream did not contain the requested episode.
    WrongEpisode,
    /// Adult-content filter rejected the stream.
    AdultRejected,
    /// The downloader explicitly denied the request.
    DownloadDenied,
    /// The cached archive could not be extracted/read.
    UnusableArchive,
}

/// Per-item record of infohashes that must never be retried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlacklistEntry {
    /// Owning item.
    pub item_id: i64,
    /// The blacklisted infohash.
    pub infohash: String,
    /// Why it was blacklisted.
    pub reason: BlacklistReason,
    /// When it was blacklisted.
    pub blacklisted_at: DateTime<Utc>,
}

/// Who or what emitted an `Event`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSource {
    /// A pipeline service produced a follow-up event.
    Service(String),
    /// The periodic scheduler (C9).
    Scheduler,
    /// The typed HTTP API boundary.
    Api,
    /// An inbound webhook.
    Webhook,
}

/// A scheduled unit of work for a single item, queued in C6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Store/queue-assigned identifier.
    pub id: u64,
    /// Source that produced this event.
    pub emitted_by: EventSource,
    /// The item this event concerns.
    pub item_id: i64,
    /// Absolute time at which this event becomes due.
    pub run_at: DateTime<Utc>,
    /// Lower runs first when `run_at` ties.
    pub priority: i32,
    /// Set when the event has been cancelled; cooperative for workers.
    pub cancelled: bool,
    /// When this event was created.
    pub created_at: DateTime<Utc>,
    /// Retry attempt count for this stage.
    pub attempt: u32,
}

/// State of a manual override session (C10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Accepting user input (scrape, select, commit).
    Open,
    /// Commit is in progress.
    Committing,
    /// Closed (committed, cancelled, or expired); item resumed autonomous flow.
    Closed,
}

/// A time-bounded user-controlled scrape/download override (C10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Store-assigned identifier.
    pub id: Uuid,
    /// The item this session overrides.
    pub item_id: i64,
    /// When the session was opened.
    pub created_at: DateTime<Utc>,
    /// When the session expires if not closed.
    pub expires_at: DateTime<Utc>,
    /// User-selected stream, once chosen.
    pub selected_stream_id: Option<i64>,
    /// User-selected file paths within the selected stream.
    pub selected_files: Vec<String>,
    /// Current session state.
    pub state: SessionState,
}

impl Session {
    /// Whether `now` is past this session's expiry.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.state != SessionState::Closed && now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_item(state: State, active: Option<i64>, symlink: Option<&str>) -> MediaItem {
        let now = Utc::now();
        MediaItem {
            id: 1,
            kind: ItemKind::Movie,
            parent_id: None,
            imdb_id: Some("tt1104001".to_owned()),
            tvdb_id: None,
            tmdb_id: None,
            trakt_id: None,
            title: "Tron: Legacy".to_owned(),
            year: Some(2010),
            aired_at: None,
            network: None,
            country: None,
            genres: vec![],
            is_anime: false,
            requested_at: now,
            requested_by: "API".to_owned(),
            indexed_at: Some(now),
            scraped_at: Some(now),
            scraped_times: 1,
            symlinked_at: None,
            updated_at: None,
            last_state_at: now,
            state,
            failed_attempts: 0,
            next_retry_at: None,
            file_name: None,
            folder: None,
            file_size: None,
            symlink_path: symlink.map(str::to_owned),
            show_status: None,
            next_air_date: None,
            active_stream_id: active,
            post_processed: false,
            season_number: None,
            episode_number: None,
        }
    }

    #[test]
    fn exclusive_binding_holds_before_downloaded() {
        let item = sample_item(State::Scraped, None, None);
        assert!(item.satisfies_exclusive_binding());
    }

    #[test]
    fn exclusive_binding_rejects_both_set() {
        let item = sample_item(State::Downloaded, Some(9), Some("movies/x.mkv"));
        assert!(!item.satisfies_exclusive_binding());
    }

    #[test]
    fn exclusive_binding_rejects_neither_set() {
        let item = sample_item(State::Symlinked, None, None);
        assert!(!item.satisfies_exclusive_binding());
    }

    #[test]
    fn exclusive_binding_holds_with_exactly_one() {
        let item = sample_item(State::Downloaded, Some(9), None);
        assert!(item.satisfies_exclusive_binding());
    }

    #[test]
    fn session_expiry() {
        let now = Utc::now();
        let session = Session {
            id: Uuid::nil(),
            item_id: 1,
            created_at: now - Duration::hours(2),
            expires_at: now - Duration::hours(1),
            selected_stream_id: None,
            selected_files: vec![],
            state: SessionState::Open,
        };
        assert!(session.is_expired(now));
    }
}
