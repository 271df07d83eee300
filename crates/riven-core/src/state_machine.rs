//! Pure transition function (C5): `(item, services, now) -> next_action`.
//!
//! No IO, no mutation. `riven-dispatch` calls this once per popped event and
//! turns the result into enqueued follow-up events and a Store transaction.

use crate::model::{ItemKind, MediaItem, ShowStatus, State};
use chrono::{DateTime, Utc};

/// One service kind the Dispatcher can run next for an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    /// Resolves metadata and, for Show/Season, creates children.
    Indexer,
    /// Discovers candidate streams.
    Scraping,
    /// Caches and file-selects a candidate.
    Downloader,
    /// Creates the library symlink.
    Symlinker,
    /// Notifies the media server.
    Updater,
    /// Runs optional post-processing (subtitles, etc.).
    PostProcessor,
}

/// Which capabilities are currently enabled, as seen by the Service Registry
/// (C4). The state machine only needs yes/no per capability, never concrete
/// service instances.
#[derive(Debug, Clone, Copy)]
pub struct ServiceAvailability {
    /// Whether an indexer is enabled.
    pub indexer_enabled: bool,
    /// Whether at least one scraper is enabled.
    pub any_scraper_enabled: bool,
    /// Whether a downloader is enabled.
    pub downloader_enabled: bool,
    /// Whether an updater is enabled.
    pub updater_enabled: bool,
    /// Whether post-processing is enabled.
    pub post_processor_enabled: bool,
}

/// Whether the Stream Registry currently has a selectable candidate for this
/// item (not blacklisted, not recently failed). Supplied by the caller
/// because C3's live set is not part of `MediaItem` itself.
#[derive(Debug, Clone, Copy)]
pub struct StreamAvailability {
    /// A selectable candidate stream exists.
    pub has_candidate: bool,
}

/// The decision returned by `next_action`.
#[derive(Debug, Clone, PartialEq)]
pub enum NextAction {
    /// Run this service next.
    NextService(ServiceKind),
    /// This item is an aggregate (Show/Season); fan out events to its
    /// non-`Completed` children instead of running a service directly.
    FanOut,
    /// Nothing to do until the given time.
    WaitUntil(DateTime<Utc>),
    /// No further autonomous action (`Completed` or `Failed`).
    Terminal,
}

/// Selection rules from, in priority order.
#[must_use]
pub fn next_action(
    item: &MediaItem,
    services: ServiceAvailability,
    streams: StreamAvailability,
    now: DateTime<Utc>,
) -> NextAction {
    // Rule 1: Requested with missing metadata needs indexing first, for any kind.
    if item.state == State::Requested {
        return if services.indexer_enabled {
            NextAction::NextService(ServiceKind::Indexer)
        } else {
            NextAction::Terminal
        };
    }

    // Rule 2: aggregate items never run a service directly once indexed.
    if matches!(item.kind, ItemKind::Show | ItemKind::Season) {
        return NextAction::FanOut;
    }

    // Rule 3: future air date takes priority over stage-based progression.
    if let Some(aired_at) = item.aired_at {
        if aired_at > now && item.state != State::Completed {
            return NextAction::WaitUntil(aired_at);
        }
    }

    // Rule 4: ongoing recheck cadence is computed by the Scheduler (§4.9); the
    // state machine only defers when explicitly marked `Ongoing`.
    if item.state == State::Ongoing {
        return match item.next_air_date {
            Some(at) if at > now => NextAction::WaitUntil(at),
            _ => NextAction::NextService(ServiceKind::Indexer),
        };
    }

    match item.state {
        State::Indexed if services.any_scraper_enabled => {
            NextAction::NextService(ServiceKind::Scraping)
        }
        State::Scraped if streams.has_candidate => {
            NextAction::NextService(ServiceKind::Downloader)
        }
        State::Downloaded => NextAction::NextService(ServiceKind::Symlinker),
        State::Symlinked if services.updater_enabled => {
            NextAction::NextService(ServiceKind::Updater)
        }
        State::Completed if services.post_processor_enabled && !item.post_processed => {
            NextAction::NextService(ServiceKind::PostProcessor)
        }
        State::Completed | State::Failed => NextAction::Terminal,
        _ => NextAction::Terminal,
    }
}

/// Derives a Show's or Season's aggregate state from its children's states:
/// the minimum child state, with `PartiallyCompleted` substituted when some
/// but not all children are `Completed`.
#[must_use]
pub fn aggregate_state(children: &[State]) -> State {
    if children.is_empty() {
        return State::Requested;
    }
    if children.iter().all(|s| *s == State::Completed) {
        return State::Completed;
    }
    if children.iter().any(|s| *s == State::Completed) {
        return State::PartiallyCompleted;
    }
    children
    .iter()
    .copied()
    .min_by_key(|s| s.leaf_ordinal().unwrap_or(u8::MAX))
    .unwrap_or(State::Requested)
}

/// Derives show/season release classification from aired
/// episode data.
#[must_use]
pub const fn derive_show_status(any_episode_aired: bool, has_future_episodes: bool) -> ShowStatus {
    match (any_episode_aired, has_future_episodes) {
        (false, _) => ShowStatus::Unreleased,
        (true, true) => ShowStatus::Ongoing,
        (true, false) => ShowStatus::Ended,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn base_item(state: State, kind: ItemKind) -> MediaItem {
        let now = Utc::now();
        MediaItem {
            id: 1,
            kind,
            parent_id: None,
            imdb_id: None,
            tvdb_id: None,
            tmdb_id: None,
            trakt_id: None,
            title: "x".into(),
            year: None,
            aired_at: None,
            network: None,
            country: None,
            genres: vec![],
            is_anime: false,
            requested_at: now,
            requested_by: "API".into(),
            indexed_at: None,
            scraped_at: None,
            scraped_times: 0,
            symlinked_at: None,
            updated_at: None,
            last_state_at: now,
            state,
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

    fn all_enabled() -> ServiceAvailability {
        ServiceAvailability {
            indexer_enabled: true,
            any_scraper_enabled: true,
            downloader_enabled: true,
            updater_enabled: true,
            post_processor_enabled: true,
        }
    }

    #[test]
    fn requested_goes_to_indexer() {
        let item = base_item(State::Requested, ItemKind::Movie);
        let action = next_action(
            &item,
            all_enabled(),
            StreamAvailability { has_candidate: false },
            Utc::now(),
        );
        assert_eq!(action, NextAction::NextService(ServiceKind::Indexer));
    }

    #[test]
    fn show_fans_out_once_indexed() {
        let item = base_item(State::Indexed, ItemKind::Show);
        let action = next_action(
            &item,
            all_enabled(),
            StreamAvailability { has_candidate: false },
            Utc::now(),
        );
        assert_eq!(action, NextAction::FanOut);
    }

    #[test]
    fn future_air_date_waits() {
        let mut item = base_item(State::Indexed, ItemKind::Episode);
        let future = Utc::now() + Duration::days(10);
        item.aired_at = Some(future);
        let action = next_action(
            &item,
            all_enabled(),
            StreamAvailability { has_candidate: false },
            Utc::now(),
        );
        assert_eq!(action, NextAction::WaitUntil(future));
    }

    #[test]
    fn scraped_without_candidate_waits_terminal_until_new_streams() {
        let item = base_item(State::Scraped, ItemKind::Movie);
        let action = next_action(
            &item,
            all_enabled(),
            StreamAvailability { has_candidate: false },
            Utc::now(),
        );
        assert_eq!(action, NextAction::Terminal);
    }

    #[test]
    fn scraped_with_candidate_goes_to_downloader() {
        let item = base_item(State::Scraped, ItemKind::Movie);
        let action = next_action(
            &item,
            all_enabled(),
            StreamAvailability { has_candidate: true },
            Utc::now(),
        );
        assert_eq!(action, NextAction::NextService(ServiceKind::Downloader));
    }

    #[test]
    fn downloaded_goes_to_symlinker() {
        let item = base_item(State::Downloaded, ItemKind::Movie);
        let action = next_action(
            &item,
            all_enabled(),
            StreamAvailability { has_candidate: false },
            Utc::now(),
        );
        assert_eq!(action, NextAction::NextService(ServiceKind::Symlinker));
    }

    #[test]
    fn completed_with_post_processing_pending_runs_it_once() {
        let mut item = base_item(State::Completed, ItemKind::Movie);
        let action = next_action(
            &item,
            all_enabled(),
            StreamAvailability { has_candidate: false },
            Utc::now(),
        );
        assert_eq!(action, NextAction::NextService(ServiceKind::PostProcessor));

        item.post_processed = true;
        let action = next_action(
            &item,
            all_enabled(),
            StreamAvailability { has_candidate: false },
            Utc::now(),
        );
        assert_eq!(action, NextAction::Terminal);
    }

    #[test]
    fn aggregate_state_is_partially_completed_until_all_children_done() {
        let children = [State::Completed, State::Downloaded, State::Completed];
        assert_eq!(aggregate_state(&children), State::PartiallyCompleted);
    }

    #[test]
    fn aggregate_state_is_completed_when_all_children_completed() {
        let children = [State::Completed, State::Completed];
        assert_eq!(aggregate_state(&children), State::Completed);
    }

    #[test]
    fn aggregate_state_is_minimum_when_none_completed() {
        let children = [State::Scraped, State::Indexed];
        assert_eq!(aggregate_state(&children), State::Indexed);
    }
}
