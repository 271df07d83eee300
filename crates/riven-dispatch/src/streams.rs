//! Stream Registry & Ranker glue (C3): turns scraped candidates into ranked,
//! deduplicated `Stream` rows and answers "what should we try next".
//!
//! Title parsing is out of scope (delegated to a pluggable `Ranker`); until
//! a real parser is configured, `raw_title` stands in for `parsed_title`
//! unchanged, matching `FlatRanker`'s identity behaviour.

use std::collections::BTreeSet;
use std::sync::Arc;

use riven_core::ranker::{compare_for_selection, RankContext, Ranker};
use riven_core::{BlacklistReason, MediaItem, Stream};
use riven_services::model::CandidateStream;
use riven_store::{NewStream, Store, StoreResult};

/// Inclusive byte bounds a candidate's `size_bytes` must fall within to be
/// kept, configured separately for movies/episodes.
#[derive(Debug, Clone, Copy)]
pub struct SizeBounds {
    /// Minimum acceptable size in bytes.
    pub min_bytes: i64,
    /// Maximum acceptable size in bytes.
    pub max_bytes: i64,
}

/// Filters applied before ranking.
#[derive(Debug, Clone)]
pub struct StreamFilterConfig {
    /// Size bounds for standalone movies.
    pub movie_size_bounds: SizeBounds,
    /// Size bounds for individual episodes.
    pub episode_size_bounds: SizeBounds,
    /// Allowed resolution tags; empty means no restriction.
    pub allowed_resolutions: Vec<String>,
}

impl StreamFilterConfig {
    fn bounds_for(&self, item: &MediaItem) -> SizeBounds {
        if item.kind.is_leaf() && item.parent_id.is_some() {
            self.episode_size_bounds
        } else {
            self.movie_size_bounds
        }
    }
}

/// Per-item candidate set, ranking, and selection (C3).
#[derive(Clone)]
pub struct StreamRegistry {
    store: Store,
    ranker: Arc<dyn Ranker>,
    filters: StreamFilterConfig,
}

impl StreamRegistry {
    /// Build a registry over `store`, ranking new candidates with `ranker`
    /// under `filters`.
    #[must_use]
    pub fn new(store: Store, ranker: Arc<dyn Ranker>, filters: StreamFilterConfig) -> Self {
        Self {
            store,
            ranker,
            filters,
        }
    }

    fn rank_context(&self, item: &MediaItem) -> RankContext {
        let bounds = self.filters.bounds_for(item);
        RankContext {
            is_adult: item
            .genres
            .iter()
            .any(|genre| genre.eq_ignore_ascii_case("adult")),
            is_anime: item.is_anime,
            min_size_bytes: Some(bounds.min_bytes),
            max_size_bytes: Some(bounds.max_bytes),
            allowed_resolutions: self.filters.allowed_resolutions.clone(),
        }
    }

    /// Rank and register freshly scraped candidates, applying the size/
    /// adult/resolution filters before persisting. Returns the infohashes
    /// actually added to the live set.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` on a database failure.
    pub async fn register_candidates(
        &self,
        item: &MediaItem,
        candidates: Vec<CandidateStream>,
    ) -> StoreResult<BTreeSet<String>> {
        let context = self.rank_context(item);
        let mut kept = Vec::new();
        for candidate in candidates {
            let decision = self.ranker.rank(&candidate.raw_title, &context);
            if !decision.keep {
                continue;
            }
            if let Some(size) = candidate.size_bytes {
                if let Some(min) = context.min_size_bytes {
                    if size < min {
                        continue;
                    }
                }
                if let Some(max) = context.max_size_bytes {
                    if size > max {
                        continue;
                    }
                }
            }

            kept.push(NewStream {
                    infohash: candidate.infohash,
                    parsed_title: candidate.raw_title.clone(),
                    raw_title: candidate.raw_title,
                    rank: decision.rank,
                    resolution: None,
                    size_bytes: candidate.size_bytes,
                    seeders: candidate.seeders,
                    source_backend: vec![candidate.source],
                    cached: false,
            });
        }

        self.store.upsert_streams(item.id, kept).await
    }

    /// The highest-ranked non-blacklisted candidate for an item, or `None`
    /// if the live set is empty.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` on a database failure.
    pub async fn select_next_candidate(&self, item_id: i64) -> StoreResult<Option<Stream>> {
        let streams = self.store.streams_for_item(item_id).await?;
        Ok(streams
            .into_iter()
            .filter(|stream| !stream.blacklisted)
            .max_by(compare_for_selection))
    }

    /// The `k` highest-ranked non-blacklisted candidates, best first.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` on a database failure.
    pub async fn top_k(&self, item_id: i64, k: usize) -> StoreResult<Vec<Stream>> {
        let mut streams: Vec<Stream> = self
        .store
        .streams_for_item(item_id)
        .await?
        .into_iter()
        .filter(|stream| !stream.blacklisted)
        .collect();
        streams.sort_by(|a, b| compare_for_selection(b, a));
        streams.truncate(k);
        Ok(streams)
    }

    /// Move a stream to the blacklist and return the next candidate, if any.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` on a database failure.
    pub async fn blacklist_and_reselect(
        &self,
        item_id: i64,
        infohash: &str,
        reason: BlacklistReason,
    ) -> StoreResult<Option<Stream>> {
        self.store.blacklist_stream(item_id, infohash, reason).await?;
        self.select_next_candidate(item_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use riven_core::ranker::{RankDecision, Ranker};

    struct SizeAwareRanker;

    impl Ranker for SizeAwareRanker {
        fn rank(&self, parsed_title: &str, _context: &RankContext) -> RankDecision {
            RankDecision {
                keep: !parsed_title.contains("cam"),
                rank: i32::try_from(parsed_title.len()).unwrap_or(i32::MAX),
                reasoning: None,
            }
        }
    }

    fn filters() -> StreamFilterConfig {
        StreamFilterConfig {
            movie_size_bounds: SizeBounds {
                min_bytes: 1_000_000_000,
                max_bytes: 80_000_000_000,
            },
            episode_size_bounds: SizeBounds {
                min_bytes: 100_000_000,
                max_bytes: 8_000_000_000,
            },
            allowed_resolutions: vec![],
        }
    }

    #[test]
    fn bounds_for_distinguishes_movies_and_episodes() {
        let config = filters();
        let now = chrono::Utc::now();
        let mut item = MediaItem {
            id: 1,
            kind: riven_core::ItemKind::Movie,
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
            state: riven_core::State::Scraped,
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
        };
        assert_eq!(config.bounds_for(&item).max_bytes, 80_000_000_000);

        item.kind = riven_core::ItemKind::Episode;
        item.parent_id = Some(2);
        assert_eq!(config.bounds_for(&item).max_bytes, 8_000_000_000);
    }
}
