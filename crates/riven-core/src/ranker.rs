//! Pluggable stream ranking contract (C3) and tie-break ordering.
//!
//! Release-name parsing and the ranking math itself live outside this
//! crate; only the plug-in point and the tie-break rule that applies once
//! two streams carry equal `rank` are specified here.

use crate::model::Stream;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Context passed to a `Ranker` alongside the parsed title.
#[derive(Debug, Clone)]
pub struct RankContext {
    /// Whether the owning item is flagged adult content.
    pub is_adult: bool,
    /// Whether the owning item is anime.
    pub is_anime: bool,
    /// Minimum acceptable file size in bytes, if bounded.
    pub min_size_bytes: Option<i64>,
    /// Maximum acceptable file size in bytes, if bounded.
    pub max_size_bytes: Option<i64>,
    /// Allowed resolutions; empty means no restriction.
    pub allowed_resolutions: Vec<String>,
}

/// Outcome of ranking a single parsed release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankDecision {
    /// Whether the release should be kept at all.
    pub keep: bool,
    /// Assigned rank; higher is better. Meaningless when `keep` is false.
    pub rank: i32,
    /// Optional human-readable rationale for logs/debugging.
    pub reasoning: Option<String>,
}

/// A pluggable ranking strategy. Concrete rankers (title parsing, resolution
/// scoring, language heuristics) are supplied by the operator; this crate
/// only depends on the trait.
pub trait Ranker: Send + Sync {
    /// Rank a single parsed title under the given context.
    fn rank(&self, parsed_title: &str, context: &RankContext) -> RankDecision;
}

/// A ranker that keeps everything at a flat rank, used as a default before
/// any real ranker is configured and in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlatRanker;

impl Ranker for FlatRanker {
    fn rank(&self, _parsed_title: &str, _context: &RankContext) -> RankDecision {
        RankDecision {
            keep: true,
            rank: 0,
            reasoning: None,
        }
    }
}

/// Ordering key for stream selection: higher `rank`, then higher `seeders`,
/// then larger `size_bytes`, then most recently discovered.
#[must_use]
pub fn compare_for_selection(a: &Stream, b: &Stream) -> Ordering {
    a.rank
    .cmp(&b.rank)
    .then_with(|| a.seeders.unwrap_or(0).cmp(&b.seeders.unwrap_or(0)))
    .then_with(|| a.size_bytes.unwrap_or(0).cmp(&b.size_bytes.unwrap_or(0)))
    .then_with(|| a.discovered_at.cmp(&b.discovered_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn stream(rank: i32, seeders: i32, size: i64) -> Stream {
        Stream {
            id: 1,
            item_id: 1,
            infohash: "a".repeat(40),
            raw_title: "x".into(),
            parsed_title: "x".into(),
            rank,
            resolution: None,
            size_bytes: Some(size),
            seeders: Some(seeders),
            source_backend: BTreeSet::new(),
            cached: false,
            blacklisted: false,
            blacklist_reason: None,
            discovered_at: Utc::now(),
        }
    }

    #[test]
    fn higher_rank_wins() {
        let low = stream(1, 100, 100);
        let high = stream(5, 1, 1);
        assert_eq!(compare_for_selection(&high, &low), Ordering::Greater);
    }

    #[test]
    fn equal_rank_breaks_on_seeders_then_size() {
        let a = stream(1, 10, 1000);
        let b = stream(1, 5, 2000);
        assert_eq!(compare_for_selection(&a, &b), Ordering::Greater);
    }

    #[test]
    fn full_tie_breaks_on_discovery_time() {
        let mut a = stream(1, 10, 1000);
        let mut b = stream(1, 10, 1000);
        a.discovered_at = Utc::now();
        b.discovered_at = a.discovered_at + chrono::Duration::seconds(5);
        assert_eq!(compare_for_selection(&a, &b), Ordering::Less);
    }
}
