//! DTOs exchanged with external collaborators, independent of the persisted
//! `riven-core` entities they eventually populate.

use chrono::{DateTime, Utc};
use riven_core::ItemKind;
use serde::{Deserialize, Serialize};

/// A reference to an item as known by a `ContentSource`, before it has been
/// admitted into the Store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalItemRef {
    /// Kind the content source believes this to be.
    pub kind: ItemKind,
    /// IMDb id, when available.
    pub imdb_id: Option<String>,
    /// TMDB id, when available.
    pub tmdb_id: Option<String>,
    /// TVDB id, when available.
    pub tvdb_id: Option<String>,
    /// Trakt id, when available.
    pub trakt_id: Option<String>,
    /// Who requested the item (user, list name).
    pub requested_by: String,
    /// Display title, when this ref stands for an Indexer-produced child
    /// (`Season`/`Episode`) rather than a top-level poll result.
    pub title: Option<String>,
    /// Air date, for an `Episode` child.
    pub aired_at: Option<DateTime<Utc>>,
    /// Ordinal season number, for a `Season` or `Episode` child.
    pub season_number: Option<i32>,
    /// Ordinal episode number within its season, for an `Episode` child.
    pub episode_number: Option<i32>,
}

/// Metadata and child references produced by an `Indexer` run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedMetadata {
    /// Resolved display title.
    pub title: String,
    /// Release year, when known.
    pub year: Option<i32>,
    /// Air date, when known.
    pub aired_at: Option<DateTime<Utc>>,
    /// Originating network.
    pub network: Option<String>,
    /// Country of origin.
    pub country: Option<String>,
    /// Genre tags.
    pub genres: Vec<String>,
    /// Children to create (Seasons for a Show, Episodes for a Season).
    pub children: Vec<ExternalItemRef>,
}

/// A release discovered by a `Scraper`, before ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateStream {
    /// 40-character lowercase hex infohash.
    pub infohash: String,
    /// Raw release title as reported by the backend.
    pub raw_title: String,
    /// Name of the scraper backend that produced this candidate.
    pub source: String,
    /// Seeder count, when reported.
    pub seeders: Option<i32>,
    /// Size in bytes, when reported.
    pub size_bytes: Option<i64>,
}

/// Outcome of asking a `Downloader` to cache an infohash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CacheOutcome {
    /// Cached and ready; lists the files available.
    Cached(Vec<CachedFile>),
    /// Not cached and the backend cannot cache it right now.
    NotCached,
}

/// A single file inside a cached torrent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedFile {
    /// Path within the torrent.
    pub path: String,
    /// Size in bytes.
    pub size_bytes: i64,
}

/// Result of a `Downloader::select_files` call: which cached file(s) bind to
/// the item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSelection {
    /// The chosen file.
    pub file: CachedFile,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_outcome_distinguishes_cached_and_not() {
        let not_cached = CacheOutcome::NotCached;
        assert!(matches!(not_cached, CacheOutcome::NotCached));
        let cached = CacheOutcome::Cached(vec![CachedFile {
                    path: "movie.mkv".into(),
                    size_bytes: 42,
        }]);
        assert!(matches!(cached, CacheOutcome::Cached(_)));
    }
}
