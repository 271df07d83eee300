//! Capability traits for external collaborators (C4). Each trait has a
//! minimal required surface; anything beyond that defaults to
//! `ServiceError::Unsupported` so a partial adapter is still usable.

use crate::error::{ServiceError, ServiceResult};
use crate::model::{CacheOutcome, CandidateStream, ExternalItemRef, FileSelection, IndexedMetadata};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use riven_core::MediaItem;

/// Declared capability metadata every backend exposes to the registry,
/// independent of which trait(s) it implements.
pub trait ServiceDescriptor: Send + Sync {
    /// Stable backend name used in logs and configuration.
    fn name(&self) -> &str;
    /// Whether this backend is enabled by configuration.
    fn enabled(&self) -> bool;
    /// Whether this backend last reported healthy.
    fn healthy(&self) -> bool;
    /// Whether this backend supports the given item (e.g. anime-only scraper).
    fn supported(&self, item: &MediaItem) -> bool {
        let _ = item;
        true
    }
}

/// A source of "wanted" items (Overseerr, Trakt, Plex watchlists,...).
#[async_trait]
pub trait ContentSource: ServiceDescriptor {
    /// Poll for items added or changed since `since`.
    async fn poll(&self, since: DateTime<Utc>) -> ServiceResult<Vec<ExternalItemRef>>;
}

/// Resolves metadata for an item and, for Show/Season, its children.
#[async_trait]
pub trait Indexer: ServiceDescriptor {
    /// Index a single external reference.
    async fn index(&self, item_ref: &ExternalItemRef) -> ServiceResult<IndexedMetadata>;
}

/// Discovers candidate releases for an item.
#[async_trait]
pub trait Scraper: ServiceDescriptor {
    /// Scrape candidates for the given item.
    async fn scrape(&self, item: &MediaItem) -> ServiceResult<Vec<CandidateStream>>;
}

/// Caches a candidate release and selects the file(s) that bind to an item.
#[async_trait]
pub trait Downloader: ServiceDescriptor {
    /// Ask the backend to cache an infohash.
    async fn request_cache(&self, infohash: &str) -> ServiceResult<CacheOutcome>;

    /// Select files from a cached set that satisfy the item (movie: largest
    /// video file within bounds; episode: exact S/E match; show pack: map all
    /// episodes). Default implementation reports lack of support so adapters
    /// only need one matching strategy.
    async fn select_files(
        &self,
        _item: &MediaItem,
        _outcome: &CacheOutcome,
    ) -> ServiceResult<FileSelection> {
        Err(ServiceError::Unsupported {
                operation: "select_files",
        })
    }

    /// Request removal/cleanup of a previously cached infohash. Optional.
    async fn release(&self, _infohash: &str) -> ServiceResult<()> {
        Err(ServiceError::Unsupported {
                operation: "release",
        })
    }
}

/// Notifies a media server that a library section changed.
#[async_trait]
pub trait Updater: ServiceDescriptor {
    /// Refresh the library section containing `library_path`.
    async fn refresh(&self, library_path: &str) -> ServiceResult<()>;
}

/// Optional post-processing (subtitles, etc.); failure here is always
/// non-fatal to the pipeline.
#[async_trait]
pub trait PostProcessor: ServiceDescriptor {
    /// Post-process a completed item.
    async fn process(&self, item: &MediaItem) -> ServiceResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubDescriptor {
        name: String,
        enabled: bool,
    }

    #[async_trait]
    impl ServiceDescriptor for StubDescriptor {
        fn name(&self) -> &str {
            &self.name
        }
        fn enabled(&self) -> bool {
            self.enabled
        }
        fn healthy(&self) -> bool {
            true
        }
    }

    struct StubDownloader(StubDescriptor);

    #[async_trait]
    impl ServiceDescriptor for StubDownloader {
        fn name(&self) -> &str {
            self.0.name()
        }
        fn enabled(&self) -> bool {
            self.0.enabled()
        }
        fn healthy(&self) -> bool {
            self.0.healthy()
        }
    }

    #[async_trait]
    impl Downloader for StubDownloader {
        async fn request_cache(&self, _infohash: &str) -> ServiceResult<CacheOutcome> {
            Ok(CacheOutcome::NotCached)
        }
    }

    #[tokio::test]
    async fn select_files_defaults_to_unsupported() {
        let downloader = StubDownloader(StubDescriptor {
                name: "real-debrid".into(),
                enabled: true,
        });
        let item = sample_item();
        let outcome = CacheOutcome::NotCached;
        let result = downloader.select_files(&item, &outcome).await;
        assert!(matches!(result, Err(ServiceError::Unsupported {.. })));
    }

    fn sample_item() -> MediaItem {
        use chrono::Utc;
        use riven_core::{ItemKind, State};
        let now = Utc::now();
        MediaItem {
            id: 1,
            kind: ItemKind::Movie,
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
            state: State::Scraped,
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
}
