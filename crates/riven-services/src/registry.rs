//! Typed handles to external collaborators, keyed by capability (C4).
//!
//! The registry holds whatever adapters were configured at startup. It never
//! performs IO itself — it only answers "is a capability available right
//! now" and, for capabilities with several backends, which one to try first.
//! Concrete adapters are supplied by the embedder; this crate never
//! constructs one itself.

use std::sync::Arc;

use riven_core::MediaItem;

use crate::service::{ContentSource, Downloader, Indexer, PostProcessor, Scraper, Updater};

/// All capability handles the Dispatcher and Pipeline Handlers consult.
///
/// Built once at startup from configuration and held behind an `Arc`; health
/// flags on the individual adapters may change at runtime (e.g. a scraper
/// goes unhealthy after a `Config` error), but the registry's membership is
/// fixed for the process lifetime.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    content_sources: Vec<Arc<dyn ContentSource>>,
    indexers: Vec<Arc<dyn Indexer>>,
    scrapers: Vec<Arc<dyn Scraper>>,
    downloaders: Vec<Arc<dyn Downloader>>,
    updaters: Vec<Arc<dyn Updater>>,
    post_processors: Vec<Arc<dyn PostProcessor>>,
}

impl ServiceRegistry {
    /// Start an empty registry to be populated via the `with_*` builders.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a content source backend.
    #[must_use]
    pub fn with_content_source(mut self, source: Arc<dyn ContentSource>) -> Self {
        self.content_sources.push(source);
        self
    }

    /// Register an indexer backend.
    #[must_use]
    pub fn with_indexer(mut self, indexer: Arc<dyn Indexer>) -> Self {
        self.indexers.push(indexer);
        self
    }

    /// Register a scraper backend. Multiple scrapers run in parallel for the
    /// same item; results are merged by the Stream Registry.
    #[must_use]
    pub fn with_scraper(mut self, scraper: Arc<dyn Scraper>) -> Self {
        self.scrapers.push(scraper);
        self
    }

    /// Register a downloader backend. Selected by priority order among
    /// enabled, healthy backends; first success wins.
    #[must_use]
    pub fn with_downloader(mut self, downloader: Arc<dyn Downloader>) -> Self {
        self.downloaders.push(downloader);
        self
    }

    /// Register an updater backend, selected the same way as downloaders.
    #[must_use]
    pub fn with_updater(mut self, updater: Arc<dyn Updater>) -> Self {
        self.updaters.push(updater);
        self
    }

    /// Register a post-processor backend.
    #[must_use]
    pub fn with_post_processor(mut self, processor: Arc<dyn PostProcessor>) -> Self {
        self.post_processors.push(processor);
        self
    }

    /// Content sources currently enabled and healthy.
    pub fn active_content_sources(&self) -> impl Iterator<Item = &Arc<dyn ContentSource>> {
        self.content_sources.iter().filter(|s| s.enabled() && s.healthy())
    }

    /// Whether any indexer is enabled and healthy.
    #[must_use]
    pub fn indexer_enabled(&self) -> bool {
        self.indexers.iter().any(|s| s.enabled() && s.healthy())
    }

    /// First enabled, healthy indexer that supports `item`.
    #[must_use]
    pub fn indexer_for(&self, item: &MediaItem) -> Option<Arc<dyn Indexer>> {
        self.indexers
        .iter()
        .find(|s| s.enabled() && s.healthy() && s.supported(item))
        .cloned()
    }

    /// Whether at least one scraper is enabled and healthy for `item`.
    #[must_use]
    pub fn any_scraper_enabled(&self, item: &MediaItem) -> bool {
        self.scrapers_for(item).next().is_some()
    }

    /// Every enabled, healthy scraper that supports `item` — all run in
    /// parallel.
    pub fn scrapers_for<'a>(
        &'a self,
        item: &'a MediaItem,
    ) -> impl Iterator<Item = &'a Arc<dyn Scraper>> {
        self.scrapers
        .iter()
        .filter(move |s| s.enabled() && s.healthy() && s.supported(item))
    }

    /// Whether any downloader is enabled and healthy.
    #[must_use]
    pub fn downloader_enabled(&self) -> bool {
        self.downloaders.iter().any(|s| s.enabled() && s.healthy())
    }

    /// Enabled, healthy downloaders in registration (priority) order.
    pub fn downloaders_for<'a>(
        &'a self,
        item: &'a MediaItem,
    ) -> impl Iterator<Item = &'a Arc<dyn Downloader>> {
        self.downloaders
        .iter()
        .filter(move |s| s.enabled() && s.healthy() && s.supported(item))
    }

    /// Whether any updater is enabled and healthy.
    #[must_use]
    pub fn updater_enabled(&self) -> bool {
        self.updaters.iter().any(|s| s.enabled() && s.healthy())
    }

    /// Enabled, healthy updaters in registration (priority) order.
    pub fn updaters(&self) -> impl Iterator<Item = &Arc<dyn Updater>> {
        self.updaters.iter().filter(|s| s.enabled() && s.healthy())
    }

    /// Whether post-processing is enabled at all.
    #[must_use]
    pub fn post_processor_enabled(&self) -> bool {
        self.post_processors.iter().any(|s| s.enabled() && s.healthy())
    }

    /// Enabled, healthy post-processors.
    pub fn post_processors(&self) -> impl Iterator<Item = &Arc<dyn PostProcessor>> {
        self.post_processors.iter().filter(|s| s.enabled() && s.healthy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceResult;
    use crate::model::{CacheOutcome, ExternalItemRef, IndexedMetadata};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    struct StubIndexer {
        enabled: bool,
        healthy: bool,
    }

    #[async_trait]
    impl crate::service::ServiceDescriptor for StubIndexer {
        fn name(&self) -> &str {
            "stub-indexer"
        }
        fn enabled(&self) -> bool {
            self.enabled
        }
        fn healthy(&self) -> bool {
            self.healthy
        }
    }

    #[async_trait]
    impl Indexer for StubIndexer {
        async fn index(&self, _item_ref: &ExternalItemRef) -> ServiceResult<IndexedMetadata> {
            unimplemented!("not exercised in this test")
        }
    }

    struct StubDownloader {
        enabled: bool,
    }

    #[async_trait]
    impl crate::service::ServiceDescriptor for StubDownloader {
        fn name(&self) -> &str {
            "stub-downloader"
        }
        fn enabled(&self) -> bool {
            self.enabled
        }
        fn healthy(&self) -> bool {
            true
        }
    }

    #[async_trait]
    impl Downloader for StubDownloader {
        async fn request_cache(&self, _infohash: &str) -> ServiceResult<CacheOutcome> {
            Ok(CacheOutcome::NotCached)
        }
    }

    fn sample_item() -> MediaItem {
        use riven_core::{ItemKind, State};
        let now: DateTime<Utc> = Utc::now();
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
            state: riven_core::State::Requested,
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
    fn indexer_enabled_ignores_unhealthy_backends() {
        let registry = ServiceRegistry::new().with_indexer(Arc::new(StubIndexer {
                    enabled: true,
                    healthy: false,
        }));
        assert!(!registry.indexer_enabled());
        assert!(registry.indexer_for(&sample_item()).is_none());
    }

    #[test]
    fn downloader_priority_order_is_registration_order() {
        let registry = ServiceRegistry::new()
        .with_downloader(Arc::new(StubDownloader { enabled: false }))
        .with_downloader(Arc::new(StubDownloader { enabled: true }));
        let names: Vec<&str> = registry
        .downloaders_for(&sample_item())
        .map(|d| d.name())
        .collect();
        assert_eq!(names, vec!["stub-downloader"]);
    }
}
