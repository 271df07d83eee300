//! Pipeline Handlers (C8): one async function per `ServiceKind`, each taking
//! the shared `Context` and the item to act on, returning a `PipelineResult`.
//!
//! Handlers never touch `Store::record_transition` themselves — the
//! Dispatcher commits the resulting state transition in a single transaction
//! after a handler returns. A handler may still call through to
//! `StreamRegistry`/`Store` for side effects that are part of the stage
//! itself (registering candidates, blacklisting a rejected stream), since
//! those are the stage's own bookkeeping, not its terminal state transition.

use std::path::Path;

use futures::future::join_all;
use riven_core::{BlacklistReason, MediaItem, PipelineError, PipelineResult};
use riven_services::model::{CacheOutcome, ExternalItemRef, FileSelection, IndexedMetadata};
use riven_store::NewItem;

use crate::context::Context;

/// Terminal outcome of a single Pipeline Handler invocation, consumed by the
/// Dispatcher to build the transition it commits.
#[derive(Debug, Clone)]
pub enum HandlerOutcome {
    /// Indexer resolved metadata and, for Show/Season, created children.
    Indexed {
        /// Resolved metadata, already written to the Store by the handler.
        metadata: IndexedMetadata,
        /// Ids of any children created.
        child_ids: Vec<i64>,
    },
    /// Scraper registered candidates with the Stream Registry.
    Scraped {
        /// Count of candidates actually added to the live set.
        added: usize,
    },
    /// Downloader cached a candidate and selected its file(s).
    Downloaded {
        /// The stream that was bound to the item.
        stream_id: i64,
        /// Selected file.
        selection: FileSelection,
    },
    /// Symlinker created the library symlink.
    Symlinked {
        /// Absolute path of the created symlink.
        path: String,
    },
    /// Updater acknowledged the refresh.
    Updated,
    /// Post-processing ran (success is the only outcome surfaced upward;
    /// failures are logged and swallowed, never propagated as a stage
    /// failure).
    PostProcessed,
}

fn external_ref(item: &MediaItem) -> ExternalItemRef {
    ExternalItemRef {
        kind: item.kind,
        imdb_id: item.imdb_id.clone(),
        tmdb_id: item.tmdb_id.clone(),
        tvdb_id: item.tvdb_id.clone(),
        trakt_id: item.trakt_id.clone(),
        requested_by: item.requested_by.clone(),
        title: Some(item.title.clone()),
        aired_at: item.aired_at,
        season_number: item.season_number,
        episode_number: item.episode_number,
    }
}

fn new_item_for_child(parent: &MediaItem, child_ref: &ExternalItemRef) -> NewItem {
    NewItem {
        kind: child_ref.kind,
        parent_id: Some(parent.id),
        imdb_id: child_ref.imdb_id.clone(),
        tvdb_id: child_ref.tvdb_id.clone(),
        tmdb_id: child_ref.tmdb_id.clone(),
        trakt_id: child_ref.trakt_id.clone(),
        title: child_ref
        .title
        .clone()
        .unwrap_or_else(|| parent.title.clone()),
        year: parent.year,
        aired_at: child_ref.aired_at,
        network: parent.network.clone(),
        country: parent.country.clone(),
        genres: parent.genres.clone(),
        is_anime: parent.is_anime,
        requested_by: parent.requested_by.clone(),
        season_number: child_ref.season_number,
        episode_number: child_ref.episode_number,
    }
}

/// Resolve metadata for `item` and, for Show/Season, create its children.
///
/// # Errors
///
/// Returns `PipelineError::Config` if no indexer is enabled, or whatever the
/// indexer reports otherwise.
pub async fn run_indexer(ctx: &Context, item: &MediaItem) -> PipelineResult<HandlerOutcome> {
    let indexer = ctx
    .services
    .indexer_for(item)
    .ok_or_else(|| PipelineError::Config("no indexer enabled for this item".into()))?;

    ctx.throttle(indexer.name()).await;
    let metadata = indexer
    .index(&external_ref(item))
    .await
    .map_err(|err| classify_service_error(&err))?;

    let update = riven_store::MetadataUpdate {
        title: Some(metadata.title.clone()),
        year: metadata.year,
        aired_at: metadata.aired_at,
        network: metadata.network.clone(),
        country: metadata.country.clone(),
        genres: Some(metadata.genres.clone()),
        show_status: None,
        next_air_date: None,
    };
    ctx.store
    .update_metadata(item.id, update)
    .await
    .map_err(|err| PipelineError::Internal(err.to_string()))?;

    let child_ids = if metadata.children.is_empty() {
        Vec::new()
    } else {
        let children = metadata
        .children
        .iter()
        .map(|child_ref| new_item_for_child(item, child_ref))
        .collect();
        ctx.store
        .insert_children(item.id, children, ctx.now())
        .await
        .map_err(|err| PipelineError::Internal(err.to_string()))?
    };

    Ok(HandlerOutcome::Indexed {
            metadata,
            child_ids,
    })
}

/// Run every enabled, healthy scraper for `item` in parallel, merging their
/// candidates into the Stream Registry's live set.
///
/// # Errors
///
/// Returns `PipelineError::NotAvailableYet` if every scraper call failed or
/// none were enabled.
pub async fn run_scraper(ctx: &Context, item: &MediaItem) -> PipelineResult<HandlerOutcome> {
    let scrapers: Vec<_> = ctx.services.scrapers_for(item).cloned().collect();
    if scrapers.is_empty() {
        return Err(PipelineError::Config("no scraper enabled for this item".into()));
    }

    let calls = scrapers.iter().map(|scraper| {
            let item = item.clone();
            let scraper = scraper.clone();
            async move {
                ctx.throttle(scraper.name()).await;
                scraper.scrape(&item).await
            }
    });
    let results = join_all(calls).await;

    let mut candidates = Vec::new();
    let mut all_failed = true;
    for result in results {
        match result {
            Ok(found) => {
                all_failed = false;
                candidates.extend(found);
            }
            Err(err) => {
                tracing::debug!(item_id = item.id, error = %err, "scraper call failed");
            }
        }
    }

    if all_failed {
        return Err(PipelineError::Transient(
                "every enabled scraper failed".into(),
        ));
    }

    let added = ctx
    .streams
    .register_candidates(item, candidates)
    .await
    .map_err(|err| PipelineError::Internal(err.to_string()))?
    .len();

    Ok(HandlerOutcome::Scraped { added })
}

/// Try the live candidate set, best first, asking enabled downloaders to
/// cache and file-select each; rejects are blacklisted and the next
/// candidate is tried in the same call.
///
/// # Errors
///
/// Returns `PipelineError::NotAvailableYet` once the live set is exhausted,
/// or a `Transient`/`Permanent` error from the downloader itself.
pub async fn run_downloader(ctx: &Context, item: &MediaItem) -> PipelineResult<HandlerOutcome> {
    let downloaders: Vec<_> = ctx.services.downloaders_for(item).cloned().collect();
    if downloaders.is_empty() {
        return Err(PipelineError::Config(
                "no downloader enabled for this item".into(),
        ));
    }

    let mut next = ctx
    .streams
    .select_next_candidate(item.id)
    .await
    .map_err(|err| PipelineError::Internal(err.to_string()))?;

    while let Some(stream) = next {
        let mut rejected = None;
        for downloader in &downloaders {
            ctx.throttle(downloader.name()).await;
            let outcome = match downloader.request_cache(&stream.infohash).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    rejected = Some(classify_service_error(&err));
                    continue;
                }
            };

            match outcome {
                CacheOutcome::NotCached => {
                    rejected = Some(PipelineError::ContentRejected {
                            reason: BlacklistReason::NotCached,
                            detail: format!("{} reported not cached", downloader.name()),
                    });
                }
                CacheOutcome::Cached(files) => {
                    match downloader
                    .select_files(item, &CacheOutcome::Cached(files))
                    .await
                    {
                        Ok(selection) => {
                            ctx.store
                            .set_active_stream(item.id, Some(stream.id))
                            .await
                            .map_err(|err| PipelineError::Internal(err.to_string()))?;
                            return Ok(HandlerOutcome::Downloaded {
                                    stream_id: stream.id,
                                    selection,
                            });
                        }
                        Err(err) => rejected = Some(classify_service_error(&err)),
                    }
                }
            }
        }

        let reason = match rejected {
            Some(PipelineError::ContentRejected { reason,.. }) => reason,
            _ => BlacklistReason::NoMatchingFiles,
        };
        next = ctx
        .streams
        .blacklist_and_reselect(item.id, &stream.infohash, reason)
        .await
        .map_err(|err| PipelineError::Internal(err.to_string()))?;
    }

    Err(PipelineError::NotAvailableYet(
            "live candidate set exhausted".into(),
    ))
}

/// Create the library symlink for a downloaded item.
///
/// # Errors
///
/// Returns `PipelineError::Transient` if the source file is not yet visible
/// after the bounded retry budget, or `Permanent` on an
/// unexpected filesystem error.
pub async fn run_symlinker(ctx: &Context, item: &MediaItem) -> PipelineResult<HandlerOutcome> {
    let file_name = item
    .file_name
    .as_deref()
    .ok_or_else(|| PipelineError::Internal("downloaded item missing file_name".into()))?;
    let folder = item.folder.as_deref();
    let ext = Path::new(file_name)
    .extension()
    .and_then(|ext| ext.to_str())
    .unwrap_or("mkv");

    let (show_title, show_year) = if item.kind == riven_core::ItemKind::Episode {
        let season_id = item
        .parent_id
        .ok_or_else(|| PipelineError::Internal("episode missing parent season".into()))?;
        let (season, _) = ctx
        .store
        .load_item(season_id, 0)
        .await
        .map_err(|err| PipelineError::Internal(err.to_string()))?;
        let show_id = season
        .parent_id
        .ok_or_else(|| PipelineError::Internal("season missing parent show".into()))?;
        let (show, _) = ctx
        .store
        .load_item(show_id, 0)
        .await
        .map_err(|err| PipelineError::Internal(err.to_string()))?;
        (Some(show.title), show.year)
    } else {
        (None, None)
    };

    let dest = crate::fsops::template_for(
        ctx.fsops.library_root(),
        item,
        show_title.as_deref(),
        show_year,
        ext,
    )
    .map_err(|err| PipelineError::Internal(err.to_string()))?;

    let path = ctx
    .fsops
    .create_symlink(folder, file_name, &dest)
    .await
    .map_err(|err| match err {
            crate::fsops::FsopsError::SourceNotVisible {.. } => {
                PipelineError::Transient(err.to_string())
            }
            other => PipelineError::Permanent(other.to_string()),
    })?;

    ctx.store
    .set_active_stream(item.id, None)
    .await
    .map_err(|err| PipelineError::Internal(err.to_string()))?;

    Ok(HandlerOutcome::Symlinked {
            path: path.to_string_lossy().into_owned(),
    })
}

/// Notify the first enabled, healthy updater that the library changed.
///
/// # Errors
///
/// Returns `PipelineError::Transient` if every updater call failed.
pub async fn run_updater(ctx: &Context, item: &MediaItem) -> PipelineResult<HandlerOutcome> {
    let library_path = item
    .symlink_path
    .as_deref()
    .ok_or_else(|| PipelineError::Internal("symlinked item missing symlink_path".into()))?;

    let updaters: Vec<_> = ctx.services.updaters().cloned().collect();
    if updaters.is_empty() {
        return Err(PipelineError::Config("no updater enabled".into()));
    }

    let mut last_err = None;
    for updater in updaters {
        ctx.throttle(updater.name()).await;
        match updater.refresh(library_path).await {
            Ok(()) => return Ok(HandlerOutcome::Updated),
            Err(err) => last_err = Some(classify_service_error(&err)),
        }
    }

    Err(last_err.unwrap_or_else(|| PipelineError::Transient("no updater succeeded".into())))
}

/// Run every enabled post-processor. Failures here are logged and never
/// propagated.
pub async fn run_post_processor(ctx: &Context, item: &MediaItem) -> HandlerOutcome {
    for processor in ctx.services.post_processors() {
        if let Err(err) = processor.process(item).await {
            tracing::warn!(
                item_id = item.id,
                processor = processor.name(),
                error = %err,
                "post-processing failed; continuing without it"
            );
        }
    }
    HandlerOutcome::PostProcessed
}

fn classify_service_error(err: &riven_services::ServiceError) -> PipelineError {
    use riven_services::ServiceError;
    match err {
        ServiceError::Transient(detail) => PipelineError::Transient(detail.clone()),
        ServiceError::Rejected(detail) => PipelineError::ContentRejected {
            reason: BlacklistReason::DownloadDenied,
            detail: detail.clone(),
        },
        ServiceError::Misconfigured(detail) => PipelineError::Config(detail.clone()),
        ServiceError::Unsupported { operation } => {
            PipelineError::Internal(format!("unsupported operation: {operation}"))
        }
    }
}
