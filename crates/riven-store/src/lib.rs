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
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::multiple_crate_versions)]

//! Transactional persistence for media items, streams, blacklists and
//! sessions (C2).
//!
//! Every mutation that touches more than one table runs inside a single
//! serializable transaction (`with_tx`), so the Store, not its callers, owns
//! transactional boundaries.

pub mod error;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use riven_core::{
    BlacklistEntry, BlacklistReason, MediaItem, Session, SessionState, ShowStatus, State, Stream,
};
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

pub use error::{StoreError, StoreResult};

/// Transactional persistence layer for Riven's domain entities.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

/// Predicate describing which items the Scheduler (C9) wants to sweep.
#[derive(Debug, Clone, Copy)]
pub enum ItemPredicate {
    /// Items with `next_retry_at <= now`.
    RetryDue(DateTime<Utc>),
    /// Shows/Seasons flagged `Unreleased` whose `aired_at` has passed.
    UnreleasedDue(DateTime<Utc>),
    /// Shows/Seasons flagged `Ongoing` whose recheck is due.
    OngoingDue(DateTime<Utc>),
}

impl Store {
    /// Initialise the store, applying pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail or the database is unreachable.
    pub async fn new(pool: PgPool) -> StoreResult<Self> {
        let mut migrator = sqlx::migrate!("./migrations");
        migrator.set_ignore_missing(true);
        migrator
        .run(&pool)
        .await
        .map_err(|err| StoreError::Io(sqlx::Error::Migrate(Box::new(err))))?;
        Ok(Self { pool })
    }

    /// Access the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run `f` inside a single serializable transaction; rolls back on error.
    ///
    /// # Errors
    ///
    /// Returns whatever error `f` returns, or a `StoreError::Io` if
    /// beginning/committing/rolling back the transaction fails.
    pub async fn with_tx<T, F>(&self, f: F) -> StoreResult<T>
    where
    T: Send,
    F: for<'c> FnOnce(&'c mut Transaction<'_, Postgres>) -> BoxFuture<'c, StoreResult<T>>
    + Send,
    {
        let mut tx = self.pool.begin().await?;
        match f(&mut tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                let _ = tx.rollback().await;
                Err(err)
            }
        }
    }

    /// Load an item plus, optionally, its child tree up to `depth` levels.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ItemNotFound` if `id` does not exist, or
    /// `StoreError::Io` on a database failure.
    pub async fn load_item(&self, id: i64, depth: u32) -> StoreResult<(MediaItem, Vec<MediaItem>)> {
        let row = sqlx::query(SELECT_ITEM_SQL)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::ItemNotFound(id))?;
        let item = item_from_row(&row)?;

        let mut children = Vec::new();
        if depth > 0 {
            let mut frontier = vec![id];
            for _ in 0..depth {
                if frontier.is_empty() {
                    break;
                }
                let rows = sqlx::query(SELECT_CHILDREN_SQL)
                .bind(&frontier)
                .fetch_all(&self.pool)
                .await?;
                frontier.clear();
                for row in &rows {
                    let child = item_from_row(row)?;
                    frontier.push(child.id);
                    children.push(child);
                }
            }
        }

        Ok((item, children))
    }

    /// Deduplicate and insert candidate streams for an item, rejecting any
    /// infohash already on the item's blacklist. Returns the infohashes
    /// actually added.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` on a database failure.
    pub async fn upsert_streams(
        &self,
        item_id: i64,
        candidates: Vec<NewStream>,
    ) -> StoreResult<BTreeSet<String>> {
        let blacklisted: BTreeSet<String> = sqlx::query(SELECT_BLACKLIST_SQL)
        .bind(item_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| row.get::<String, _>("infohash"))
        .collect();

        let mut added = BTreeSet::new();
        for candidate in candidates {
            if blacklisted.contains(&candidate.infohash) {
                continue;
            }
            sqlx::query(UPSERT_STREAM_SQL)
            .bind(item_id)
            .bind(&candidate.infohash)
            .bind(&candidate.raw_title)
            .bind(&candidate.parsed_title)
            .bind(candidate.rank)
            .bind(&candidate.resolution)
            .bind(candidate.size_bytes)
            .bind(candidate.seeders)
            .bind(&candidate.source_backend)
            .bind(candidate.cached)
            .execute(&self.pool)
            .await?;
            added.insert(candidate.infohash);
        }

        Ok(added)
    }

    /// Atomically delete a stream and record it on the item's blacklist.
    /// A duplicate blacklist entry is treated as already-blacklisted rather
    /// than a hard error.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` on an unexpected database failure.
    pub async fn blacklist_stream(
        &self,
        item_id: i64,
        infohash: &str,
        reason: BlacklistReason,
    ) -> StoreResult<()> {
        self.with_tx(move |tx| {
                let infohash = infohash.to_owned();
                Box::pin(async move {
                        sqlx::query(DELETE_STREAM_SQL)
                        .bind(item_id)
                        .bind(&infohash)
                        .execute(&mut **tx)
                        .await?;

                        let inserted = sqlx::query(INSERT_BLACKLIST_SQL)
                        .bind(item_id)
                        .bind(&infohash)
                        .bind(reason_label(reason))
                        .execute(&mut **tx)
                        .await;

                        match inserted {
                            Ok(_) => Ok(()),
                            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                                tracing::debug!(item_id, infohash, "infohash already blacklisted");
                                Ok(())
                            }
                            Err(err) => Err(StoreError::Io(err)),
                        }
                })
        })
        .await
    }

    /// Return every stream currently in an item's live set (never includes
    /// blacklisted infohashes, per I2/I6), ordered by discovery time.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` on a database failure.
    pub async fn streams_for_item(&self, item_id: i64) -> StoreResult<Vec<Stream>> {
        let rows = sqlx::query(SELECT_STREAMS_FOR_ITEM_SQL)
        .bind(item_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(stream_from_row).collect()
    }

    /// Set or clear the item's active stream.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` on a database failure.
    pub async fn set_active_stream(&self, item_id: i64, stream_id: Option<i64>) -> StoreResult<()> {
        sqlx::query(SET_ACTIVE_STREAM_SQL)
        .bind(stream_id)
        .bind(item_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Update resolved metadata fields produced by an Indexer run. Distinct
    /// from `record_transition` because metadata and lifecycle timestamps are
    /// written from different handlers and may not coincide.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` on a database failure.
    pub async fn update_metadata(&self, item_id: i64, update: MetadataUpdate) -> StoreResult<()> {
        sqlx::query(UPDATE_METADATA_SQL)
        .bind(update.title)
        .bind(update.year)
        .bind(update.aired_at)
        .bind(update.network)
        .bind(update.country)
        .bind(update.genres)
        .bind(update.show_status.map(show_status_label))
        .bind(update.next_air_date)
        .bind(item_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a state transition and the associated lifecycle timestamp.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` on a database failure.
    pub async fn record_transition(
        &self,
        item_id: i64,
        to_state: State,
        at: DateTime<Utc>,
        attributes: TransitionAttributes,
    ) -> StoreResult<()> {
        let state_label = state_label(to_state);
        sqlx::query(RECORD_TRANSITION_SQL)
        .bind(state_label)
        .bind(at)
        .bind(attributes.indexed_at)
        .bind(attributes.scraped_at)
        .bind(attributes.symlinked_at)
        .bind(attributes.updated_at)
        .bind(attributes.file_name)
        .bind(attributes.folder)
        .bind(attributes.file_size)
        .bind(attributes.symlink_path)
        .bind(attributes.failed_attempts)
        .bind(attributes.next_retry_at)
        .bind(attributes.scraped_times)
        .bind(item_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Return up to `limit` items matching `predicate`, ordered by
    /// `(priority, last_state_at)` where priority boosts items requested in
    /// the last 24h.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` on a database failure.
    pub async fn items_needing(
        &self,
        predicate: ItemPredicate,
        limit: i64,
    ) -> StoreResult<Vec<MediaItem>> {
        let (sql, bound_at) = match predicate {
            ItemPredicate::RetryDue(now) => (SELECT_RETRY_DUE_SQL, now),
            ItemPredicate::UnreleasedDue(now) => (SELECT_UNRELEASED_DUE_SQL, now),
            ItemPredicate::OngoingDue(now) => (SELECT_ONGOING_DUE_SQL, now),
        };
        let rows = sqlx::query(sql)
        .bind(bound_at)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(item_from_row).collect()
    }

    /// Admit a new root item (C1 content-source ingestion), deduplicating on
    /// `imdb_id` when present. Returns the existing id without modification if
    /// an item with the same `imdb_id` is already tracked.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` on a database failure.
    pub async fn insert_item(&self, new: NewItem, now: DateTime<Utc>) -> StoreResult<i64> {
        let inserted: Option<i64> = sqlx::query_scalar(INSERT_ITEM_SQL)
        .bind(kind_label(new.kind))
        .bind(new.parent_id)
        .bind(&new.imdb_id)
        .bind(&new.tvdb_id)
        .bind(&new.tmdb_id)
        .bind(&new.trakt_id)
        .bind(&new.title)
        .bind(new.year)
        .bind(new.aired_at)
        .bind(&new.network)
        .bind(&new.country)
        .bind(&new.genres)
        .bind(new.is_anime)
        .bind(now)
        .bind(&new.requested_by)
        .bind(new.season_number)
        .bind(new.episode_number)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(id) => Ok(id),
            None => {
                let existing: i64 = sqlx::query_scalar(SELECT_ITEM_BY_IMDB_SQL)
                .bind(&new.imdb_id)
                .fetch_one(&self.pool)
                .await?;
                Ok(existing)
            }
        }
    }

    /// Create every child (Seasons for a Show, Episodes for a Season) produced
    /// by an `Indexer` run, in one transaction. Returns the created ids in
    /// the same order as `children`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` on a database failure.
    pub async fn insert_children(
        &self,
        parent_id: i64,
        children: Vec<NewItem>,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<i64>> {
        self.with_tx(move |tx| {
                Box::pin(async move {
                        let mut ids = Vec::with_capacity(children.len());
                        for mut child in children {
                            child.parent_id = Some(parent_id);
                            let id: i64 = sqlx::query_scalar(INSERT_CHILD_SQL)
                            .bind(kind_label(child.kind))
                            .bind(child.parent_id)
                            .bind(&child.imdb_id)
                            .bind(&child.tvdb_id)
                            .bind(&child.tmdb_id)
                            .bind(&child.trakt_id)
                            .bind(&child.title)
                            .bind(child.year)
                            .bind(child.aired_at)
                            .bind(&child.network)
                            .bind(&child.country)
                            .bind(&child.genres)
                            .bind(child.is_anime)
                            .bind(now)
                            .bind(&child.requested_by)
                            .bind(child.season_number)
                            .bind(child.episode_number)
                            .fetch_one(&mut **tx)
                            .await?;
                            ids.push(id);
                        }
                        Ok(ids)
                })
        })
        .await
    }

    /// Open a manual override session for an item (C10).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` on a database failure.
    pub async fn open_session(&self, item_id: i64, ttl_seconds: i64, now: DateTime<Utc>) -> StoreResult<Session> {
        let id = Uuid::new_v4();
        let expires_at = now + chrono::Duration::seconds(ttl_seconds);
        sqlx::query(INSERT_SESSION_SQL)
        .bind(id)
        .bind(item_id)
        .bind(now)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(Session {
                id,
                item_id,
                created_at: now,
                expires_at,
                selected_stream_id: None,
                selected_files: vec![],
                state: SessionState::Open,
        })
    }

    /// Close a session (committed, cancelled, or expired).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` on a database failure.
    pub async fn close_session(&self, session_id: Uuid) -> StoreResult<()> {
        sqlx::query(CLOSE_SESSION_SQL)
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Load a session by id.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` on a database failure or if the session does
    /// not exist.
    pub async fn load_session(&self, session_id: Uuid) -> StoreResult<Session> {
        let row = sqlx::query(SELECT_SESSION_SQL)
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::Conflict(format!("session {session_id} not found")))?;
        session_from_row(&row)
    }

    /// Record the user's stream selection for an open session (C10).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` on a database failure.
    pub async fn set_session_stream(
        &self,
        session_id: Uuid,
        stream_id: i64,
    ) -> StoreResult<()> {
        sqlx::query(SET_SESSION_STREAM_SQL)
        .bind(stream_id)
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record the user's file selection for an open session (C10).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` on a database failure.
    pub async fn set_session_files(
        &self,
        session_id: Uuid,
        files: Vec<String>,
    ) -> StoreResult<()> {
        sqlx::query(SET_SESSION_FILES_SQL)
        .bind(files)
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Transition a session's state (e.g. `Open` -> `Committing` -> `Closed`).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` on a database failure.
    pub async fn set_session_state(
        &self,
        session_id: Uuid,
        state: SessionState,
    ) -> StoreResult<()> {
        sqlx::query(SET_SESSION_STATE_SQL)
        .bind(session_state_label(state))
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Every still-open session whose `expires_at` has passed (Scheduler
    /// sweep, "expired sessions are closed").
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` on a database failure.
    pub async fn expired_sessions(&self, now: DateTime<Utc>) -> StoreResult<Vec<Session>> {
        let rows = sqlx::query(SELECT_EXPIRED_SESSIONS_SQL)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(session_from_row).collect()
    }

    /// Mark an item's post-processing stage as complete (rule 9's "not yet
    /// done" guard).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` on a database failure.
    pub async fn mark_post_processed(&self, item_id: i64) -> StoreResult<()> {
        sqlx::query(MARK_POST_PROCESSED_SQL)
        .bind(item_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// A candidate stream awaiting dedup/insertion via `upsert_streams`.
#[derive(Debug, Clone)]
pub struct NewStream {
    /// 40-character lowercase hex infohash.
    pub infohash: String,
    /// Raw release title.
    pub raw_title: String,
    /// Parsed title.
    pub parsed_title: String,
    /// Ranker-assigned rank.
    pub rank: i32,
    /// Resolution tag.
    pub resolution: Option<String>,
    /// Size in bytes.
    pub size_bytes: Option<i64>,
    /// Seeder count.
    pub seeders: Option<i32>,
    /// Scraper backend that produced this candidate.
    pub source_backend: Vec<String>,
    /// Whether the backend reported this as instantly cached.
    pub cached: bool,
}

/// Fields needed to admit a new root item or create a child produced by
/// indexing (C1, C8 Indexer handler).
#[derive(Debug, Clone)]
pub struct NewItem {
    /// Kind of item to create.
    pub kind: riven_core::ItemKind,
    /// Parent id for Season/Episode; `None` for a root Movie/Show.
    pub parent_id: Option<i64>,
    /// External IMDb id, when known.
    pub imdb_id: Option<String>,
    /// External TheTVDB id, when known.
    pub tvdb_id: Option<String>,
    /// External TheMovieDB id, when known.
    pub tmdb_id: Option<String>,
    /// External Trakt id, when known.
    pub trakt_id: Option<String>,
    /// Display title.
    pub title: String,
    /// Release year, when known.
    pub year: Option<i32>,
    /// Air date, when known.
    pub aired_at: Option<DateTime<Utc>>,
    /// Originating network, when known.
    pub network: Option<String>,
    /// Country of origin, when known.
    pub country: Option<String>,
    /// Genre tags.
    pub genres: Vec<String>,
    /// Whether this item is anime.
    pub is_anime: bool,
    /// Who/what requested the item.
    pub requested_by: String,
    /// Ordinal season number, for a `Season` or `Episode`.
    pub season_number: Option<i32>,
    /// Ordinal episode number within its season, for an `Episode`.
    pub episode_number: Option<i32>,
}

/// Metadata fields written by the Indexer handler (C8). Only non-`None`
/// fields are applied; others are left unchanged via `COALESCE`.
#[derive(Debug, Clone, Default)]
pub struct MetadataUpdate {
    /// Resolved display title.
    pub title: Option<String>,
    /// Release year.
    pub year: Option<i32>,
    /// Air date.
    pub aired_at: Option<DateTime<Utc>>,
    /// Originating network.
    pub network: Option<String>,
    /// Country of origin.
    pub country: Option<String>,
    /// Genre tags.
    pub genres: Option<Vec<String>>,
    /// Derived show/season release classification.
    pub show_status: Option<ShowStatus>,
    /// Next known air date, for Show/Season.
    pub next_air_date: Option<DateTime<Utc>>,
}

/// Attributes written alongside a state transition. Only the fields relevant
/// to the new state need be set; others are left unchanged via `COALESCE`.
#[derive(Debug, Clone, Default)]
pub struct TransitionAttributes {
    /// New `indexed_at`, if this transition is an indexing result.
    pub indexed_at: Option<DateTime<Utc>>,
    /// New `scraped_at`, if this transition is a scrape result.
    pub scraped_at: Option<DateTime<Utc>>,
    /// New `symlinked_at`, if this transition created a symlink.
    pub symlinked_at: Option<DateTime<Utc>>,
    /// New `updated_at`, if the media server acknowledged the item.
    pub updated_at: Option<DateTime<Utc>>,
    /// Resolved file name, for Downloaded.
    pub file_name: Option<String>,
    /// Resolved folder, for Downloaded.
    pub folder: Option<String>,
    /// Resolved file size, for Downloaded.
    pub file_size: Option<i64>,
    /// Created symlink path, for Symlinked.
    pub symlink_path: Option<String>,
    /// Updated failed-attempt counter.
    pub failed_attempts: Option<i32>,
    /// Updated next retry time.
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Updated scrape attempt counter.
    pub scraped_times: Option<i32>,
}

const SELECT_ITEM_SQL: &str = "SELECT * FROM media_item WHERE id = $1";
const SELECT_CHILDREN_SQL: &str = "SELECT * FROM media_item WHERE parent_id = ANY($1)";
const SELECT_BLACKLIST_SQL: &str =
"SELECT infohash FROM blacklist_entry WHERE item_id = $1";
const SELECT_STREAMS_FOR_ITEM_SQL: &str =
"SELECT * FROM stream WHERE item_id = $1 ORDER BY discovered_at";
const UPSERT_STREAM_SQL: &str = r"
INSERT INTO stream (
    item_id, infohash, raw_title, parsed_title, rank, resolution,
    size_bytes, seeders, source_backend, cached
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
ON CONFLICT (item_id, infohash) DO UPDATE
SET
source_backend = (
    SELECT ARRAY(
        SELECT DISTINCT unnest(stream.source_backend || EXCLUDED.source_backend)
    )
),
cached = EXCLUDED.cached OR stream.cached
";
const INSERT_ITEM_SQL: &str = r"
INSERT INTO media_item (
    kind, parent_id, imdb_id, tvdb_id, tmdb_id, trakt_id, title, year,
    aired_at, network, country, genres, is_anime, requested_at,
    last_state_at, requested_by, season_number, episode_number, state
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $14, $15, $16, $17, 'requested')
ON CONFLICT (imdb_id) WHERE imdb_id IS NOT NULL DO NOTHING
RETURNING id
";
const SELECT_ITEM_BY_IMDB_SQL: &str = "SELECT id FROM media_item WHERE imdb_id = $1";
const INSERT_CHILD_SQL: &str = r"
INSERT INTO media_item (
    kind, parent_id, imdb_id, tvdb_id, tmdb_id, trakt_id, title, year,
    aired_at, network, country, genres, is_anime, requested_at,
    last_state_at, requested_by, season_number, episode_number, state
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $14, $15, $16, $17, 'requested')
RETURNING id
";
const DELETE_STREAM_SQL: &str = "DELETE FROM stream WHERE item_id = $1 AND infohash = $2";
const INSERT_BLACKLIST_SQL: &str = r"
INSERT INTO blacklist_entry (item_id, infohash, reason)
VALUES ($1, $2, $3)
";
const SET_ACTIVE_STREAM_SQL: &str =
"UPDATE media_item SET active_stream_id = $1 WHERE id = $2";
const UPDATE_METADATA_SQL: &str = r"
UPDATE media_item
SET
title = COALESCE($1, title),
year = COALESCE($2, year),
aired_at = COALESCE($3, aired_at),
network = COALESCE($4, network),
country = COALESCE($5, country),
genres = COALESCE($6, genres),
show_status = COALESCE($7, show_status),
next_air_date = COALESCE($8, next_air_date)
WHERE id = $9
";
const RECORD_TRANSITION_SQL: &str = r"
UPDATE media_item
SET
state = $1,
last_state_at = $2,
indexed_at = COALESCE($3, indexed_at),
scraped_at = COALESCE($4, scraped_at),
symlinked_at = COALESCE($5, symlinked_at),
updated_at = COALESCE($6, updated_at),
file_name = COALESCE($7, file_name),
folder = COALESCE($8, folder),
file_size = COALESCE($9, file_size),
symlink_path = COALESCE($10, symlink_path),
failed_attempts = COALESCE($11, failed_attempts),
next_retry_at = $12,
scraped_times = COALESCE($13, scraped_times)
WHERE id = $14
";
const SELECT_RETRY_DUE_SQL: &str = r"
SELECT *, (CASE WHEN requested_at >= now() - interval '24 hours' THEN 0 ELSE 1 END) AS priority
FROM media_item
WHERE next_retry_at IS NOT NULL AND next_retry_at <= $1
ORDER BY priority, last_state_at
LIMIT $2
";
const SELECT_UNRELEASED_DUE_SQL: &str = r"
SELECT *, (CASE WHEN requested_at >= now() - interval '24 hours' THEN 0 ELSE 1 END) AS priority
FROM media_item
WHERE show_status = 'unreleased' AND aired_at IS NOT NULL AND aired_at <= $1
ORDER BY priority, last_state_at
LIMIT $2
";
const SELECT_ONGOING_DUE_SQL: &str = r"
SELECT *, (CASE WHEN requested_at >= now() - interval '24 hours' THEN 0 ELSE 1 END) AS priority
FROM media_item
WHERE show_status = 'ongoing' AND (next_air_date IS NULL OR next_air_date <= $1)
ORDER BY priority, last_state_at
LIMIT $2
";
const INSERT_SESSION_SQL: &str = r"
INSERT INTO session (id, item_id, created_at, expires_at)
VALUES ($1, $2, $3, $4)
";
const CLOSE_SESSION_SQL: &str = "UPDATE session SET state = 'closed' WHERE id = $1";
const SELECT_SESSION_SQL: &str = "SELECT * FROM session WHERE id = $1";
const SET_SESSION_STREAM_SQL: &str =
"UPDATE session SET selected_stream_id = $1 WHERE id = $2";
const SET_SESSION_FILES_SQL: &str = "UPDATE session SET selected_files = $1 WHERE id = $2";
const SET_SESSION_STATE_SQL: &str = "UPDATE session SET state = $1 WHERE id = $2";
const SELECT_EXPIRED_SESSIONS_SQL: &str =
"SELECT * FROM session WHERE state != 'closed' AND expires_at <= $1";
const MARK_POST_PROCESSED_SQL: &str =
"UPDATE media_item SET post_processed = TRUE WHERE id = $1";

fn kind_label(kind: riven_core::ItemKind) -> &'static str {
    match kind {
        riven_core::ItemKind::Movie => "movie",
        riven_core::ItemKind::Show => "show",
        riven_core::ItemKind::Season => "season",
        riven_core::ItemKind::Episode => "episode",
    }
}

fn state_label(state: State) -> &'static str {
    state.as_str()
}

fn state_from_label(label: &str) -> State {
    match label {
        "requested" => State::Requested,
        "indexed" => State::Indexed,
        "scraped" => State::Scraped,
        "downloaded" => State::Downloaded,
        "symlinked" => State::Symlinked,
        "completed" => State::Completed,
        "unreleased" => State::Unreleased,
        "ongoing" => State::Ongoing,
        "partially_completed" => State::PartiallyCompleted,
        "failed" => State::Failed,
        _ => State::Paused,
    }
}

fn reason_label(reason: BlacklistReason) -> &'static str {
    match reason {
        BlacklistReason::NotCached => "not_cached",
        BlacklistReason::NoMatchingFiles => "no_matching_files",
        BlacklistReason::SizeOutOfBounds => "size_out_of_bounds",
        BlacklistReason::WrongSeason => "wrong_season",
        BlacklistReason::WrongEpisode => "wrong_episode",
        BlacklistReason::AdultRejected => "adult_rejected",
        BlacklistReason::DownloadDenied => "download_denied",
        BlacklistReason::UnusableArchive => "unusable_archive",
    }
}

fn show_status_label(status: ShowStatus) -> &'static str {
    match status {
        ShowStatus::Unreleased => "unreleased",
        ShowStatus::Ongoing => "ongoing",
        ShowStatus::Ended => "ended",
        ShowStatus::Unknown => "unknown",
    }
}

fn show_status_from_label(label: &str) -> ShowStatus {
    match label {
        "unreleased" => ShowStatus::Unreleased,
        "ongoing" => ShowStatus::Ongoing,
        "ended" => ShowStatus::Ended,
        _ => ShowStatus::Unknown,
    }
}

fn session_state_label(state: SessionState) -> &'static str {
    match state {
        SessionState::Open => "open",
        SessionState::Committing => "committing",
        SessionState::Closed => "closed",
    }
}

fn session_state_from_label(label: &str) -> SessionState {
    match label {
        "open" => SessionState::Open,
        "committing" => SessionState::Committing,
        _ => SessionState::Closed,
    }
}

/// Reconstruct a `Session` row.
///
/// # Errors
///
/// Returns `StoreError::Io` if a column is missing or of the wrong type.
pub fn session_from_row(row: &sqlx::postgres::PgRow) -> StoreResult<Session> {
    let state_label: String = row.try_get("state")?;
    Ok(Session {
            id: row.try_get("id")?,
            item_id: row.try_get("item_id")?,
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
            selected_stream_id: row.try_get("selected_stream_id")?,
            selected_files: row.try_get("selected_files")?,
            state: session_state_from_label(&state_label),
    })
}

fn item_from_row(row: &sqlx::postgres::PgRow) -> StoreResult<MediaItem> {
    let kind_label: String = row.try_get("kind")?;
    let kind = match kind_label.as_str() {
        "movie" => riven_core::ItemKind::Movie,
        "show" => riven_core::ItemKind::Show,
        "season" => riven_core::ItemKind::Season,
        _ => riven_core::ItemKind::Episode,
    };
    let state_label: String = row.try_get("state")?;
    let show_status_label: Option<String> = row.try_get("show_status")?;

    Ok(MediaItem {
            id: row.try_get("id")?,
            kind,
            parent_id: row.try_get("parent_id")?,
            imdb_id: row.try_get("imdb_id")?,
            tvdb_id: row.try_get("tvdb_id")?,
            tmdb_id: row.try_get("tmdb_id")?,
            trakt_id: row.try_get("trakt_id")?,
            title: row.try_get("title")?,
            year: row.try_get("year")?,
            aired_at: row.try_get("aired_at")?,
            network: row.try_get("network")?,
            country: row.try_get("country")?,
            genres: row.try_get("genres")?,
            is_anime: row.try_get("is_anime")?,
            requested_at: row.try_get("requested_at")?,
            requested_by: row.try_get("requested_by")?,
            indexed_at: row.try_get("indexed_at")?,
            scraped_at: row.try_get("scraped_at")?,
            scraped_times: row.try_get("scraped_times")?,
            symlinked_at: row.try_get("symlinked_at")?,
            updated_at: row.try_get("updated_at")?,
            last_state_at: row.try_get("last_state_at")?,
            state: state_from_label(&state_label),
            failed_attempts: row.try_get("failed_attempts")?,
            next_retry_at: row.try_get("next_retry_at")?,
            file_name: row.try_get("file_name")?,
            folder: row.try_get("folder")?,
            file_size: row.try_get("file_size")?,
            symlink_path: row.try_get("symlink_path")?,
            show_status: show_status_label.as_deref().map(show_status_from_label),
            next_air_date: row.try_get("next_air_date")?,
            active_stream_id: row.try_get("active_stream_id")?,
            post_processed: row.try_get("post_processed")?,
            season_number: row.try_get("season_number")?,
            episode_number: row.try_get("episode_number")?,
    })
}

/// Reconstruct a `Stream` row, exposed for callers that query streams
/// directly rather than through `upsert_streams`.
///
/// # Errors
///
/// Returns `StoreError::Io` if a column is missing or of the wrong type.
pub fn stream_from_row(row: &sqlx::postgres::PgRow) -> StoreResult<Stream> {
    let blacklist_reason: Option<String> = row.try_get("blacklist_reason")?;
    let sources: Vec<String> = row.try_get("source_backend")?;
    Ok(Stream {
            id: row.try_get("id")?,
            item_id: row.try_get("item_id")?,
            infohash: row.try_get("infohash")?,
            raw_title: row.try_get("raw_title")?,
            parsed_title: row.try_get("parsed_title")?,
            rank: row.try_get("rank")?,
            resolution: row.try_get("resolution")?,
            size_bytes: row.try_get("size_bytes")?,
            seeders: row.try_get("seeders")?,
            source_backend: sources.into_iter().collect(),
            cached: row.try_get("cached")?,
            blacklisted: row.try_get("blacklisted")?,
            discovered_at: row.try_get("discovered_at")?,
            blacklist_reason: blacklist_reason.as_deref().map(|label| match label {
                    "not_cached" => BlacklistReason::NotCached,
                    "no_matching_files" => BlacklistReason::NoMatchingFiles,
                    "size_out_of_bounds" => BlacklistReason::SizeOutOfBounds,
                    "wrong_season" => BlacklistReason::WrongSeason,
                    "wrong_episode" => BlacklistReason::WrongEpisode,
                    "adult_rejected" => BlacklistReason::AdultRejected,
                    "download_denied" => BlacklistReason::DownloadDenied,
                    _ => BlacklistReason::UnusableArchive,
            }),
    })
}

/// Reconstruct a `BlacklistEntry` row.
///
/// # Errors
///
/// Returns `StoreError::Io` if a column is missing or of the wrong type.
pub fn blacklist_entry_from_row(row: &sqlx::postgres::PgRow) -> StoreResult<BlacklistEntry> {
    let reason_label: String = row.try_get("reason")?;
    Ok(BlacklistEntry {
            item_id: row.try_get("item_id")?,
            infohash: row.try_get("infohash")?,
            reason: match reason_label.as_str() {
                "not_cached" => BlacklistReason::NotCached,
                "no_matching_files" => BlacklistReason::NoMatchingFiles,
                "size_out_of_bounds" => BlacklistReason::SizeOutOfBounds,
                "wrong_season" => BlacklistReason::WrongSeason,
                "wrong_episode" => BlacklistReason::WrongEpisode,
                "adult_rejected" => BlacklistReason::AdultRejected,
                "download_denied" => BlacklistReason::DownloadDenied,
                _ => BlacklistReason::UnusableArchive,
            },
            blacklisted_at: row.try_get("blacklisted_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_label_round_trips() {
        let states = [
            State::Requested,
            State::Indexed,
            State::Scraped,
            State::Downloaded,
            State::Symlinked,
            State::Completed,
            State::Unreleased,
            State::Ongoing,
            State::PartiallyCompleted,
            State::Failed,
        ];
        for state in states {
            assert_eq!(state_from_label(state_label(state)), state);
        }
    }

    #[test]
    fn reason_label_round_trips() {
        let reasons = [
            BlacklistReason::NotCached,
            BlacklistReason::NoMatchingFiles,
            BlacklistReason::SizeOutOfBounds,
            BlacklistReason::WrongSeason,
            BlacklistReason::WrongEpisode,
            BlacklistReason::AdultRejected,
            BlacklistReason::DownloadDenied,
            BlacklistReason::UnusableArchive,
        ];
        for reason in reasons {
            let label = reason_label(reason);
            let restored = match label {
                "not_cached" => BlacklistReason::NotCached,
                "no_matching_files" => BlacklistReason::NoMatchingFiles,
                "size_out_of_bounds" => BlacklistReason::SizeOutOfBounds,
                "wrong_season" => BlacklistReason::WrongSeason,
                "wrong_episode" => BlacklistReason::WrongEpisode,
                "adult_rejected" => BlacklistReason::AdultRejected,
                "download_denied" => BlacklistReason::DownloadDenied,
                _ => BlacklistReason::UnusableArchive,
            };
            assert_eq!(restored, reason);
        }
    }
}
