//! Integration tests against a disposable Postgres instance.
//!
//! Skips (with a message on stderr) when neither `RIVEN_TEST_DATABASE_URL`
//! nor local `initdb`/`postgres`/`pg_isready` binaries are available.

use chrono::Utc;
use riven_core::{BlacklistReason, ItemKind, State};
use riven_store::{ItemPredicate, NewItem, NewStream, Store, TransitionAttributes};
use riven_test_support::postgres::start_postgres;
use sqlx::postgres::PgPoolOptions;

async fn test_store() -> Option<Store> {
    let db = match start_postgres() {
        Ok(db) => db,
        Err(err) => {
            eprintln!("skipping store integration test: {err}");
            return None;
        }
    };
    let pool = PgPoolOptions::new()
    .max_connections(5)
    .connect(db.connection_string())
    .await
    .expect("connect to disposable postgres");
    // Leak the handle for the test's lifetime; the OS reclaims the temp
    // cluster on process exit and `TestDatabase::drop` best-effort cleans up.
    std::mem::forget(db);
    Some(Store::new(pool).await.expect("run migrations"))
}

async fn insert_root_item(store: &Store, title: &str) -> i64 {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO media_item (kind, title, requested_at, requested_by, last_state_at, state)
        VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
    )
    .bind("movie")
    .bind(title)
    .bind(now)
    .bind("API")
    .bind(now)
    .bind("requested")
    .fetch_one(store.pool())
    .await
    .expect("insert root item")
    .get::<i64, _>(0)
}

use sqlx::Row;

#[tokio::test]
async fn load_item_round_trips() {
    let Some(store) = test_store().await else {
        return;
    };
    let id = insert_root_item(&store, "Tron: Legacy").await;

    let (item, children) = store.load_item(id, 0).await.expect("load item");
    assert_eq!(item.title, "Tron: Legacy");
    assert_eq!(item.kind, ItemKind::Movie);
    assert_eq!(item.state, State::Requested);
    assert!(children.is_empty());
}

#[tokio::test]
async fn load_item_missing_is_not_found() {
    let Some(store) = test_store().await else {
        return;
    };
    let err = store.load_item(999_999, 0).await.unwrap_err();
    assert!(matches!(err, riven_store::StoreError::ItemNotFound(999_999)));
}

#[tokio::test]
async fn upsert_streams_dedups_and_skips_blacklisted() {
    let Some(store) = test_store().await else {
        return;
    };
    let id = insert_root_item(&store, "Arrival").await;

    let candidate = NewStream {
        infohash: "a".repeat(40),
        raw_title: "Arrival.2016.1080p".into(),
        parsed_title: "Arrival".into(),
        rank: 10,
        resolution: Some("1080p".into()),
        size_bytes: Some(4_000_000_000),
        seeders: Some(42),
        source_backend: vec!["backend-a".into()],
        cached: true,
    };

    let added = store
    .upsert_streams(id, vec![candidate.clone()])
    .await
    .expect("upsert streams");
    assert_eq!(added.len(), 1);

    store
    .blacklist_stream(id, &candidate.infohash, BlacklistReason::NotCached)
    .await
    .expect("blacklist stream");

    let added_again = store
    .upsert_streams(id, vec![candidate])
    .await
    .expect("upsert after blacklist");
    assert!(added_again.is_empty(), "blacklisted infohash must not be re-added");
}

#[tokio::test]
async fn blacklist_stream_is_idempotent() {
    let Some(store) = test_store().await else {
        return;
    };
    let id = insert_root_item(&store, "Dune").await;
    let infohash = "b".repeat(40);

    store
    .upsert_streams(
        id,
        vec![NewStream {
                infohash: infohash.clone(),
                raw_title: "Dune.2021".into(),
                parsed_title: "Dune".into(),
                rank: 5,
                resolution: None,
                size_bytes: None,
                seeders: None,
                source_backend: vec!["backend-a".into()],
                cached: false,
        }],
    )
    .await
    .expect("upsert stream");

    store
    .blacklist_stream(id, &infohash, BlacklistReason::SizeOutOfBounds)
    .await
    .expect("first blacklist");
    store
    .blacklist_stream(id, &infohash, BlacklistReason::SizeOutOfBounds)
    .await
    .expect("second blacklist must not error");
}

#[tokio::test]
async fn record_transition_updates_state_and_attributes() {
    let Some(store) = test_store().await else {
        return;
    };
    let id = insert_root_item(&store, "The Expanse").await;
    let now = Utc::now();

    store
    .record_transition(
        id,
        State::Symlinked,
        now,
        TransitionAttributes {
            symlinked_at: Some(now),
            symlink_path: Some("/library/movies/The Expanse/the-expanse.mkv".into()),
            ..Default::default()
        },
    )
    .await
    .expect("record transition");

    let (item, _) = store.load_item(id, 0).await.expect("load item");
    assert_eq!(item.state, State::Symlinked);
    assert_eq!(item.symlinked_at, Some(now));
    assert_eq!(
        item.symlink_path.as_deref(),
        Some("/library/movies/The Expanse/the-expanse.mkv")
    );
}

#[tokio::test]
async fn items_needing_retry_due_orders_recent_requests_first() {
    let Some(store) = test_store().await else {
        return;
    };
    let now = Utc::now();
    let old_id = insert_root_item(&store, "Old Request").await;
    let recent_id = insert_root_item(&store, "Recent Request").await;

    sqlx::query("UPDATE media_item SET requested_at = $1 WHERE id = $2")
    .bind(now - chrono::Duration::days(10))
    .bind(old_id)
    .execute(store.pool())
    .await
    .expect("age old request");

    for id in [old_id, recent_id] {
        sqlx::query("UPDATE media_item SET next_retry_at = $1 WHERE id = $2")
        .bind(now)
        .bind(id)
        .execute(store.pool())
        .await
        .expect("set retry due");
    }

    let due = store
    .items_needing(ItemPredicate::RetryDue(now), 10)
    .await
    .expect("items needing retry");
    assert_eq!(due.first().map(|item| item.id), Some(recent_id));
}

fn sample_new_item(title: &str, imdb_id: Option<&str>) -> NewItem {
    NewItem {
        kind: ItemKind::Movie,
        parent_id: None,
        imdb_id: imdb_id.map(str::to_owned),
        tvdb_id: None,
        tmdb_id: None,
        trakt_id: None,
        title: title.to_owned(),
        year: Some(2016),
        aired_at: None,
        network: None,
        country: None,
        genres: vec![],
        is_anime: false,
        requested_by: "API".into(),
        season_number: None,
        episode_number: None,
    }
}

#[tokio::test]
async fn insert_item_dedupes_by_imdb_id() {
    let Some(store) = test_store().await else {
        return;
    };
    let now = Utc::now();

    let first = store
    .insert_item(sample_new_item("Arrival", Some("tt2543164")), now)
    .await
    .expect("insert item");
    let second = store
    .insert_item(sample_new_item("Arrival", Some("tt2543164")), now)
    .await
    .expect("re-admit same imdb id");

    assert_eq!(first, second, "duplicate imdb_id must resolve to the same item");
}

#[tokio::test]
async fn insert_children_creates_rows_bound_to_parent() {
    let Some(store) = test_store().await else {
        return;
    };
    let now = Utc::now();
    let show_id = store
    .insert_item(
        NewItem {
            kind: ItemKind::Show,
            ..sample_new_item("The Expanse", Some("tt3230854"))
        },
        now,
    )
    .await
    .expect("insert show");

    let season = NewItem {
        kind: ItemKind::Season,
        parent_id: Some(show_id),
        ..sample_new_item("Season 1", None)
    };
    let ids = store
    .insert_children(show_id, vec![season], now)
    .await
    .expect("insert children");
    assert_eq!(ids.len(), 1);

    let (child, _) = store.load_item(ids[0], 0).await.expect("load child");
    assert_eq!(child.parent_id, Some(show_id));
    assert_eq!(child.kind, ItemKind::Season);
}

#[tokio::test]
async fn session_lifecycle_open_and_close() {
    let Some(store) = test_store().await else {
        return;
    };
    let id = insert_root_item(&store, "Session Target").await;
    let now = Utc::now();

    let session = store.open_session(id, 600, now).await.expect("open session");
    assert!(!session.is_expired(now));

    store.close_session(session.id).await.expect("close session");
}
