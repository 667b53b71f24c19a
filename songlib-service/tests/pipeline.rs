//! End-to-end ingestion pipeline tests
//!
//! Wires the real consumer manager, ingestion handlers, dual-tier cache and
//! catalog service against the in-process queue backend, an in-memory cache
//! store, and a file-backed SQLite database.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use songlib_common::cache::{CacheProvider, MemoryStore};
use songlib_common::consumer::ConsumerManager;
use songlib_common::models::{AddSongRequest, DeleteSongRequest, SongDetail, UpdateSongRequest};
use songlib_common::queue::{MemoryQueue, QueueClient};
use songlib_service::db;
use songlib_service::db::songs::{self, NewSong};
use songlib_service::services::catalog::CatalogService;
use songlib_service::services::enrichment::{EnrichmentClient, EnrichmentError, EnrichmentPolicy};
use songlib_service::services::ingest::{self, IngestContext};

/// Enrichment double: replays a script, then answers with a fixed detail
struct ScriptedEnricher {
    script: Mutex<VecDeque<Result<SongDetail, EnrichmentError>>>,
    calls: AtomicUsize,
}

impl ScriptedEnricher {
    fn new(script: Vec<Result<SongDetail, EnrichmentError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EnrichmentClient for ScriptedEnricher {
    async fn song_detail(&self, _group: &str, _song: &str) -> Result<SongDetail, EnrichmentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(sample_detail()))
    }
}

fn sample_detail() -> SongDetail {
    SongDetail {
        release_date: "1975-10-31".into(),
        text: "verse one\n\nverse two".into(),
        link: "http://x".into(),
    }
}

struct Pipeline {
    db: SqlitePool,
    catalog: CatalogService,
    queue: Arc<dyn QueueClient>,
    enricher: Arc<ScriptedEnricher>,
    // Keeps the database file alive for the test's duration.
    _dir: tempfile::TempDir,
}

async fn pipeline(script: Vec<Result<SongDetail, EnrichmentError>>) -> Pipeline {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = db::init_pool(&dir.path().join("songlib.db"))
        .await
        .expect("database");

    let cache = CacheProvider::new(Arc::new(MemoryStore::new()));
    let queue: Arc<dyn QueueClient> = Arc::new(MemoryQueue::new());
    let enricher = ScriptedEnricher::new(script);

    let ctx = Arc::new(IngestContext {
        db: db.clone(),
        cache: cache.clone(),
        enricher: enricher.clone(),
        policy: EnrichmentPolicy::RetryOnServerError,
    });

    let manager = ConsumerManager::new(queue.clone());
    ingest::register_consumers(&manager, ctx).await;
    manager.start_consumers().await;

    let catalog =
        CatalogService::new(db.clone(), cache, queue.clone(), Duration::from_secs(300));
    Pipeline {
        db,
        catalog,
        queue,
        enricher,
        _dir: dir,
    }
}

async fn song_count(db: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM songs")
        .fetch_one(db)
        .await
        .unwrap()
}

async fn wait_for_songs(db: &SqlitePool, expected: i64) {
    for _ in 0..200 {
        if song_count(db).await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("expected {expected} songs, saw {}", song_count(db).await);
}

#[tokio::test]
async fn add_song_round_trip_persists_song_and_verses() {
    let p = pipeline(vec![]).await;

    p.catalog
        .enqueue_add(&AddSongRequest {
            group: "Queen".into(),
            song: "Bohemian Rhapsody".into(),
        })
        .await
        .unwrap();

    wait_for_songs(&p.db, 1).await;

    let songs = p.catalog.get_songs(1, 10, &[]).await.unwrap();
    assert_eq!(songs.len(), 1);
    assert_eq!(songs[0].group_name, "Queen");
    assert_eq!(songs[0].release_date, "1975-10-31");
    assert_eq!(songs[0].link, "http://x");

    let verses = p.catalog.get_song_text(songs[0].id, 1, 10).await.unwrap();
    let texts: Vec<&str> = verses.iter().map(|v| v.text.as_str()).collect();
    assert_eq!(texts, ["verse one", "verse two"]);
}

#[tokio::test]
async fn enrichment_outage_requeues_until_it_recovers() {
    let p = pipeline(vec![
        Err(EnrichmentError::Server(503)),
        Err(EnrichmentError::Network("connection refused".into())),
        Ok(sample_detail()),
    ])
    .await;

    p.catalog
        .enqueue_add(&AddSongRequest {
            group: "Queen".into(),
            song: "'39".into(),
        })
        .await
        .unwrap();

    // The broker redelivers until the third attempt succeeds.
    wait_for_songs(&p.db, 1).await;
    assert_eq!(p.enricher.calls(), 3);
}

#[tokio::test]
async fn malformed_payload_is_discarded_without_retry_storm() {
    let p = pipeline(vec![]).await;

    p.queue
        .publish("add_song_queue", b"{definitely not json".to_vec())
        .await
        .unwrap();

    // Give the pipeline time to (wrongly) retry if it were going to.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(song_count(&p.db).await, 0);
    assert_eq!(p.enricher.calls(), 0, "malformed payloads never reach enrichment");

    // The consumer is still healthy afterwards.
    p.catalog
        .enqueue_add(&AddSongRequest {
            group: "g".into(),
            song: "s".into(),
        })
        .await
        .unwrap();
    wait_for_songs(&p.db, 1).await;
}

#[tokio::test]
async fn update_of_missing_song_discards_and_creates_nothing() {
    let p = pipeline(vec![]).await;

    p.catalog
        .enqueue_update(&UpdateSongRequest {
            song_id: 999,
            song: Default::default(),
        })
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(song_count(&p.db).await, 0);
}

#[tokio::test]
async fn delete_round_trip_removes_song_and_verses() {
    let p = pipeline(vec![]).await;

    p.catalog
        .enqueue_add(&AddSongRequest {
            group: "Queen".into(),
            song: "Bohemian Rhapsody".into(),
        })
        .await
        .unwrap();
    wait_for_songs(&p.db, 1).await;
    let id = p.catalog.get_songs(1, 10, &[]).await.unwrap()[0].id;

    p.catalog
        .enqueue_delete(&DeleteSongRequest { song_id: id })
        .await
        .unwrap();
    wait_for_songs(&p.db, 0).await;

    let orphans: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM verses")
        .fetch_one(&p.db)
        .await
        .unwrap();
    assert_eq!(orphans, 0);
}

#[tokio::test]
async fn concurrent_add_and_delete_settle_without_orphan_verses() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = db::init_pool(&dir.path().join("songlib.db"))
        .await
        .expect("database");

    for round in 0..10i64 {
        let add_db = db.clone();
        let add = tokio::spawn(async move {
            songs::insert_song_with_verses(
                &add_db,
                &NewSong {
                    group_name: "g".into(),
                    song_name: format!("song {round}"),
                    release_date: "".into(),
                    link: "".into(),
                },
                &["a".into(), "b".into()],
            )
            .await
        });
        // Target the id the insert is about to claim, in either order.
        let delete_db = db.clone();
        let delete =
            tokio::spawn(async move { songs::delete_song(&delete_db, round + 1).await });

        let (added, deleted) = tokio::join!(add, delete);
        added.unwrap().unwrap();
        deleted.unwrap().unwrap();
    }

    let orphans: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM verses v
        LEFT JOIN songs s ON v.song_id = s.id
        WHERE s.id IS NULL
        "#,
    )
    .fetch_one(&db)
    .await
    .unwrap();
    assert_eq!(orphans, 0, "referential integrity must hold in either order");
}
