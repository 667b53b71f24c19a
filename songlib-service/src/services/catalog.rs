//! Catalog service
//!
//! The producer-facing API: cached read paths, and write paths that defer the
//! actual mutation to the ingestion pipeline. Each write publishes its request
//! onto the matching queue and immediately invalidates the cache entries the
//! mutation will stale, so readers fall through to the store while the
//! consumer catches up.

use std::sync::Arc;
use std::time::Duration;

use songlib_common::cache::CacheProvider;
use songlib_common::models::{
    song_key, song_text_key, songs_list_key, AddSongRequest, DeleteSongRequest, Song,
    UpdateSongRequest, Verse,
};
use songlib_common::queue::{QueueClient, QueueKind};
use songlib_common::Result;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::db::{songs, verses};

pub struct CatalogService {
    db: SqlitePool,
    cache: Arc<CacheProvider>,
    queue: Arc<dyn QueueClient>,
    cache_ttl: Duration,
}

impl CatalogService {
    pub fn new(
        db: SqlitePool,
        cache: Arc<CacheProvider>,
        queue: Arc<dyn QueueClient>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            db,
            cache,
            queue,
            cache_ttl,
        }
    }

    /// Paginated, filtered song listing, cache-aside
    pub async fn get_songs(
        &self,
        page: i64,
        page_size: i64,
        filters: &[String],
    ) -> Result<Vec<Song>> {
        let key = songs_list_key(page, page_size, filters);
        if let Some(hit) = self.cached(&key).await {
            return Ok(hit);
        }

        let songs = songs::list_songs(&self.db, page, page_size, filters).await?;
        self.store(&key, &songs).await;
        Ok(songs)
    }

    /// Paginated verses of one song, cache-aside
    pub async fn get_song_text(
        &self,
        song_id: i64,
        page: i64,
        page_size: i64,
    ) -> Result<Vec<Verse>> {
        let key = song_text_key(song_id, page, page_size);
        if let Some(hit) = self.cached(&key).await {
            return Ok(hit);
        }

        let verses = verses::list_verses(&self.db, song_id, page, page_size).await?;
        self.store(&key, &verses).await;
        Ok(verses)
    }

    /// Enqueue a song creation; the ingestion pipeline enriches and persists
    /// it later. List caches are cleared wholesale since the affected
    /// list-query keys cannot be known here.
    pub async fn enqueue_add(&self, req: &AddSongRequest) -> Result<()> {
        self.queue
            .publish(QueueKind::AddSong.queue_name(), serde_json::to_vec(req)?)
            .await?;
        self.cache.clear().await;
        Ok(())
    }

    /// Enqueue a song update and drop its cached detail
    pub async fn enqueue_update(&self, req: &UpdateSongRequest) -> Result<()> {
        self.queue
            .publish(QueueKind::UpdateSong.queue_name(), serde_json::to_vec(req)?)
            .await?;
        self.cache.delete(&song_key(req.song_id)).await;
        Ok(())
    }

    /// Enqueue a song deletion and drop its cached detail
    pub async fn enqueue_delete(&self, req: &DeleteSongRequest) -> Result<()> {
        self.queue
            .publish(QueueKind::DeleteSong.queue_name(), serde_json::to_vec(req)?)
            .await?;
        self.cache.delete(&song_key(req.song_id)).await;
        Ok(())
    }

    async fn cached<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.cache.get(key).await?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                debug!(key, "cache hit");
                Some(value)
            }
            Err(e) => {
                // A corrupt entry reads as a miss; the store path rewrites it.
                warn!(key, error = %e, "undecodable cache entry, ignoring");
                None
            }
        }
    }

    async fn store<T: serde::Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.cache.set(key, &bytes, self.cache_ttl).await,
            Err(e) => warn!(key, error = %e, "failed to encode cache entry"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;
    use crate::db::songs::NewSong;
    use songlib_common::cache::MemoryStore;
    use songlib_common::queue::MemoryQueue;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn service() -> (CatalogService, SqlitePool) {
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory database");
        init_schema(&db).await.unwrap();
        let catalog = CatalogService::new(
            db.clone(),
            CacheProvider::new(Arc::new(MemoryStore::new())),
            Arc::new(MemoryQueue::new()),
            Duration::from_secs(300),
        );
        (catalog, db)
    }

    #[tokio::test]
    async fn get_songs_serves_from_cache_after_first_read() {
        let (catalog, db) = service().await;
        songs::insert_song_with_verses(
            &db,
            &NewSong {
                group_name: "Queen".into(),
                song_name: "'39".into(),
                release_date: "1975-10-31".into(),
                link: "".into(),
            },
            &[],
        )
        .await
        .unwrap();

        let first = catalog.get_songs(1, 10, &[]).await.unwrap();
        assert_eq!(first.len(), 1);

        // A write behind the cache's back is not visible within the TTL.
        sqlx::query("DELETE FROM songs").execute(&db).await.unwrap();
        let second = catalog.get_songs(1, 10, &[]).await.unwrap();
        assert_eq!(second.len(), 1);
    }

    #[tokio::test]
    async fn enqueue_add_clears_list_caches() {
        let (catalog, db) = service().await;
        songs::insert_song_with_verses(
            &db,
            &NewSong {
                group_name: "ABBA".into(),
                song_name: "SOS".into(),
                release_date: "".into(),
                link: "".into(),
            },
            &[],
        )
        .await
        .unwrap();

        // Prime the list cache, then enqueue an add.
        assert_eq!(catalog.get_songs(1, 10, &[]).await.unwrap().len(), 1);
        catalog
            .enqueue_add(&AddSongRequest {
                group: "ABBA".into(),
                song: "Waterloo".into(),
            })
            .await
            .unwrap();

        // The next read goes back to the store.
        sqlx::query("DELETE FROM songs").execute(&db).await.unwrap();
        assert!(catalog.get_songs(1, 10, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_cache_entries_fall_through_to_the_store() {
        let (catalog, db) = service().await;
        songs::insert_song_with_verses(
            &db,
            &NewSong {
                group_name: "g".into(),
                song_name: "s".into(),
                release_date: "".into(),
                link: "".into(),
            },
            &[],
        )
        .await
        .unwrap();

        catalog
            .cache
            .set(&songs_list_key(1, 10, &[]), b"not json", Duration::from_secs(60))
            .await;
        assert_eq!(catalog.get_songs(1, 10, &[]).await.unwrap().len(), 1);
    }
}
