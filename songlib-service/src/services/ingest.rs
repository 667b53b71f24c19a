//! Ingestion handlers
//!
//! Business logic invoked per dequeued message. Each handler walks the same
//! state machine: decode the payload, apply the mutation, invalidate the
//! cache entries the confirmed mutation could have staled, and report one
//! terminal [`Outcome`].
//!
//! Outcome mapping: undecodable payloads are discarded (retrying cannot fix
//! them), transient dependency failures requeue, and a logical not-found on
//! update is discarded. The broker's redelivery is the only retry mechanism;
//! there is no backoff at this layer, so a persistent outage means unbounded
//! redelivery.

use std::sync::Arc;

use async_trait::async_trait;
use songlib_common::cache::CacheProvider;
use songlib_common::consumer::{ConsumerManager, MessageHandler};
use songlib_common::models::{
    song_key, AddSongRequest, DeleteSongRequest, SongDetail, UpdateSongRequest,
};
use songlib_common::queue::{Outcome, QueueKind};
use songlib_common::Error;
use sqlx::SqlitePool;
use tracing::{error, info, warn};

use super::enrichment::{EnrichmentClient, EnrichmentError, EnrichmentPolicy};
use crate::db::songs::{self, NewSong};

/// Dependencies shared by the ingestion handlers
pub struct IngestContext {
    pub db: SqlitePool,
    pub cache: Arc<CacheProvider>,
    pub enricher: Arc<dyn EnrichmentClient>,
    pub policy: EnrichmentPolicy,
}

/// Register the add/update/delete handlers and start their consumers
pub async fn register_consumers(manager: &ConsumerManager, ctx: Arc<IngestContext>) {
    manager
        .register_handler(QueueKind::AddSong, Arc::new(AddSongHandler { ctx: ctx.clone() }))
        .await;
    manager
        .register_handler(
            QueueKind::UpdateSong,
            Arc::new(UpdateSongHandler { ctx: ctx.clone() }),
        )
        .await;
    manager
        .register_handler(QueueKind::DeleteSong, Arc::new(DeleteSongHandler { ctx }))
        .await;
}

/// Split lyrics into verses on blank-line boundaries
pub fn split_verses(text: &str) -> Vec<String> {
    text.replace("\r\n", "\n")
        .split("\n\n")
        .map(str::trim)
        .filter(|verse| !verse.is_empty())
        .map(String::from)
        .collect()
}

/// Handles `add_song_queue`: enrich, persist transactionally, invalidate
pub struct AddSongHandler {
    ctx: Arc<IngestContext>,
}

#[async_trait]
impl MessageHandler for AddSongHandler {
    async fn handle(&self, payload: &[u8]) -> Outcome {
        let req: AddSongRequest = match serde_json::from_slice(payload) {
            Ok(req) => req,
            Err(e) => {
                error!(error = %e, "malformed add-song payload, rejecting");
                return Outcome::Discard;
            }
        };

        let detail = match self.ctx.enricher.song_detail(&req.group, &req.song).await {
            Ok(detail) => detail,
            Err(e) if e.is_transient() => {
                warn!(group = %req.group, song = %req.song, error = %e,
                    "enrichment unavailable, requeueing");
                return Outcome::Retry;
            }
            Err(EnrichmentError::Client { status, partial }) => match self.ctx.policy {
                EnrichmentPolicy::RetryOnServerError => {
                    warn!(group = %req.group, song = %req.song, status,
                        "enrichment client error, continuing with partial detail");
                    partial.unwrap_or_else(SongDetail::default)
                }
                EnrichmentPolicy::StrictClientError => {
                    error!(group = %req.group, song = %req.song, status,
                        "enrichment client error, discarding");
                    return Outcome::Discard;
                }
            },
            Err(e) => {
                error!(group = %req.group, song = %req.song, error = %e,
                    "undecodable enrichment response, discarding");
                return Outcome::Discard;
            }
        };

        let verses = split_verses(&detail.text);
        let song = NewSong {
            group_name: req.group,
            song_name: req.song,
            release_date: detail.release_date,
            link: detail.link,
        };

        match songs::insert_song_with_verses(&self.ctx.db, &song, &verses).await {
            Ok(id) => {
                info!(song_id = id, verses = verses.len(), "song persisted");
                // List and pagination keys cannot be cheaply targeted.
                self.ctx.cache.clear().await;
                Outcome::Ack
            }
            Err(e) => {
                error!(error = %e, "failed to persist song, requeueing");
                Outcome::Retry
            }
        }
    }
}

/// Handles `update_song_queue`
pub struct UpdateSongHandler {
    ctx: Arc<IngestContext>,
}

#[async_trait]
impl MessageHandler for UpdateSongHandler {
    async fn handle(&self, payload: &[u8]) -> Outcome {
        let req: UpdateSongRequest = match serde_json::from_slice(payload) {
            Ok(req) => req,
            Err(e) => {
                error!(error = %e, "malformed update-song payload, rejecting");
                return Outcome::Discard;
            }
        };

        match songs::update_song(&self.ctx.db, req.song_id, &req.song).await {
            Ok(()) => {
                info!(song_id = req.song_id, "song updated");
                self.ctx.cache.delete(&song_key(req.song_id)).await;
                Outcome::Ack
            }
            Err(Error::NotFound(_)) => {
                // Retrying will not make the row exist.
                warn!(song_id = req.song_id, "update target not found, discarding");
                Outcome::Discard
            }
            Err(e) => {
                error!(song_id = req.song_id, error = %e, "failed to update song, requeueing");
                Outcome::Retry
            }
        }
    }
}

/// Handles `delete_song_queue`
pub struct DeleteSongHandler {
    ctx: Arc<IngestContext>,
}

#[async_trait]
impl MessageHandler for DeleteSongHandler {
    async fn handle(&self, payload: &[u8]) -> Outcome {
        let req: DeleteSongRequest = match serde_json::from_slice(payload) {
            Ok(req) => req,
            Err(e) => {
                error!(error = %e, "malformed delete-song payload, rejecting");
                return Outcome::Discard;
            }
        };

        match songs::delete_song(&self.ctx.db, req.song_id).await {
            Ok(rows) => {
                info!(song_id = req.song_id, rows, "song deleted");
                self.ctx.cache.delete(&song_key(req.song_id)).await;
                Outcome::Ack
            }
            Err(e) => {
                error!(song_id = req.song_id, error = %e, "failed to delete song, requeueing");
                Outcome::Retry
            }
        }
    }
}
