//! songlib-service - song catalog ingestion service
//!
//! Consumes the add/update/delete queues, enriches new songs against the
//! song-info API, persists them transactionally, and keeps the dual-tier
//! cache coherent with every confirmed mutation.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use songlib_common::cache::{CacheProvider, RedisStore};
use songlib_common::config::Config;
use songlib_common::consumer::ConsumerManager;
use songlib_common::queue::{AmqpQueue, QueueClient};
use songlib_service::db;
use songlib_service::services::enrichment::{EnrichmentPolicy, HttpEnrichmentClient};
use songlib_service::services::ingest::{self, IngestContext};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("starting songlib-service");
    info!("version: {}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env();

    let db_pool = db::init_pool(&config.database_path).await?;
    info!(path = %config.database_path.display(), "database connection established");

    // Startup requires the cache store reachable; afterwards every failure
    // degrades to a miss or a logged inconsistency.
    let store = RedisStore::connect(&config.redis_url).await?;
    let cache = CacheProvider::new(Arc::new(store));
    let _sweeper = cache.start_sweeper(config.cache_sweep_interval);
    info!("cache provider initialized");

    let queue: Arc<dyn QueueClient> = Arc::new(AmqpQueue::connect(&config.amqp_url).await?);

    let enricher = HttpEnrichmentClient::new(config.enrichment_host.clone())
        .map_err(|e| anyhow::anyhow!("failed to build enrichment client: {e}"))?;
    let policy = if config.discard_on_client_error {
        EnrichmentPolicy::StrictClientError
    } else {
        EnrichmentPolicy::RetryOnServerError
    };

    let ctx = Arc::new(IngestContext {
        db: db_pool,
        cache,
        enricher: Arc::new(enricher),
        policy,
    });

    let manager = ConsumerManager::new(queue);
    ingest::register_consumers(&manager, ctx).await;
    manager.start_consumers().await;
    info!("consumers running");

    tokio::signal::ctrl_c().await?;
    // New deliveries stop when the process exits; in-flight handlers run to
    // their terminal outcome or are lost to broker redelivery.
    info!("shutting down");
    Ok(())
}
