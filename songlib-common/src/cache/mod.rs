//! Dual-tier cache provider
//!
//! A process-local map in front of a shared remote store. Reads hit the local
//! tier first; a remote hit repopulates the local tier. Every mutation is
//! applied to both tiers before it is considered complete, and a periodic
//! sweep evicts local entries whose expiry has passed.
//!
//! Store failures never reach the caller: a failed read degrades to a miss
//! (logged), a failed write leaves the local tier standing as a logged
//! inconsistency. The pipeline stays correct with the remote tier entirely
//! down, at the cost of extra database load.

mod redis;
mod store;

pub use self::redis::RedisStore;
pub use store::{CacheStore, MemoryStore};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Local lifetime given to entries populated from a remote hit. The remote
/// store carries the real TTL; the local copy is only a short-lived read
/// accelerator.
const LOCAL_REFRESH_TTL: Duration = Duration::from_secs(600);

struct LocalEntry {
    body: Vec<u8>,
    expires_at: Instant,
}

/// Two-tier cache: process-local map plus shared remote store
///
/// The local map is shared by request-handling tasks and the sweep task; all
/// access goes through one reader/writer lock scoped to this instance. The
/// lock is never held across a store call.
pub struct CacheProvider {
    store: Arc<dyn CacheStore>,
    local: RwLock<HashMap<String, LocalEntry>>,
}

impl CacheProvider {
    pub fn new(store: Arc<dyn CacheStore>) -> Arc<Self> {
        Arc::new(Self {
            store,
            local: RwLock::new(HashMap::new()),
        })
    }

    /// Look up a key, local tier first
    ///
    /// A remote hit populates the local tier before returning. A remote error
    /// is logged and reported as a miss; callers cannot distinguish the two.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        {
            let local = self.local.read().await;
            if let Some(entry) = local.get(key) {
                if Instant::now() < entry.expires_at {
                    return Some(entry.body.clone());
                }
                // Expired but not yet swept; fall through to the remote tier.
            }
        }

        match self.store.get(key).await {
            Ok(Some(body)) => {
                let mut local = self.local.write().await;
                local.insert(
                    key.to_string(),
                    LocalEntry {
                        body: body.clone(),
                        expires_at: Instant::now() + LOCAL_REFRESH_TTL,
                    },
                );
                Some(body)
            }
            Ok(None) => None,
            Err(e) => {
                error!(key, error = %e, "cache store read failed, treating as miss");
                None
            }
        }
    }

    /// Write a key to both tiers with the same TTL
    ///
    /// The local write stands even when the remote write fails; cross-process
    /// visibility is then eventual, not immediate.
    pub async fn set(&self, key: &str, value: &[u8], ttl: Duration) {
        {
            let mut local = self.local.write().await;
            local.insert(
                key.to_string(),
                LocalEntry {
                    body: value.to_vec(),
                    expires_at: Instant::now() + ttl,
                },
            );
        }

        if let Err(e) = self.store.set(key, value, ttl).await {
            error!(key, error = %e, "cache store write failed, local tier left inconsistent");
        } else {
            debug!(key, "cache entry written to both tiers");
        }
    }

    /// Remove a key from both tiers; an absent key is a no-op
    pub async fn delete(&self, key: &str) {
        self.local.write().await.remove(key);

        match self.store.delete(key).await {
            Ok(true) => debug!(key, "cache entry deleted from both tiers"),
            Ok(false) => warn!(key, "key not found in cache store during delete"),
            Err(e) => error!(key, error = %e, "cache store delete failed"),
        }
    }

    /// Empty the local map and flush the entire remote store
    ///
    /// Coarse invalidation for ambiguous bulk mutations, where the set of
    /// stale list-query keys cannot be cheaply targeted.
    pub async fn clear(&self) {
        self.local.write().await.clear();

        if let Err(e) = self.store.flush().await {
            error!(error = %e, "cache store flush failed");
        }
    }

    /// Evict local entries whose expiry has passed; returns the eviction count
    pub async fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut local = self.local.write().await;
        let before = local.len();
        local.retain(|_, entry| now < entry.expires_at);
        before - local.len()
    }

    /// Spawn the periodic eviction sweep for this provider
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let provider = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.tick().await; // first tick completes immediately
            loop {
                tick.tick().await;
                let evicted = provider.evict_expired().await;
                if evicted > 0 {
                    debug!(evicted, "swept expired local cache entries");
                }
            }
        })
    }
}
