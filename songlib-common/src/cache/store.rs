//! Remote cache store abstraction
//!
//! The provider in [`super`] talks to the shared, authoritative cache tier
//! through this trait. Production uses [`crate::cache::RedisStore`];
//! [`MemoryStore`] backs tests and single-process deployments.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::Result;

/// Authoritative key/value cache tier reachable over the network
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a value; `Ok(None)` is a true miss, `Err` a backend failure
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store a value with the given TTL
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Remove a key; returns `false` when the key was absent
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Drop the store's entire contents
    async fn flush(&self) -> Result<()>;
}

/// In-process [`CacheStore`] with TTLs honored at read time
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (Vec<u8>, Instant)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((_, expires_at)) if Instant::now() >= *expires_at => {
                entries.remove(key);
                Ok(None)
            }
            Some((body, _)) => Ok(Some(body.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), (value.to_vec(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.lock().await.remove(key).is_some())
    }

    async fn flush(&self) -> Result<()> {
        self.entries.lock().await.clear();
        Ok(())
    }
}
