//! Side caches for order snapshots.
//!
//! Entries are plain bytes under `order:{id}` keys with a per-entry TTL. The
//! cache is never authoritative: every backend error is reported to the
//! caller, which is expected to treat it as a miss.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::OrderId;

/// Errors raised by a cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend could not be reached or rejected the command.
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Unavailable(err.to_string())
    }
}

/// Returns the cache key of an order.
pub fn cache_key(id: OrderId) -> String {
    format!("order:{id}")
}

/// Byte-oriented key/value cache with expiring entries.
#[async_trait]
pub trait OrderCache: Send + Sync {
    /// Returns the entry under `key`, or None if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Stores `value` under `key` for `ttl`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// Removes the entry under `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Redis-backed cache.
///
/// Uses a `ConnectionManager`, which reconnects on its own after the server
/// goes away; commands issued while disconnected fail with
/// [`CacheError::Unavailable`].
#[derive(Clone)]
pub struct RedisOrderCache {
    conn_manager: ConnectionManager,
}

impl RedisOrderCache {
    /// Connects to Redis (e.g. `redis://127.0.0.1:6379`).
    pub async fn connect(redis_url: &str) -> Result<Self, CacheError> {
        let client = Client::open(redis_url)?;
        let conn_manager = ConnectionManager::new(client).await?;
        tracing::info!(redis_url, "connected to Redis order cache");
        Ok(Self { conn_manager })
    }
}

#[async_trait]
impl OrderCache for RedisOrderCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.conn_manager.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn_manager.clone();
        // SETEX rejects a zero expiry.
        let seconds = ttl.as_secs().max(1);
        let _: () = conn.set_ex(key, value, seconds).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryCacheState {
    entries: HashMap<String, (Vec<u8>, Instant)>,
    unavailable: bool,
}

/// Longest lifetime an in-memory entry is given.
const MAX_ENTRY_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// In-memory cache for tests and single-process runs.
///
/// Can be switched into an unavailable mode in which every command fails,
/// the way a Redis outage looks to callers.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderCache {
    state: Arc<RwLock<InMemoryCacheState>>,
}

impl InMemoryOrderCache {
    /// Creates a new empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent command fail (or succeed again).
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }

    /// Returns true if a live entry exists under `key`.
    pub async fn contains(&self, key: &str) -> bool {
        let state = self.state.read().await;
        state
            .entries
            .get(key)
            .is_some_and(|(_, expires_at)| *expires_at > Instant::now())
    }

    /// Returns the number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    /// Returns true if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl OrderCache for InMemoryOrderCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut state = self.state.write().await;
        if state.unavailable {
            return Err(CacheError::Unavailable("connection refused".to_string()));
        }

        match state.entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                state.entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let mut state = self.state.write().await;
        if state.unavailable {
            return Err(CacheError::Unavailable("connection refused".to_string()));
        }

        let now = Instant::now();
        state.entries.retain(|_, (_, expires_at)| *expires_at > now);
        state
            .entries
            .insert(key.to_string(), (value, now + ttl.min(MAX_ENTRY_TTL)));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut state = self.state.write().await;
        if state.unavailable {
            return Err(CacheError::Unavailable("connection refused".to_string()));
        }

        state.entries.remove(key);
        Ok(())
    }
}
