//! Cache-aside decorator over an order repository.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{NewOrder, Order};

use crate::{
    OrderId, Result, Version,
    cache::{OrderCache, cache_key},
    repository::OrderRepository,
};

/// Lifetime of a cached order snapshot.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Wraps a repository with a read-through cache for `lock_read`.
///
/// A cache hit is served without taking the row lock, so it may be stale;
/// the version check in `conditional_update` rejects any write based on a
/// stale snapshot. Cache failures are never surfaced to callers.
#[derive(Clone)]
pub struct CachedOrderRepository<R, C> {
    inner: R,
    cache: C,
    ttl: Duration,
}

impl<R, C> CachedOrderRepository<R, C>
where
    R: OrderRepository,
    C: OrderCache,
{
    pub fn new(inner: R, cache: C) -> Self {
        Self::with_ttl(inner, cache, DEFAULT_CACHE_TTL)
    }

    pub fn with_ttl(inner: R, cache: C, ttl: Duration) -> Self {
        Self { inner, cache, ttl }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    async fn cached(&self, key: &str) -> Option<Order> {
        let bytes = match self.cache.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                metrics::counter!("order_cache_errors_total", "op" => "get").increment(1);
                tracing::warn!(key, error = %e, "order cache read failed, falling back to store");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(order) => Some(order),
            Err(e) => {
                tracing::warn!(key, error = %e, "discarding undecodable cache entry");
                None
            }
        }
    }

    async fn populate(&self, key: &str, order: &Order) {
        let bytes = match serde_json::to_vec(order) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to encode order for cache");
                return;
            }
        };

        if let Err(e) = self.cache.set(key, bytes, self.ttl).await {
            metrics::counter!("order_cache_errors_total", "op" => "set").increment(1);
            tracing::warn!(key, error = %e, "order cache write failed");
        }
    }
}

#[async_trait]
impl<R, C> OrderRepository for CachedOrderRepository<R, C>
where
    R: OrderRepository,
    C: OrderCache,
{
    async fn create(&self, new_order: NewOrder) -> Result<Order> {
        self.inner.create(new_order).await
    }

    async fn conditional_update(&self, order: &Order) -> Result<Version> {
        let result = self.inner.conditional_update(order).await;

        // Invalidate whatever the outcome: after a conflict the cached
        // snapshot is known to be stale.
        let key = cache_key(order.id());
        if let Err(e) = self.cache.delete(&key).await {
            metrics::counter!("order_cache_errors_total", "op" => "delete").increment(1);
            tracing::warn!(key, error = %e, "order cache invalidation failed");
        }

        result
    }

    async fn lock_read(&self, id: OrderId) -> Result<Order> {
        let key = cache_key(id);

        if let Some(order) = self.cached(&key).await {
            metrics::counter!("order_cache_hits_total").increment(1);
            tracing::debug!(order_id = %id, "order cache hit");
            return Ok(order);
        }

        metrics::counter!("order_cache_misses_total").increment(1);
        let order = self.inner.lock_read(id).await?;
        self.populate(&key, &order).await;
        Ok(order)
    }

    async fn scan_expired(&self, now: DateTime<Utc>) -> Result<Vec<Order>> {
        self.inner.scan_expired(now).await
    }
}
