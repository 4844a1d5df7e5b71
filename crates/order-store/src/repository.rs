use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{NewOrder, Order};

use crate::{OrderId, Result, StoreError, Version};

/// Maximum number of orders returned by one [`OrderRepository::scan_expired`] call.
pub const SCAN_BATCH_LIMIT: usize = 100;

/// Core trait for order storage.
///
/// All implementations must be thread-safe (Send + Sync). The only
/// serialization points are the row try-lock taken by `lock_read` and the
/// version comparison inside `conditional_update`.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persists a new draft order with a fresh ID at version 1.
    async fn create(&self, new_order: NewOrder) -> Result<Order>;

    /// Writes back the mutable fields of `order`.
    ///
    /// Succeeds only if the stored version still equals
    /// `order.expected_version()`, in which case the stored version advances
    /// by one and the new version is returned. Otherwise fails with
    /// `OptimisticLockConflict`, or `NotFound` if the row is gone.
    async fn conditional_update(&self, order: &Order) -> Result<Version>;

    /// Reads an order while excluding other lock readers of the same row.
    ///
    /// Never waits for the lock: if another request holds the row the call
    /// fails immediately with `Busy`.
    async fn lock_read(&self, id: OrderId) -> Result<Order>;

    /// Returns up to [`SCAN_BATCH_LIMIT`] reserved orders whose hold ended
    /// before `now`.
    ///
    /// Rows currently locked by another request are skipped and show up on a
    /// later call.
    async fn scan_expired(&self, now: DateTime<Utc>) -> Result<Vec<Order>>;
}

#[async_trait]
impl<R: OrderRepository + ?Sized> OrderRepository for Arc<R> {
    async fn create(&self, new_order: NewOrder) -> Result<Order> {
        (**self).create(new_order).await
    }

    async fn conditional_update(&self, order: &Order) -> Result<Version> {
        (**self).conditional_update(order).await
    }

    async fn lock_read(&self, id: OrderId) -> Result<Order> {
        (**self).lock_read(id).await
    }

    async fn scan_expired(&self, now: DateTime<Utc>) -> Result<Vec<Order>> {
        (**self).scan_expired(now).await
    }
}

/// Deadline-bounded forms of the repository operations.
///
/// Each method fails with `StoreError::Timeout` instead of running past the
/// caller's deadline.
#[async_trait]
pub trait OrderRepositoryExt: OrderRepository {
    async fn lock_read_within(&self, id: OrderId, deadline: Duration) -> Result<Order> {
        within("lock_read", deadline, self.lock_read(id)).await
    }

    async fn conditional_update_within(&self, order: &Order, deadline: Duration) -> Result<Version> {
        within("conditional_update", deadline, self.conditional_update(order)).await
    }

    async fn scan_expired_within(
        &self,
        now: DateTime<Utc>,
        deadline: Duration,
    ) -> Result<Vec<Order>> {
        within("scan_expired", deadline, self.scan_expired(now)).await
    }
}

// Blanket implementation for all OrderRepository implementations
impl<T: OrderRepository + ?Sized> OrderRepositoryExt for T {}

async fn within<T>(
    operation: &'static str,
    after: Duration,
    fut: impl Future<Output = Result<T>> + Send,
) -> Result<T> {
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, ?after, "repository deadline exceeded");
            Err(StoreError::Timeout { operation, after })
        }
    }
}
