use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{NewOrder, Order, OrderState};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::{
    OrderId, Result, StoreError, Version,
    repository::{OrderRepository, SCAN_BATCH_LIMIT},
};

type Row = Arc<Mutex<Order>>;

/// In-memory order repository.
///
/// Each order sits behind its own mutex, which plays the role of the
/// database row lock: `lock_read` only ever tries it, `conditional_update`
/// waits for it the way an `UPDATE` waits for a row lock.
#[derive(Clone, Default)]
pub struct InMemoryOrderRepository {
    rows: Arc<RwLock<HashMap<OrderId, Row>>>,
}

impl InMemoryOrderRepository {
    /// Creates a new empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.rows.read().await.len()
    }

    /// Stores an order exactly as given, replacing any existing row.
    ///
    /// Lets tests and fixtures seed orders in any state.
    pub async fn insert(&self, order: Order) {
        self.rows
            .write()
            .await
            .insert(order.id(), Arc::new(Mutex::new(order)));
    }

    /// Returns the stored order, waiting for the row if it is held.
    pub async fn get(&self, id: OrderId) -> Option<Order> {
        let row = self.row(id).await?;
        let order = row.lock().await.clone();
        Some(order)
    }

    /// Takes the row lock of an order and keeps it until the guard is dropped.
    ///
    /// Stands in for another request holding the row.
    pub async fn hold_row(&self, id: OrderId) -> Result<OwnedMutexGuard<Order>> {
        let row = self.row(id).await.ok_or(StoreError::NotFound(id))?;
        Ok(row.lock_owned().await)
    }

    /// Removes all orders.
    pub async fn clear(&self) {
        self.rows.write().await.clear();
    }

    async fn row(&self, id: OrderId) -> Option<Row> {
        self.rows.read().await.get(&id).cloned()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create(&self, new_order: NewOrder) -> Result<Order> {
        let order = Order::draft(OrderId::new(), new_order);
        self.insert(order.clone()).await;
        Ok(order)
    }

    async fn conditional_update(&self, order: &Order) -> Result<Version> {
        let id = order.id();
        let row = self.row(id).await.ok_or(StoreError::NotFound(id))?;
        let mut stored = row.lock().await;

        let expected = order.expected_version();
        if stored.version() != expected {
            return Err(StoreError::OptimisticLockConflict {
                order_id: id,
                expected,
                actual: stored.version(),
            });
        }

        // Transitions never touch the descriptive attributes, so the whole
        // order can be written back.
        *stored = order.clone();
        Ok(stored.version())
    }

    async fn lock_read(&self, id: OrderId) -> Result<Order> {
        let row = self.row(id).await.ok_or(StoreError::NotFound(id))?;
        let guard = row.try_lock().map_err(|_| StoreError::Busy(id))?;
        Ok(guard.clone())
    }

    async fn scan_expired(&self, now: DateTime<Utc>) -> Result<Vec<Order>> {
        let rows = self.rows.read().await;
        let expired = rows
            .values()
            .filter_map(|row| row.try_lock().ok().map(|order| order.clone()))
            .filter(|order| {
                order.state() == OrderState::Reserved
                    && order.expires_at().is_some_and(|at| at < now)
            })
            .take(SCAN_BATCH_LIMIT)
            .collect();
        Ok(expired)
    }
}
