use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{BuyerId, EggType, Money, NewOrder, Order, OrderSnapshot, OrderState};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    OrderId, Result, StoreError, Version,
    repository::{OrderRepository, SCAN_BATCH_LIMIT},
};

/// SQLSTATE raised by `FOR UPDATE NOWAIT` when the row is already locked.
const LOCK_NOT_AVAILABLE: &str = "55P03";

const ORDER_COLUMNS: &str = "id, buyer_id, egg_type, quantity, state, expires_at, version, downpayment_cents, total_amount_cents";

/// PostgreSQL-backed order repository.
#[derive(Clone)]
pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    /// Creates a new PostgreSQL order repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the `orders` table if it does not exist yet.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let order_id = OrderId::from_uuid(row.try_get::<Uuid, _>("id")?);
        let corrupt = |reason: String| StoreError::CorruptRow { order_id, reason };

        let quantity: i32 = row.try_get("quantity")?;
        let quantity = u32::try_from(quantity)
            .map_err(|_| corrupt(format!("negative quantity {quantity}")))?;
        let state: String = row.try_get("state")?;
        let state = state.parse::<OrderState>().map_err(corrupt)?;

        Ok(Order::from(OrderSnapshot {
            id: order_id,
            buyer_id: BuyerId::new(row.try_get::<String, _>("buyer_id")?),
            egg_type: EggType::new(row.try_get::<String, _>("egg_type")?),
            quantity,
            state,
            expires_at: row.try_get::<Option<DateTime<Utc>>, _>("expires_at")?,
            version: Version::new(row.try_get("version")?),
            downpayment: Money::from_cents(row.try_get("downpayment_cents")?),
            total_amount: Money::from_cents(row.try_get("total_amount_cents")?),
        }))
    }
}

fn is_lock_not_available(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(LOCK_NOT_AVAILABLE))
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    #[tracing::instrument(skip(self, new_order), fields(buyer_id = %new_order.buyer_id))]
    async fn create(&self, new_order: NewOrder) -> Result<Order> {
        let order = Order::draft(OrderId::new(), new_order);
        let quantity = i32::try_from(order.quantity()).map_err(|_| StoreError::CorruptRow {
            order_id: order.id(),
            reason: format!("quantity {} out of range", order.quantity()),
        })?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, buyer_id, egg_type, quantity, state, expires_at, version, downpayment_cents, total_amount_cents)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.buyer_id().as_str())
        .bind(order.egg_type().as_str())
        .bind(quantity)
        .bind(order.state().as_str())
        .bind(order.expires_at())
        .bind(order.version().as_i64())
        .bind(order.downpayment().cents())
        .bind(order.total_amount().cents())
        .execute(&self.pool)
        .await?;

        Ok(order)
    }

    #[tracing::instrument(skip(self, order), fields(order_id = %order.id(), version = %order.version()))]
    async fn conditional_update(&self, order: &Order) -> Result<Version> {
        let expected = order.expected_version();

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET state = $1, downpayment_cents = $2, expires_at = $3, version = version + 1
            WHERE id = $4 AND version = $5
            "#,
        )
        .bind(order.state().as_str())
        .bind(order.downpayment().cents())
        .bind(order.expires_at())
        .bind(order.id().as_uuid())
        .bind(expected.as_i64())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let actual: Option<i64> = sqlx::query_scalar("SELECT version FROM orders WHERE id = $1")
                .bind(order.id().as_uuid())
                .fetch_optional(&self.pool)
                .await?;

            return Err(match actual {
                Some(actual) => StoreError::OptimisticLockConflict {
                    order_id: order.id(),
                    expected,
                    actual: Version::new(actual),
                },
                None => StoreError::NotFound(order.id()),
            });
        }

        Ok(expected.next())
    }

    #[tracing::instrument(skip(self))]
    async fn lock_read(&self, id: OrderId) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let row: Option<PgRow> = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE NOWAIT"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            if is_lock_not_available(&e) {
                StoreError::Busy(id)
            } else {
                StoreError::Database(e)
            }
        })?;

        tx.commit().await?;

        match row {
            Some(row) => Self::row_to_order(row),
            None => Err(StoreError::NotFound(id)),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn scan_expired(&self, now: DateTime<Utc>) -> Result<Vec<Order>> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE state = $1 AND expires_at < $2
            ORDER BY expires_at ASC
            LIMIT $3
            FOR UPDATE SKIP LOCKED
            "#
        ))
        .bind(OrderState::Reserved.as_str())
        .bind(now)
        .bind(SCAN_BATCH_LIMIT as i64)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }
}
