use std::time::Duration;

use thiserror::Error;

use crate::{OrderId, Version};

/// Errors that can occur when interacting with an order repository.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No order exists with the given ID.
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// The stored version moved on since the order was loaded.
    /// The caller lost a race and must reload or give up.
    #[error(
        "Optimistic lock conflict for order {order_id}: expected version {expected}, found {actual}"
    )]
    OptimisticLockConflict {
        order_id: OrderId,
        expected: Version,
        actual: Version,
    },

    /// The row is held by another in-flight request. Retryable.
    #[error("Order {0} is busy: row is locked by another request")]
    Busy(OrderId),

    /// The operation did not finish before the caller's deadline.
    #[error("Repository operation {operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored row could not be turned back into an order.
    #[error("Corrupt order row {order_id}: {reason}")]
    CorruptRow { order_id: OrderId, reason: String },
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, StoreError>;
