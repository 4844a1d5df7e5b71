use domain::OrderError;
use order_store::StoreError;
use thiserror::Error;

/// Errors returned by the request path.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The order rejected the transition or the input.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// The repository failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LifecycleError {
    /// Returns true if the caller raced another writer or reader of the order.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            LifecycleError::Store(StoreError::OptimisticLockConflict { .. } | StoreError::Busy(_))
        )
    }
}

/// Result type for lifecycle operations.
pub type Result<T> = std::result::Result<T, LifecycleError>;
