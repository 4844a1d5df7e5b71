//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::OrderError;
use lifecycle::LifecycleError;
use order_store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Error from the order lifecycle.
    Lifecycle(LifecycleError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Lifecycle(err) => lifecycle_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn lifecycle_error_to_response(err: LifecycleError) -> (StatusCode, String) {
    let status = match &err {
        LifecycleError::Order(OrderError::InvalidStateTransition { .. }) => StatusCode::CONFLICT,
        LifecycleError::Order(_) => StatusCode::BAD_REQUEST,
        LifecycleError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
        LifecycleError::Store(StoreError::OptimisticLockConflict { .. } | StoreError::Busy(_)) => {
            StatusCode::CONFLICT
        }
        LifecycleError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %err, "internal server error");
    }

    (status, err.to_string())
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        ApiError::Lifecycle(err)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use common::{OrderId, Version};
    use domain::OrderState;

    use super::*;

    fn status_of(err: LifecycleError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_status_mapping() {
        let id = OrderId::new();

        assert_eq!(
            status_of(StoreError::NotFound(id).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(status_of(StoreError::Busy(id).into()), StatusCode::CONFLICT);
        assert_eq!(
            status_of(
                StoreError::OptimisticLockConflict {
                    order_id: id,
                    expected: Version::first(),
                    actual: Version::new(2),
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(
                OrderError::InvalidStateTransition {
                    current_state: OrderState::Reserved,
                    action: "reserve",
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(OrderError::BuyerIdRequired.into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(
                StoreError::Timeout {
                    operation: "lock_read",
                    after: Duration::from_secs(5),
                }
                .into()
            ),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
