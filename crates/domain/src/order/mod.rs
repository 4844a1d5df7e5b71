//! Order aggregate and related types.

mod aggregate;
mod state;
mod terms;
mod value_objects;

pub use aggregate::{MAX_QUANTITY, NewOrder, Order, OrderSnapshot};
pub use state::OrderState;
pub use terms::{DownpaymentTerms, MAX_HOLD};
pub use value_objects::{BuyerId, EggType, Money};

use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Order is not in a state that allows the requested action.
    #[error("Invalid state transition: cannot {action} from {current_state} state")]
    InvalidStateTransition {
        current_state: OrderState,
        action: &'static str,
    },

    /// Reservation terms are out of range.
    #[error("Invalid downpayment terms: {0}")]
    InvalidTerms(String),

    /// Buyer ID is required.
    #[error("Buyer ID is required")]
    BuyerIdRequired,

    /// Invalid quantity.
    #[error("Invalid quantity: {quantity} (must be between 1 and 2147483647)")]
    InvalidQuantity { quantity: u32 },

    /// Invalid order total.
    #[error("Invalid total amount: {cents} cents (must be greater than 0)")]
    InvalidTotalAmount { cents: i64 },
}
