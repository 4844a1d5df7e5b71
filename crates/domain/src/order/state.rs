//! Order state machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The state of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Draft ──► Reserved ──┬──► Confirmed ──┬──► Shipped
///                      │                │
///                      └────────────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderState {
    /// Order exists but no downpayment has been reserved yet.
    #[default]
    Draft,

    /// Downpayment reserved, awaiting payment before `expires_at`.
    Reserved,

    /// Payment confirmed, awaiting fulfillment.
    Confirmed,

    /// Order was cancelled (terminal state).
    Cancelled,

    /// Order was handed over to fulfillment (terminal state).
    Shipped,
}

impl OrderState {
    /// Returns true if a downpayment can be reserved in this state.
    pub fn can_reserve(&self) -> bool {
        matches!(self, OrderState::Draft)
    }

    /// Returns true if payment can be confirmed in this state.
    ///
    /// Expiry is checked separately by the aggregate.
    pub fn can_confirm_payment(&self) -> bool {
        matches!(self, OrderState::Reserved)
    }

    /// Returns true if the order can be cancelled in this state.
    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderState::Reserved | OrderState::Confirmed)
    }

    /// Returns true if the order can be shipped in this state.
    pub fn can_ship(&self) -> bool {
        matches!(self, OrderState::Confirmed)
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderState::Shipped | OrderState::Cancelled)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::Draft => "Draft",
            OrderState::Reserved => "Reserved",
            OrderState::Confirmed => "Confirmed",
            OrderState::Cancelled => "Cancelled",
            OrderState::Shipped => "Shipped",
        }
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Draft" => Ok(OrderState::Draft),
            "Reserved" => Ok(OrderState::Reserved),
            "Confirmed" => Ok(OrderState::Confirmed),
            "Cancelled" => Ok(OrderState::Cancelled),
            "Shipped" => Ok(OrderState::Shipped),
            other => Err(format!("unknown order state: {other}")),
        }
    }
}
