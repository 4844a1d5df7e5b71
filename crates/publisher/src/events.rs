//! Order lifecycle events and their topics.

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};

pub const ORDER_RESERVED_TOPIC: &str = "order-reserved";
pub const ORDER_CANCELLED_TOPIC: &str = "order-cancelled";

/// An event with a fixed destination topic.
pub trait OrderEvent: Serialize {
    const TOPIC: &'static str;

    fn order_id(&self) -> OrderId;
}

/// A downpayment was reserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReserved {
    pub order_id: OrderId,
    pub buyer_id: String,
    /// Downpayment in cents.
    pub amount: i64,
    pub expires_at: DateTime<Utc>,
}

impl OrderEvent for OrderReserved {
    const TOPIC: &'static str = ORDER_RESERVED_TOPIC;

    fn order_id(&self) -> OrderId {
        self.order_id
    }
}

/// Why an order was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The reservation hold ran out before payment.
    DownpaymentTimeout,
    /// The buyer asked for it.
    BuyerRequest,
}

/// An order was cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub order_id: OrderId,
    pub reason: CancelReason,
}

impl OrderEvent for OrderCancelled {
    const TOPIC: &'static str = ORDER_CANCELLED_TOPIC;

    fn order_id(&self) -> OrderId {
        self.order_id
    }
}
