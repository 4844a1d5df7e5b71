//! Domain layer for the order service.
//!
//! This crate provides the order aggregate with its downpayment reservation
//! state machine:
//! - `Order` aggregate with an explicit version counter
//! - `OrderState` transition graph
//! - `DownpaymentTerms` describing how a reservation is priced and timed
//! - Value objects (`Money`, `BuyerId`, `EggType`)

pub mod order;

pub use order::{
    BuyerId, DownpaymentTerms, EggType, Money, NewOrder, Order, OrderError, OrderSnapshot,
    OrderState,
};
