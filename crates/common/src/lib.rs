//! Shared types used across the order service crates.

mod types;

pub use types::{OrderId, ParseOrderIdError, Version};
