//! Event publication for the order service.
//!
//! Publication is a side effect of a committed state change and never part of
//! it: [`EventDispatcher`] hands each message to a detached task and forgets
//! about it. Failures are logged and counted, not returned.
//!
//! Backends:
//! - [`KafkaPublisher`] (feature `kafka`): rdkafka producer
//! - [`LoggingPublisher`]: writes each message to the log
//! - [`InMemoryPublisher`]: records messages for tests

pub mod dispatcher;
pub mod error;
pub mod events;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod logging;
pub mod memory;

use async_trait::async_trait;

pub use dispatcher::EventDispatcher;
pub use error::{PublishError, Result};
pub use events::{
    CancelReason, ORDER_CANCELLED_TOPIC, ORDER_RESERVED_TOPIC, OrderCancelled, OrderEvent,
    OrderReserved,
};
#[cfg(feature = "kafka")]
pub use kafka::{KafkaPublisher, KafkaPublisherBuilder};
pub use logging::LoggingPublisher;
pub use memory::{InMemoryPublisher, PublishedMessage};

/// A sink for JSON messages addressed by topic.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes one message to `topic`.
    async fn publish(&self, topic: &str, payload: &serde_json::Value) -> Result<()>;

    /// Flushes buffered messages and releases the backend.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
