use async_trait::async_trait;

use crate::{Publisher, Result};

/// Publisher that only writes each message to the log.
///
/// Used when no broker is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingPublisher;

impl LoggingPublisher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Publisher for LoggingPublisher {
    async fn publish(&self, topic: &str, payload: &serde_json::Value) -> Result<()> {
        tracing::info!(topic, payload = %payload, "event");
        Ok(())
    }
}
