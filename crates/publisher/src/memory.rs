use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::{PublishError, Publisher, Result};

/// A message accepted by an [`InMemoryPublisher`].
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Default)]
struct InMemoryPublisherState {
    messages: Vec<PublishedMessage>,
    attempts: usize,
    fail: bool,
    closed: bool,
}

/// In-memory publisher for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPublisher {
    state: Arc<RwLock<InMemoryPublisherState>>,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent publishes fail (or succeed again).
    pub async fn set_fail(&self, fail: bool) {
        self.state.write().await.fail = fail;
    }

    /// Returns every accepted message in publication order.
    pub async fn messages(&self) -> Vec<PublishedMessage> {
        self.state.read().await.messages.clone()
    }

    /// Returns the accepted messages for one topic.
    pub async fn messages_for(&self, topic: &str) -> Vec<PublishedMessage> {
        self.state
            .read()
            .await
            .messages
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Returns the number of publish calls, failed ones included.
    pub async fn attempts(&self) -> usize {
        self.state.read().await.attempts
    }

    pub async fn is_closed(&self) -> bool {
        self.state.read().await.closed
    }

    /// Waits until at least `count` messages were accepted or `timeout`
    /// passes, then returns what was accepted.
    ///
    /// Dispatch happens on detached tasks, so tests poll for the outcome.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<PublishedMessage> {
        let deadline = Instant::now() + timeout;
        loop {
            let messages = self.messages().await;
            if messages.len() >= count || Instant::now() >= deadline {
                return messages;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Waits until at least `count` publish calls were made or `timeout` passes.
    pub async fn wait_for_attempts(&self, count: usize, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        loop {
            let attempts = self.attempts().await;
            if attempts >= count || Instant::now() >= deadline {
                return attempts;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl Publisher for InMemoryPublisher {
    async fn publish(&self, topic: &str, payload: &serde_json::Value) -> Result<()> {
        let mut state = self.state.write().await;
        state.attempts += 1;

        if state.closed {
            return Err(PublishError::Closed);
        }
        if state.fail {
            return Err(PublishError::Failed {
                topic: topic.to_string(),
                reason: "broker unavailable".to_string(),
            });
        }

        state.messages.push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.clone(),
        });
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.state.write().await.closed = true;
        Ok(())
    }
}
