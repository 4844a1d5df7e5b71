//! Kafka-backed publisher.
//!
//! Producer defaults favour throughput over durability: leader-only acks,
//! snappy compression and a 500 ms linger window for batching.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;

use crate::{PublishError, Publisher, Result};

const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Publisher backed by an rdkafka `FutureProducer`.
#[derive(Clone)]
pub struct KafkaPublisher {
    producer: FutureProducer,
    brokers: String,
    send_timeout: Duration,
}

impl KafkaPublisher {
    /// Creates a publisher with default producer settings.
    pub fn new(brokers: &str) -> Result<Self> {
        Self::builder().brokers(brokers).build()
    }

    pub fn builder() -> KafkaPublisherBuilder {
        KafkaPublisherBuilder::default()
    }
}

/// Builder for [`KafkaPublisher`].
#[derive(Debug, Default)]
pub struct KafkaPublisherBuilder {
    brokers: Option<String>,
    acks: Option<String>,
    compression: Option<String>,
    linger: Option<Duration>,
    retries: Option<u32>,
    send_timeout: Option<Duration>,
}

impl KafkaPublisherBuilder {
    /// Comma-separated bootstrap servers.
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// `"0"`, `"1"` or `"all"`. Defaults to `"1"`.
    pub fn acks(mut self, acks: impl Into<String>) -> Self {
        self.acks = Some(acks.into());
        self
    }

    /// Defaults to `"snappy"`.
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// How long the producer batches messages before sending. Defaults to 500 ms.
    pub fn linger(mut self, linger: Duration) -> Self {
        self.linger = Some(linger);
        self
    }

    /// Defaults to 5.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Time a single send may wait for queue space. Defaults to 5 s.
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<KafkaPublisher> {
        let brokers = self.brokers.ok_or_else(|| PublishError::Failed {
            topic: String::new(),
            reason: "brokers not configured".to_string(),
        })?;
        let acks = self.acks.unwrap_or_else(|| "1".to_string());
        let compression = self.compression.unwrap_or_else(|| "snappy".to_string());
        let linger = self.linger.unwrap_or(Duration::from_millis(500));
        let retries = self.retries.unwrap_or(5);

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("acks", &acks)
            .set("compression.type", &compression)
            .set("linger.ms", linger.as_millis().to_string())
            .set("retries", retries.to_string())
            .set("message.timeout.ms", "30000")
            .create()
            .map_err(|e| PublishError::Failed {
                topic: String::new(),
                reason: format!("failed to create producer: {e}"),
            })?;

        tracing::info!(%brokers, %acks, %compression, ?linger, retries, "Kafka publisher created");

        Ok(KafkaPublisher {
            producer,
            brokers,
            send_timeout: self.send_timeout.unwrap_or(DEFAULT_SEND_TIMEOUT),
        })
    }
}

#[async_trait]
impl Publisher for KafkaPublisher {
    async fn publish(&self, topic: &str, payload: &serde_json::Value) -> Result<()> {
        let bytes = serde_json::to_vec(payload)?;
        // Keying by order keeps one order's events on one partition.
        let key = payload
            .get("order_id")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();

        let record = FutureRecord::to(topic).payload(&bytes).key(key);

        match self
            .producer
            .send(record, Timeout::After(self.send_timeout))
            .await
        {
            Ok((partition, offset)) => {
                tracing::debug!(topic, partition, offset, "message delivered");
                Ok(())
            }
            Err((e, _)) => Err(PublishError::Failed {
                topic: topic.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn close(&self) -> Result<()> {
        let producer = self.producer.clone();
        // flush blocks the calling thread until the queue drains
        tokio::task::spawn_blocking(move || producer.flush(Timeout::After(DEFAULT_FLUSH_TIMEOUT)))
            .await
            .map_err(|e| PublishError::Failed {
                topic: String::new(),
                reason: format!("flush task failed: {e}"),
            })?
            .map_err(|e| PublishError::Failed {
                topic: String::new(),
                reason: format!("flush failed: {e}"),
            })?;

        tracing::info!(brokers = %self.brokers, "Kafka publisher flushed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kafka_publisher_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<KafkaPublisher>();
    }

    #[test]
    fn build_without_brokers_fails() {
        assert!(KafkaPublisher::builder().build().is_err());
    }
}
