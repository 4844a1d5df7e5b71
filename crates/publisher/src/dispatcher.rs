use std::sync::Arc;

use crate::{OrderEvent, Publisher};

/// Publishes events on detached tasks.
///
/// Callers dispatch after their durable write has committed and never learn
/// the outcome. A crash between the write and the publish loses the event.
#[derive(Clone)]
pub struct EventDispatcher {
    publisher: Arc<dyn Publisher>,
}

impl EventDispatcher {
    pub fn new(publisher: Arc<dyn Publisher>) -> Self {
        Self { publisher }
    }

    /// Serializes `event` and publishes it to its topic in the background.
    pub fn dispatch<E: OrderEvent>(&self, event: &E) {
        let order_id = event.order_id();
        match serde_json::to_value(event) {
            Ok(payload) => self.dispatch_raw(E::TOPIC, payload),
            Err(e) => {
                metrics::counter!("order_events_publish_failed_total", "topic" => E::TOPIC)
                    .increment(1);
                tracing::error!(topic = E::TOPIC, %order_id, error = %e, "failed to encode event");
            }
        }
    }

    /// Publishes a prepared payload in the background.
    pub fn dispatch_raw(&self, topic: &'static str, payload: serde_json::Value) {
        let publisher = Arc::clone(&self.publisher);

        tokio::spawn(async move {
            match publisher.publish(topic, &payload).await {
                Ok(()) => {
                    metrics::counter!("order_events_published_total", "topic" => topic)
                        .increment(1);
                    tracing::debug!(topic, "event published");
                }
                Err(e) => {
                    metrics::counter!("order_events_publish_failed_total", "topic" => topic)
                        .increment(1);
                    tracing::error!(topic, error = %e, payload = %payload, "event publication failed");
                }
            }
        });
    }
}
