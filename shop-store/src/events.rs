use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use shop_order::NotificationReceiver;
use shop_shared::Notification;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
    topic: String,
}

impl EventProducer {
    pub fn new(brokers: &str, topic: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self {
            producer,
            topic: topic.to_string(),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn publish(&self, key: &str, payload: &str) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(&self.topic).key(key).payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                debug!(
                    "Sent message to {}/{}: partition {} offset {}",
                    self.topic, key, delivery.partition, delivery.offset
                );
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", self.topic, e);
                Err(e)
            }
        }
    }
}

/// Drains the notification channel until every sender is gone. Each
/// notification goes to Kafka (when a producer is configured) and to the
/// in-process broadcast feeding live subscribers.
pub fn spawn_relay(
    mut rx: NotificationReceiver,
    producer: Option<EventProducer>,
    live: broadcast::Sender<Notification>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Notification relay started");
        while let Some(notification) = rx.recv().await {
            if let Some(producer) = &producer {
                match serde_json::to_string(&notification) {
                    Ok(payload) => {
                        // delivery failures are logged by the producer
                        let _ = producer.publish(&notification.key(), &payload).await;
                    }
                    Err(e) => error!("Failed to encode {} notification: {}", notification.kind(), e),
                }
            }
            // no subscribers is fine
            let _ = live.send(notification);
        }
        info!("Notification relay stopped");
    })
}
