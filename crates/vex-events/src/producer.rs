//! Kafka intent producer.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use tracing::{debug, info, instrument};

use crate::config::{KafkaConfig, TopicConfig};
use crate::error::EventError;
use crate::handler::IntentPublisher;
use crate::health::HealthStatus;
use crate::intent::{Delivery, ProvisionIntent};

/// How long the broker has to acknowledge a record.
const MESSAGE_TIMEOUT_MS: &str = "5000";

/// How long `publish` may wait for space in the local send queue.
const QUEUE_TIMEOUT: Duration = Duration::from_secs(5);

/// Durability-first producer: every record waits for all in-sync replicas.
pub struct IntentProducer {
    producer: FutureProducer,
    bootstrap_servers: String,
    topics: TopicConfig,
}

impl IntentProducer {
    /// Create a producer. Connection is lazy; brokers are contacted on first send.
    pub fn new(config: &KafkaConfig, topics: TopicConfig) -> Result<Self, EventError> {
        let producer: FutureProducer = config
            .client_config()
            .set("message.timeout.ms", MESSAGE_TIMEOUT_MS)
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .create()
            .map_err(|e| EventError::ConnectionFailed {
                broker: config.bootstrap_servers.clone(),
                cause: e.to_string(),
            })?;

        info!(
            bootstrap_servers = %config.bootstrap_servers,
            client_id = %config.client_id,
            "Intent producer created"
        );

        Ok(Self {
            producer,
            bootstrap_servers: config.bootstrap_servers.clone(),
            topics,
        })
    }

    /// Check the broker connection and that every provisioning topic exists.
    ///
    /// Blocks on a metadata request for up to five seconds.
    pub async fn health_check(&self) -> Result<HealthStatus, EventError> {
        let metadata = self
            .producer
            .client()
            .fetch_metadata(None, Duration::from_secs(5))
            .map_err(|e| EventError::ConnectionFailed {
                broker: self.bootstrap_servers.clone(),
                cause: e.to_string(),
            })?;

        let expected = self.topics.all();
        let topics_present = metadata
            .topics()
            .iter()
            .filter(|t| t.error().is_none() && expected.contains(&t.name()))
            .count();

        Ok(HealthStatus {
            connected: true,
            brokers: metadata.brokers().len(),
            topics_present,
            topics_expected: expected.len(),
        })
    }
}

#[async_trait]
impl IntentPublisher for IntentProducer {
    #[instrument(skip(self, intent), fields(topic = %intent.topic))]
    async fn publish(&self, intent: ProvisionIntent) -> Result<Delivery, EventError> {
        debug!(
            key_size = intent.key.len(),
            payload_size = intent.payload.len(),
            "Publishing intent"
        );

        let record = FutureRecord::to(&intent.topic)
            .key(&intent.key)
            .payload(&intent.payload)
            .timestamp(intent.timestamp.timestamp_millis());

        let (partition, offset) = self
            .producer
            .send(record, QUEUE_TIMEOUT)
            .await
            .map_err(|(err, _)| EventError::PublishFailed {
                topic: intent.topic.clone(),
                cause: err.to_string(),
            })?;

        debug!(partition, offset, "Intent acknowledged");

        Ok(Delivery {
            topic: intent.topic,
            partition,
            offset,
        })
    }
}
