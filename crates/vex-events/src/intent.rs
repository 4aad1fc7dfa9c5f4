//! Provisioning intents and the messages the dispatcher consumes.

use chrono::{DateTime, Utc};

/// One provisioning request bound for a topic.
///
/// Project and token intents carry the entity identifier as both key and
/// payload. Flag intents are keyed by flag id and carry the serialized flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionIntent {
    pub topic: String,
    pub key: Vec<u8>,
    pub payload: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

impl ProvisionIntent {
    /// Intent whose key and payload are the same identifier.
    pub fn keyed(topic: impl Into<String>, id: impl Into<String>) -> Self {
        let id = id.into().into_bytes();
        Self {
            topic: topic.into(),
            key: id.clone(),
            payload: id,
            timestamp: Utc::now(),
        }
    }

    /// Intent with a distinct key and payload.
    pub fn new(topic: impl Into<String>, key: impl Into<Vec<u8>>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            key: key.into(),
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// Where the brokers stored a published intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// A message received from a partition claim, detached from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
    /// Broker timestamp in milliseconds, when known.
    pub timestamp: Option<i64>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            key: None,
            payload,
            timestamp: None,
        }
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Payload as UTF-8, trimmed.
    pub fn payload_str(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.payload).map(str::trim)
    }
}
