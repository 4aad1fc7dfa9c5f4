//! Error types for the vex-events crate.

use thiserror::Error;

/// Boxed error returned by message handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by the producer, the consumer group and their configuration.
#[derive(Debug, Error)]
pub enum EventError {
    // Configuration errors (permanent, no retry)
    /// Required configuration variable is missing.
    #[error("Configuration missing: {var}")]
    ConfigMissing { var: String },

    /// Configuration value is invalid.
    #[error("Configuration invalid for {var}: {reason}")]
    ConfigInvalid { var: String, reason: String },

    // Connection errors (transient)
    /// Could not create a client against the brokers.
    #[error("Connection to broker {broker} failed: {cause}")]
    ConnectionFailed { broker: String, cause: String },

    // Publishing errors
    /// The brokers did not acknowledge a record.
    #[error("Failed to publish to topic {topic}: {cause}")]
    PublishFailed { topic: String, cause: String },

    // Consuming errors
    /// Joining the group or subscribing failed.
    #[error("Failed to subscribe to {topics:?}: {cause}")]
    SubscribeFailed { topics: Vec<String>, cause: String },

    /// The group did not assign partitions within the join timeout.
    #[error("Consumer group did not join within {timeout_secs}s")]
    JoinTimeout { timeout_secs: u64 },

    /// An offset commit was rejected.
    #[error("Failed to commit {topic}[{partition}]@{offset}: {cause}")]
    CommitFailed {
        topic: String,
        partition: i32,
        offset: i64,
        cause: String,
    },

    /// The partition was revoked before the commit; the new owner redelivers.
    #[error("Partition {topic}[{partition}] no longer owned, offset {offset} not committed")]
    PartitionRevoked {
        topic: String,
        partition: i32,
        offset: i64,
    },
}

impl EventError {
    /// Returns true if this error is transient and can be retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EventError::ConnectionFailed { .. }
                | EventError::PublishFailed { .. }
                | EventError::CommitFailed { .. }
        )
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            EventError::ConfigMissing { .. } | EventError::ConfigInvalid { .. }
        )
    }
}
