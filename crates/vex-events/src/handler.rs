//! Message handler and intent publisher ports.

use async_trait::async_trait;

use crate::error::{EventError, HandlerError};
use crate::intent::{Delivery, InboundMessage, ProvisionIntent};

/// Handles every message arriving on one topic.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Handle a message.
    ///
    /// Return Ok(()) if processing succeeded, Err if it failed.
    /// A failed message is not acknowledged and will be redelivered.
    async fn handle(&self, message: &InboundMessage) -> Result<(), HandlerError>;
}

/// Publishes provisioning intents to the queue.
#[async_trait]
pub trait IntentPublisher: Send + Sync {
    /// Publish and wait for the brokers to acknowledge.
    async fn publish(&self, intent: ProvisionIntent) -> Result<Delivery, EventError>;
}
