//! Partition claims and offset commits.

use tokio::sync::mpsc;

use crate::error::EventError;
use crate::intent::InboundMessage;

/// The message stream of one assigned partition.
///
/// Messages arrive in partition order and are consumed strictly sequentially.
#[derive(Debug)]
pub struct Claim {
    pub topic: String,
    pub partition: i32,
    messages: mpsc::Receiver<InboundMessage>,
}

impl Claim {
    pub fn new(
        topic: impl Into<String>,
        partition: i32,
        messages: mpsc::Receiver<InboundMessage>,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition,
            messages,
        }
    }

    /// A claim plus the sender that feeds it.
    pub fn channel(
        topic: impl Into<String>,
        partition: i32,
        capacity: usize,
    ) -> (mpsc::Sender<InboundMessage>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self::new(topic, partition, rx))
    }

    /// Next message, or None once the feeding side has gone away.
    pub async fn next(&mut self) -> Option<InboundMessage> {
        self.messages.recv().await
    }
}

/// Marks a message as processed for the group.
pub trait OffsetCommitter: Send + Sync {
    /// Commit the position after `message`.
    fn commit(&self, message: &InboundMessage) -> Result<(), EventError>;
}
