//! Shared fakes for dispatcher tests.
//!
//! Nothing here needs a broker: claims are fed through plain channels and
//! commits are recorded in memory.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use vex_events::{EventError, HandlerError, InboundMessage, MessageHandler, OffsetCommitter};

/// Records every committed offset.
#[derive(Default)]
pub struct RecordingCommitter {
    commits: Mutex<Vec<(String, i32, i64)>>,
    fail_offsets: Vec<i64>,
}

impl RecordingCommitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A committer whose commits for the given offsets are rejected.
    pub fn failing_on(offsets: &[i64]) -> Self {
        Self {
            commits: Mutex::new(Vec::new()),
            fail_offsets: offsets.to_vec(),
        }
    }

    pub fn commits(&self) -> Vec<(String, i32, i64)> {
        self.commits.lock().unwrap().clone()
    }

    pub fn committed_offsets(&self) -> Vec<i64> {
        self.commits().into_iter().map(|(_, _, o)| o).collect()
    }
}

impl OffsetCommitter for RecordingCommitter {
    fn commit(&self, message: &InboundMessage) -> Result<(), EventError> {
        if self.fail_offsets.contains(&message.offset) {
            return Err(EventError::CommitFailed {
                topic: message.topic.clone(),
                partition: message.partition,
                offset: message.offset,
                cause: "injected".to_string(),
            });
        }
        self.commits
            .lock()
            .unwrap()
            .push((message.topic.clone(), message.partition, message.offset));
        Ok(())
    }
}

/// Counts invocations and records the payloads it saw.
#[derive(Default)]
pub struct CountingHandler {
    calls: AtomicUsize,
    payloads: Mutex<Vec<Vec<u8>>>,
}

impl CountingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.payloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageHandler for CountingHandler {
    async fn handle(&self, message: &InboundMessage) -> Result<(), HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.payloads.lock().unwrap().push(message.payload.clone());
        Ok(())
    }
}

/// Fails whenever the payload equals `poison`, succeeds otherwise.
pub struct PoisonHandler {
    poison: Vec<u8>,
    calls: AtomicUsize,
}

impl PoisonHandler {
    pub fn new(poison: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            poison: poison.to_vec(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageHandler for PoisonHandler {
    async fn handle(&self, message: &InboundMessage) -> Result<(), HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if message.payload == self.poison {
            return Err("edge store rejected the snapshot".into());
        }
        Ok(())
    }
}

/// Blocks inside `handle` until released, so a test can act while a
/// message is in flight.
#[derive(Default)]
pub struct GatedHandler {
    entered: Notify,
    release: Notify,
    calls: AtomicUsize,
}

impl GatedHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Wait until a call is inside the handler.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let one blocked call return.
    pub fn release(&self) {
        self.release.notify_one();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageHandler for GatedHandler {
    async fn handle(&self, _message: &InboundMessage) -> Result<(), HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.release.notified().await;
        Ok(())
    }
}

/// Build a message on `topic` partition 0.
pub fn message(topic: &str, offset: i64, payload: &str) -> InboundMessage {
    InboundMessage::new(topic, 0, offset, payload.as_bytes().to_vec())
}
