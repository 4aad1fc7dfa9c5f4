//! Claim tasks of one group member, keyed by partition.
//!
//! The consumer-group run loop owns a [`ClaimSet`] and feeds it rebalance
//! results and received messages. Each claim task runs
//! [`Dispatcher::consume_claim`] with a [`FencedCommitter`] tied to the
//! generation that spawned it, so a claim left over from an earlier
//! assignment cannot commit after its partition has moved.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::assignment::{Assignment, FencedCommitter, PartitionKey};
use crate::claim::{Claim, OffsetCommitter};
use crate::dispatcher::{ClaimSummary, Dispatcher};
use crate::intent::InboundMessage;

struct ClaimTask {
    generation: u64,
    sender: mpsc::Sender<InboundMessage>,
    cancel: CancellationToken,
    handle: JoinHandle<ClaimSummary>,
}

/// Running claim tasks, at most one per owned partition.
pub struct ClaimSet {
    dispatcher: Arc<Dispatcher>,
    committer: Arc<dyn OffsetCommitter>,
    assignment: Arc<Assignment>,
    buffer: usize,
    claims: HashMap<PartitionKey, ClaimTask>,
}

impl ClaimSet {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        committer: Arc<dyn OffsetCommitter>,
        assignment: Arc<Assignment>,
        buffer: usize,
    ) -> Self {
        Self {
            dispatcher,
            committer,
            assignment,
            buffer,
            claims: HashMap::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    #[must_use]
    pub fn contains(&self, key: &PartitionKey) -> bool {
        self.claims.contains_key(key)
    }

    /// Generation of the running claim for `key`, if any.
    #[must_use]
    pub fn generation(&self, key: &PartitionKey) -> Option<u64> {
        self.claims.get(key).map(|task| task.generation)
    }

    fn spawn(&mut self, key: &PartitionKey, generation: u64) {
        let (sender, mut claim) = Claim::channel(key.0.clone(), key.1, self.buffer);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let dispatcher = Arc::clone(&self.dispatcher);
        let committer = FencedCommitter::new(
            Arc::clone(&self.committer),
            Arc::clone(&self.assignment),
            generation,
        );

        let handle = tokio::spawn(async move {
            dispatcher.consume_claim(&mut claim, &committer, &token).await
        });

        debug!(topic = %key.0, partition = key.1, generation, "Claim started");
        self.claims.insert(
            key.clone(),
            ClaimTask {
                generation,
                sender,
                cancel,
                handle,
            },
        );
    }

    async fn finish(key: &PartitionKey, task: ClaimTask) -> Option<ClaimSummary> {
        drop(task.sender);
        match task.handle.await {
            Ok(summary) => Some(summary),
            Err(e) => {
                error!(topic = %key.0, partition = key.1, error = %e, "Claim task panicked");
                None
            }
        }
    }

    /// Stop claims in parallel: cancel all of them, then wait for each.
    async fn retire(tasks: Vec<(PartitionKey, ClaimTask)>) {
        for (_, task) in &tasks {
            task.cancel.cancel();
        }
        for (key, task) in tasks {
            if let Some(summary) = Self::finish(&key, task).await {
                debug!(
                    topic = %key.0,
                    partition = key.1,
                    last_committed = ?summary.last_committed,
                    "Claim retired"
                );
            }
        }
    }

    /// Start claims for newly granted partitions.
    ///
    /// A claim already running under the same generation is kept. One from an
    /// older generation is retired first.
    pub async fn assigned(&mut self, granted: &[(PartitionKey, u64)]) {
        let mut stale = Vec::new();
        for (key, generation) in granted {
            let running = self.generation(key);
            if running.is_some() && running != Some(*generation) {
                if let Some(task) = self.claims.remove(key) {
                    stale.push((key.clone(), task));
                }
            }
        }
        Self::retire(stale).await;

        for (key, generation) in granted {
            if !self.claims.contains_key(key) {
                self.spawn(key, *generation);
            }
        }
    }

    /// Stop the claims whose generations ended.
    ///
    /// A newer claim for the same partition is left running.
    pub async fn revoked(&mut self, ended: &[(PartitionKey, u64)]) {
        let mut tasks = Vec::new();
        for (key, generation) in ended {
            if self.generation(key) == Some(*generation) {
                if let Some(task) = self.claims.remove(key) {
                    tasks.push((key.clone(), task));
                }
            }
        }
        Self::retire(tasks).await;
    }

    /// Hand a message to its partition's claim.
    ///
    /// Messages for partitions this member no longer owns are dropped and
    /// left for the new owner. Returns whether the message was queued.
    pub async fn route(&mut self, message: InboundMessage, shutdown: &CancellationToken) -> bool {
        let key = (message.topic.clone(), message.partition);
        let offset = message.offset;

        let Some(current) = self.assignment.generation(&key) else {
            warn!(topic = %key.0, partition = key.1, offset, "Message for unowned partition dropped");
            return false;
        };

        match self.generation(&key) {
            Some(generation) if generation == current => {}
            Some(_) => {
                if let Some(task) = self.claims.remove(&key) {
                    Self::retire(vec![(key.clone(), task)]).await;
                }
                self.spawn(&key, current);
            }
            None => {
                debug!(topic = %key.0, partition = key.1, "Claim opened on first message");
                self.spawn(&key, current);
            }
        }

        let Some(task) = self.claims.get(&key) else {
            return false;
        };

        tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                debug!(topic = %key.0, partition = key.1, offset, "Shutdown while routing, message left for redelivery");
                false
            }
            sent = task.sender.send(message) => {
                if sent.is_err() {
                    warn!(topic = %key.0, partition = key.1, offset, "Claim closed, message left for redelivery");
                }
                sent.is_ok()
            }
        }
    }

    /// Stop every claim and return the positions to commit on the way out:
    /// `last_committed + 1` for each partition this member still owns.
    pub async fn close(mut self) -> Vec<(PartitionKey, i64)> {
        info!(claims = self.claims.len(), "Closing claims");
        let tasks: Vec<_> = self.claims.drain().collect();
        for (_, task) in &tasks {
            task.cancel.cancel();
        }

        let mut positions = Vec::new();
        for (key, task) in tasks {
            let generation = task.generation;
            let Some(summary) = Self::finish(&key, task).await else {
                continue;
            };
            let Some(offset) = summary.last_committed else {
                continue;
            };
            if self.assignment.is_current(&key, generation) {
                positions.push((key, offset + 1));
            } else {
                debug!(topic = %key.0, partition = key.1, "Final offset skipped, partition moved");
            }
        }
        positions.sort();
        positions
    }
}
