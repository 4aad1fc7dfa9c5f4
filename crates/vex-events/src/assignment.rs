//! Partition ownership for the current group generation.
//!
//! The rebalance callbacks update this table synchronously, before librdkafka
//! finishes a revoke, and every commit checks it under the same lock. A claim
//! that outlives its assignment can therefore never move the group offset of
//! a partition that now belongs to another member.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::claim::OffsetCommitter;
use crate::error::EventError;
use crate::intent::InboundMessage;

/// A topic-partition.
pub type PartitionKey = (String, i32);

/// Partitions currently owned by this member, each tagged with the
/// generation of the assignment that granted it.
#[derive(Debug, Default)]
pub struct Assignment {
    owned: Mutex<HashMap<PartitionKey, u64>>,
    last_generation: AtomicU64,
}

impl Assignment {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn owned(&self) -> MutexGuard<'_, HashMap<PartitionKey, u64>> {
        self.owned.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record newly assigned partitions. Each gets a fresh generation.
    pub fn assign(&self, partitions: &[PartitionKey]) -> Vec<(PartitionKey, u64)> {
        let mut owned = self.owned();
        partitions
            .iter()
            .map(|key| {
                let generation = self.last_generation.fetch_add(1, Ordering::SeqCst) + 1;
                owned.insert(key.clone(), generation);
                (key.clone(), generation)
            })
            .collect()
    }

    /// Give up partitions. Returns the generations that ended.
    pub fn revoke(&self, partitions: &[PartitionKey]) -> Vec<(PartitionKey, u64)> {
        let mut owned = self.owned();
        partitions
            .iter()
            .filter_map(|key| owned.remove(key).map(|generation| (key.clone(), generation)))
            .collect()
    }

    #[must_use]
    pub fn generation(&self, key: &PartitionKey) -> Option<u64> {
        self.owned().get(key).copied()
    }

    #[must_use]
    pub fn is_current(&self, key: &PartitionKey, generation: u64) -> bool {
        self.generation(key) == Some(generation)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.owned().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.owned().is_empty()
    }

    /// Run `commit` only while `generation` still owns `key`.
    ///
    /// The table stays locked for the duration, so a concurrent revoke waits
    /// until the commit has been handed to the client.
    pub fn commit_if_owned<F>(
        &self,
        key: &PartitionKey,
        generation: u64,
        offset: i64,
        commit: F,
    ) -> Result<(), EventError>
    where
        F: FnOnce() -> Result<(), EventError>,
    {
        let owned = self.owned();
        if owned.get(key) != Some(&generation) {
            debug!(topic = %key.0, partition = key.1, generation, offset, "Commit fenced");
            return Err(EventError::PartitionRevoked {
                topic: key.0.clone(),
                partition: key.1,
                offset,
            });
        }
        commit()
    }
}

/// Commits through `inner` only while the claim's assignment is current.
pub struct FencedCommitter {
    inner: Arc<dyn OffsetCommitter>,
    assignment: Arc<Assignment>,
    generation: u64,
}

impl FencedCommitter {
    pub fn new(
        inner: Arc<dyn OffsetCommitter>,
        assignment: Arc<Assignment>,
        generation: u64,
    ) -> Self {
        Self {
            inner,
            assignment,
            generation,
        }
    }
}

impl OffsetCommitter for FencedCommitter {
    fn commit(&self, message: &InboundMessage) -> Result<(), EventError> {
        let key = (message.topic.clone(), message.partition);
        self.assignment
            .commit_if_owned(&key, self.generation, message.offset, || {
                self.inner.commit(message)
            })
    }
}
