//! Edge store port and wire types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{EdgeError, EdgeResult};

/// The edge namespaces the pipeline writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Project flag snapshots, keyed by project ID.
    Projects,
    /// Token records, keyed by hex-encoded secret hash.
    Tokens,
}

impl Namespace {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Projects => "projects",
            Self::Tokens => "tokens",
        }
    }
}

/// One entry of a bulk write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvPair {
    pub key: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl KvPair {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            metadata: None,
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A code/message pair from the API's `errors` or `messages` arrays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiMessage {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// Structured response envelope shared by write and delete.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KvResponse {
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<ApiMessage>,
    #[serde(default)]
    pub messages: Vec<ApiMessage>,
}

impl KvResponse {
    /// Treat `success=false` as an error regardless of transport status.
    pub fn into_result(self) -> EdgeResult<()> {
        if self.success {
            Ok(())
        } else {
            Err(EdgeError::Rejected {
                errors: self.errors,
                messages: self.messages,
            })
        }
    }
}

/// Write and delete access to the edge key-value store.
///
/// Implementations must be safe for concurrent use by several claim loops.
#[async_trait]
pub trait EdgeStore: Send + Sync {
    /// Write a batch of entries, overwriting existing values.
    async fn write(&self, namespace: Namespace, entries: Vec<KvPair>) -> EdgeResult<()>;

    /// Delete one key. Deleting an absent key succeeds.
    async fn delete(&self, namespace: Namespace, key: &str) -> EdgeResult<()>;
}
