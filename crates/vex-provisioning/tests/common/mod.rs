//! In-memory collaborators for reconciliation tests.
//!
//! These fakes stand in for Postgres, the edge API and the Kafka producer so
//! the tests run without any external service.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use vex_db::{DbError, Flag, FlagType, Project, Token};
use vex_edge::{ApiMessage, EdgeError, EdgeResult, EdgeStore, KvPair, Namespace};
use vex_events::{Delivery, EventError, IntentPublisher, ProvisionIntent};
use vex_provisioning::{EntityReader, Reconciler};

// =============================================================================
// Edge store
// =============================================================================

/// Every call made against the edge store, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeCall {
    Write(Namespace, Vec<KvPair>),
    Delete(Namespace, String),
}

/// Edge store backed by a map. Can be told to reject writes.
#[derive(Default)]
pub struct MemoryEdgeStore {
    entries: Mutex<HashMap<(Namespace, String), KvPair>>,
    calls: Mutex<Vec<EdgeCall>>,
    reject: AtomicBool,
}

impl MemoryEdgeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer every later call the way the API answers `success=false`.
    pub fn reject_writes(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub fn get(&self, namespace: Namespace, key: &str) -> Option<KvPair> {
        self.entries
            .lock()
            .unwrap()
            .get(&(namespace, key.to_string()))
            .cloned()
    }

    pub fn value(&self, namespace: Namespace, key: &str) -> Option<String> {
        self.get(namespace, key).map(|e| e.value)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<EdgeCall> {
        self.calls.lock().unwrap().clone()
    }

    fn rejection() -> EdgeError {
        EdgeError::Rejected {
            errors: vec![ApiMessage {
                code: 10001,
                message: "bulk write partially failed".to_string(),
            }],
            messages: Vec::new(),
        }
    }
}

#[async_trait]
impl EdgeStore for MemoryEdgeStore {
    async fn write(&self, namespace: Namespace, entries: Vec<KvPair>) -> EdgeResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(EdgeCall::Write(namespace, entries.clone()));
        if self.reject.load(Ordering::SeqCst) {
            return Err(Self::rejection());
        }
        let mut map = self.entries.lock().unwrap();
        for entry in entries {
            map.insert((namespace, entry.key.clone()), entry);
        }
        Ok(())
    }

    async fn delete(&self, namespace: Namespace, key: &str) -> EdgeResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(EdgeCall::Delete(namespace, key.to_string()));
        if self.reject.load(Ordering::SeqCst) {
            return Err(Self::rejection());
        }
        self.entries
            .lock()
            .unwrap()
            .remove(&(namespace, key.to_string()));
        Ok(())
    }
}

// =============================================================================
// Entity reader
// =============================================================================

/// Relational state held in memory.
#[derive(Default)]
pub struct MemoryReader {
    projects: Mutex<HashMap<Uuid, Project>>,
    flags: Mutex<Vec<Flag>>,
    tokens: Mutex<HashMap<Uuid, Token>>,
    last_flag_limit: AtomicI64,
}

impl MemoryReader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_project(&self, account_id: Uuid) -> Project {
        let project = Project {
            id: Uuid::new_v4(),
            account_id,
            name: "storefront".to_string(),
            description: String::new(),
            created_on: Utc::now(),
            modified_on: Utc::now(),
        };
        self.projects
            .lock()
            .unwrap()
            .insert(project.id, project.clone());
        project
    }

    pub fn remove_project(&self, id: Uuid) {
        self.projects.lock().unwrap().remove(&id);
        self.flags.lock().unwrap().retain(|f| f.project_id != id);
    }

    pub fn add_flag(&self, project: &Project, key: &str, flag_type: FlagType, value: &str) -> Flag {
        let flag = Flag {
            id: Uuid::new_v4(),
            project_id: project.id,
            account_id: project.account_id,
            key: key.to_string(),
            flag_type,
            value: value.to_string(),
            created_on: None,
            modified_on: None,
        };
        flag.validate().unwrap();
        self.flags.lock().unwrap().push(flag.clone());
        flag
    }

    /// The `limit` of the most recent flag read, or 0 before any.
    pub fn last_flag_limit(&self) -> i64 {
        self.last_flag_limit.load(Ordering::SeqCst)
    }

    pub fn remove_flag(&self, id: Uuid) {
        self.flags.lock().unwrap().retain(|f| f.id != id);
    }

    /// Returns the plaintext secret alongside the stored token.
    pub fn add_token(&self, account_id: Uuid) -> (String, Token) {
        let (secret, hash) = Token::generate_secret();
        let token = Token {
            id: Uuid::new_v4(),
            account_id,
            token_hash: hash,
            read_only: false,
            created_on: Utc::now(),
            modified_on: Utc::now(),
        };
        self.tokens.lock().unwrap().insert(token.id, token.clone());
        (secret, token)
    }
}

#[async_trait]
impl EntityReader for MemoryReader {
    async fn project(&self, id: Uuid) -> Result<Project, DbError> {
        self.projects
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("project {id}")))
    }

    async fn flags_for_project(&self, project_id: Uuid, limit: i64) -> Result<Vec<Flag>, DbError> {
        self.last_flag_limit.store(limit, Ordering::SeqCst);
        let mut flags: Vec<Flag> = self
            .flags
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.project_id == project_id)
            .cloned()
            .collect();
        flags.sort_by(|a, b| a.key.cmp(&b.key));
        flags.truncate(usize::try_from(limit).unwrap());
        Ok(flags)
    }

    async fn token(&self, id: Uuid) -> Result<Token, DbError> {
        self.tokens
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("token {id}")))
    }
}

// =============================================================================
// Publisher
// =============================================================================

/// Records published intents; can simulate unacknowledged sends.
#[derive(Default)]
pub struct RecordingPublisher {
    intents: Mutex<Vec<ProvisionIntent>>,
    fail: AtomicBool,
}

impl RecordingPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let publisher = Self::default();
        publisher.fail.store(true, Ordering::SeqCst);
        Arc::new(publisher)
    }

    pub fn intents(&self) -> Vec<ProvisionIntent> {
        self.intents.lock().unwrap().clone()
    }
}

#[async_trait]
impl IntentPublisher for RecordingPublisher {
    async fn publish(&self, intent: ProvisionIntent) -> Result<Delivery, EventError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EventError::PublishFailed {
                topic: intent.topic,
                cause: "Broker: Not enough in-sync replicas".to_string(),
            });
        }
        let mut intents = self.intents.lock().unwrap();
        let delivery = Delivery {
            topic: intent.topic.clone(),
            partition: 0,
            offset: intents.len() as i64,
        };
        intents.push(intent);
        Ok(delivery)
    }
}

// =============================================================================
// Wiring
// =============================================================================

pub fn reconciler(reader: &Arc<MemoryReader>, edge: &Arc<MemoryEdgeStore>) -> Arc<Reconciler> {
    let reader: Arc<dyn EntityReader> = reader.clone();
    let edge: Arc<dyn EdgeStore> = edge.clone();
    Arc::new(Reconciler::new(reader, edge))
}
