//! Reconciliation behaviour through the message handlers.
//!
//! Messages are dispatched exactly as the consumer group would, using the
//! registry built by `build_registry`.

mod common;

use std::sync::Arc;

use common::{reconciler, EdgeCall, MemoryEdgeStore, MemoryReader};
use uuid::Uuid;
use vex_db::{FlagType, Token};
use vex_edge::Namespace;
use vex_events::{DispatchOutcome, Dispatcher, InboundMessage, Operation, TopicConfig};
use vex_provisioning::{build_registry, ProvisionMetrics, FLAG_PAGE_LIMIT};

// =============================================================================
// Helpers
// =============================================================================

struct Harness {
    reader: Arc<MemoryReader>,
    edge: Arc<MemoryEdgeStore>,
    topics: TopicConfig,
    metrics: ProvisionMetrics,
    dispatcher: Dispatcher,
}

impl Harness {
    fn new() -> Self {
        let reader = MemoryReader::new();
        let edge = MemoryEdgeStore::new();
        let topics = TopicConfig::default();
        let metrics = ProvisionMetrics::default();
        let registry =
            build_registry(&topics, reconciler(&reader, &edge), Some(metrics.clone())).unwrap();

        Self {
            reader,
            edge,
            topics,
            metrics,
            dispatcher: Dispatcher::new(Arc::new(registry)),
        }
    }

    async fn send(&self, operation: Operation, payload: impl Into<Vec<u8>>) -> DispatchOutcome {
        let message = InboundMessage::new(self.topics.topic_for(operation), 0, 0, payload.into());
        self.dispatcher.dispatch(&message).await
    }

    fn snapshot(&self, project_id: Uuid) -> Option<String> {
        self.edge.value(Namespace::Projects, &project_id.to_string())
    }
}

// =============================================================================
// Projects
// =============================================================================

#[tokio::test]
async fn test_provision_project_writes_snapshot_with_account_metadata() {
    let h = Harness::new();
    let account = Uuid::new_v4();
    let project = h.reader.add_project(account);
    h.reader.add_flag(&project, "a", FlagType::Number, "1");

    let outcome = h
        .send(Operation::ProvisionProject, project.id.to_string())
        .await;
    assert_eq!(outcome, DispatchOutcome::Handled);

    let entry = h
        .edge
        .get(Namespace::Projects, &project.id.to_string())
        .unwrap();
    assert_eq!(entry.value, r#"{"a":{"value":"1","type":"NUMBER"}}"#);
    assert_eq!(
        entry.metadata,
        Some(serde_json::Value::String(account.to_string()))
    );
    assert_eq!(h.metrics.count(Operation::ProvisionProject, true), 1);
}

#[tokio::test]
async fn test_snapshot_follows_flag_deletion() {
    let h = Harness::new();
    let project = h.reader.add_project(Uuid::new_v4());
    h.reader.add_flag(&project, "a", FlagType::Number, "1");
    let b = h.reader.add_flag(&project, "b", FlagType::Boolean, "true");

    h.send(Operation::ProvisionProject, project.id.to_string())
        .await;
    assert_eq!(
        h.snapshot(project.id).unwrap(),
        r#"{"a":{"value":"1","type":"NUMBER"},"b":{"value":"true","type":"BOOLEAN"}}"#
    );

    h.reader.remove_flag(b.id);
    h.send(Operation::ProvisionProject, project.id.to_string())
        .await;
    assert_eq!(
        h.snapshot(project.id).unwrap(),
        r#"{"a":{"value":"1","type":"NUMBER"}}"#
    );
    assert_eq!(h.edge.len(), 1);
}

#[tokio::test]
async fn test_snapshot_is_capped_at_flag_page_limit() {
    let h = Harness::new();
    let project = h.reader.add_project(Uuid::new_v4());
    for i in 0..=FLAG_PAGE_LIMIT {
        h.reader
            .add_flag(&project, &format!("flag-{i:04}"), FlagType::String, "on");
    }

    let outcome = h
        .send(Operation::ProvisionProject, project.id.to_string())
        .await;
    assert_eq!(outcome, DispatchOutcome::Handled);
    assert_eq!(h.reader.last_flag_limit(), 1000);

    let snapshot: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(&h.snapshot(project.id).unwrap()).unwrap();
    assert_eq!(snapshot.len(), 1000);
    assert!(snapshot.contains_key("flag-0999"));
    assert!(!snapshot.contains_key("flag-1000"));
}

#[tokio::test]
async fn test_provisioning_twice_is_byte_identical() {
    let h = Harness::new();
    let project = h.reader.add_project(Uuid::new_v4());
    h.reader.add_flag(&project, "beta", FlagType::Boolean, "false");
    h.reader.add_flag(&project, "alpha", FlagType::String, "blue");

    h.send(Operation::ProvisionProject, project.id.to_string())
        .await;
    h.send(Operation::ProvisionProject, project.id.to_string())
        .await;

    let writes: Vec<String> = h
        .edge
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            EdgeCall::Write(Namespace::Projects, entries) => Some(entries[0].value.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0], writes[1]);
}

#[tokio::test]
async fn test_redelivery_converges_to_single_delivery_state() {
    let once = Harness::new();
    let many = Harness::new();
    let account = Uuid::new_v4();

    let once_project = once.reader.add_project(account);
    once.reader.add_flag(&once_project, "limit", FlagType::Number, "10");
    let many_project = many.reader.add_project(account);
    many.reader.add_flag(&many_project, "limit", FlagType::Number, "10");

    once.send(Operation::ProvisionProject, once_project.id.to_string())
        .await;
    for _ in 0..5 {
        many.send(Operation::ProvisionProject, many_project.id.to_string())
            .await;
    }

    assert_eq!(once.edge.len(), 1);
    assert_eq!(many.edge.len(), 1);
    assert_eq!(once.snapshot(once_project.id), many.snapshot(many_project.id));
}

#[tokio::test]
async fn test_reprovision_replaces_whole_snapshot() {
    let h = Harness::new();
    let project = h.reader.add_project(Uuid::new_v4());
    let old = h.reader.add_flag(&project, "old", FlagType::String, "x");
    h.send(Operation::ProvisionProject, project.id.to_string())
        .await;
    assert!(h.snapshot(project.id).unwrap().contains("\"old\""));

    h.reader.remove_flag(old.id);
    h.reader.add_flag(&project, "new", FlagType::Boolean, "true");
    h.send(Operation::ProvisionProject, project.id.to_string())
        .await;

    let snapshot = h.snapshot(project.id).unwrap();
    assert!(!snapshot.contains("\"old\""));
    assert_eq!(snapshot, r#"{"new":{"value":"true","type":"BOOLEAN"}}"#);
}

#[tokio::test]
async fn test_deprovision_project_removes_record_and_is_repeatable() {
    let h = Harness::new();
    let project = h.reader.add_project(Uuid::new_v4());
    h.send(Operation::ProvisionProject, project.id.to_string())
        .await;
    assert!(h.snapshot(project.id).is_some());

    for _ in 0..2 {
        let outcome = h
            .send(Operation::DeprovisionProject, project.id.to_string())
            .await;
        assert_eq!(outcome, DispatchOutcome::Handled);
    }
    assert!(h.snapshot(project.id).is_none());
    assert_eq!(h.metrics.count(Operation::DeprovisionProject, true), 2);
}

#[tokio::test]
async fn test_missing_project_fails_and_counts_error() {
    let h = Harness::new();
    let outcome = h
        .send(Operation::ProvisionProject, Uuid::new_v4().to_string())
        .await;

    assert!(matches!(outcome, DispatchOutcome::Failed(ref cause) if cause.contains("Not found")));
    assert_eq!(h.metrics.count(Operation::ProvisionProject, false), 1);
    assert_eq!(h.edge.len(), 0);
}

#[tokio::test]
async fn test_edge_rejection_is_a_handler_failure() {
    let h = Harness::new();
    let project = h.reader.add_project(Uuid::new_v4());
    h.edge.reject_writes(true);

    let outcome = h
        .send(Operation::ProvisionProject, project.id.to_string())
        .await;

    assert!(!outcome.acknowledges());
    assert_eq!(h.metrics.count(Operation::ProvisionProject, false), 1);
}

#[tokio::test]
async fn test_malformed_payload_is_a_handler_failure() {
    let h = Harness::new();
    let outcome = h.send(Operation::ProvisionProject, "p-1").await;
    assert!(matches!(outcome, DispatchOutcome::Failed(ref cause) if cause.contains("payload")));
}

// =============================================================================
// Flags
// =============================================================================

#[tokio::test]
async fn test_flag_event_rerenders_parent_project() {
    let h = Harness::new();
    let project = h.reader.add_project(Uuid::new_v4());
    h.reader.add_flag(&project, "a", FlagType::Number, "1");
    let flag = h.reader.add_flag(&project, "b", FlagType::String, "on");

    let outcome = h
        .send(Operation::ProvisionFlag, serde_json::to_vec(&flag).unwrap())
        .await;
    assert_eq!(outcome, DispatchOutcome::Handled);
    assert_eq!(
        h.snapshot(project.id).unwrap(),
        r#"{"a":{"value":"1","type":"NUMBER"},"b":{"value":"on","type":"STRING"}}"#
    );

    h.reader.remove_flag(flag.id);
    let outcome = h
        .send(Operation::DeprovisionFlag, serde_json::to_vec(&flag).unwrap())
        .await;
    assert_eq!(outcome, DispatchOutcome::Handled);
    assert_eq!(
        h.snapshot(project.id).unwrap(),
        r#"{"a":{"value":"1","type":"NUMBER"}}"#
    );
    assert_eq!(h.metrics.count(Operation::DeprovisionFlag, true), 1);
}

#[tokio::test]
async fn test_flag_event_for_deleted_project_removes_snapshot() {
    let h = Harness::new();
    let project = h.reader.add_project(Uuid::new_v4());
    let flag = h.reader.add_flag(&project, "a", FlagType::Number, "1");
    h.send(Operation::ProvisionProject, project.id.to_string())
        .await;

    h.reader.remove_project(project.id);
    let outcome = h
        .send(Operation::DeprovisionFlag, serde_json::to_vec(&flag).unwrap())
        .await;

    assert_eq!(outcome, DispatchOutcome::Handled);
    assert!(h.snapshot(project.id).is_none());
}

// =============================================================================
// Tokens
// =============================================================================

#[tokio::test]
async fn test_token_lifecycle_keyed_by_hex_hash() {
    let h = Harness::new();
    let account = Uuid::new_v4();
    let (secret, token) = h.reader.add_token(account);

    let outcome = h
        .send(Operation::ProvisionToken, token.id.to_string())
        .await;
    assert_eq!(outcome, DispatchOutcome::Handled);

    // Edge code hashes the bearer secret and looks it up directly.
    let lookup = hex::encode(Token::hash_secret(&secret));
    assert_eq!(
        h.edge.value(Namespace::Tokens, &lookup),
        Some(account.to_string())
    );

    let outcome = h.send(Operation::DeprovisionToken, token.edge_key()).await;
    assert_eq!(outcome, DispatchOutcome::Handled);
    assert!(h.edge.value(Namespace::Tokens, &lookup).is_none());
}

#[tokio::test]
async fn test_token_deprovision_accepts_raw_hash() {
    let h = Harness::new();
    let (_, token) = h.reader.add_token(Uuid::new_v4());
    h.send(Operation::ProvisionToken, token.id.to_string())
        .await;

    let outcome = h
        .send(Operation::DeprovisionToken, token.token_hash.clone())
        .await;

    assert_eq!(outcome, DispatchOutcome::Handled);
    assert_eq!(
        h.edge.calls().last(),
        Some(&EdgeCall::Delete(Namespace::Tokens, token.edge_key()))
    );
}
