//! Integration tests for the edge client using wiremock.
//!
//! These tests run the client against a mock Workers KV API and cover bulk
//! writes, deletes, structured failures and retry behaviour.

use std::time::{Duration, Instant};

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vex_edge::{EdgeClient, EdgeConfig, EdgeError, EdgeStore, KvPair, Namespace, RetryConfig};

// =============================================================================
// Test Helpers
// =============================================================================

const BULK_PATH: &str = "/client/v4/accounts/acct-1/storage/kv/namespaces/ns-projects/bulk";

fn create_client(server: &MockServer, retry: RetryConfig) -> EdgeClient {
    let config = EdgeConfig::new("acct-1", "kv-token", "ns-projects", "ns-tokens")
        .with_base_url(format!("{}/client/v4", server.uri()))
        .with_retry(retry);
    EdgeClient::new(config).unwrap()
}

fn fast_retry(max_retries: u32) -> RetryConfig {
    RetryConfig::new(max_retries)
        .with_initial_backoff(1)
        .with_max_backoff(5)
}

fn ok_envelope() -> serde_json::Value {
    json!({"success": true, "errors": [], "messages": [], "result": null})
}

// =============================================================================
// Bulk write
// =============================================================================

#[tokio::test]
async fn test_bulk_write_sends_entries_with_metadata() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path(BULK_PATH))
        .and(header("Authorization", "Bearer kv-token"))
        .and(body_json(json!([
            {"key": "p-1", "value": "{\"a\":{\"value\":\"1\",\"type\":\"NUMBER\"}}", "metadata": "acct-9"}
        ])))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_envelope()))
        .expect(1)
        .mount(&server)
        .await;

    let client = create_client(&server, RetryConfig::disabled());
    let entry = KvPair::new("p-1", r#"{"a":{"value":"1","type":"NUMBER"}}"#)
        .with_metadata(json!("acct-9"));

    client.write(Namespace::Projects, vec![entry]).await.unwrap();
}

#[tokio::test]
async fn test_bulk_write_success_false_is_error_even_with_200() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path(BULK_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "errors": [{"code": 10021, "message": "value too large"}],
            "messages": [{"code": 0, "message": "1 of 1 keys failed"}]
        })))
        .mount(&server)
        .await;

    let client = create_client(&server, RetryConfig::disabled());
    let result = client
        .write(Namespace::Projects, vec![KvPair::new("p-1", "{}")])
        .await;

    match result {
        Err(EdgeError::Rejected { errors, messages }) => {
            assert_eq!(errors[0].code, 10021);
            assert_eq!(messages[0].message, "1 of 1 keys failed");
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn test_bulk_write_http_error() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path(BULK_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&server)
        .await;

    let client = create_client(&server, fast_retry(3));
    let result = client
        .write(Namespace::Projects, vec![KvPair::new("p-1", "{}")])
        .await;

    match result {
        Err(EdgeError::Http { status, body }) => {
            assert_eq!(status, 403);
            assert_eq!(body, "forbidden");
        }
        other => panic!("expected Http error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_bulk_write_undecodable_body() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path(BULK_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let client = create_client(&server, RetryConfig::disabled());
    let result = client
        .write(Namespace::Projects, vec![KvPair::new("p-1", "{}")])
        .await;
    assert!(matches!(result, Err(EdgeError::Decode(_))));
}

// =============================================================================
// Retry
// =============================================================================

#[tokio::test]
async fn test_retries_transient_status_then_succeeds() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path(BULK_PATH))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path(BULK_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_envelope()))
        .with_priority(2)
        .mount(&server)
        .await;

    let client = create_client(&server, fast_retry(3));
    client
        .write(Namespace::Projects, vec![KvPair::new("p-1", "{}")])
        .await
        .unwrap();

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 3);
}

#[tokio::test]
async fn test_retry_budget_exhausted_returns_last_status() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path(BULK_PATH))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let client = create_client(&server, fast_retry(2));
    let result = client
        .write(Namespace::Projects, vec![KvPair::new("p-1", "{}")])
        .await;

    match result {
        Err(err @ EdgeError::Http { status: 502, .. }) => assert!(err.is_transient()),
        other => panic!("expected Http 502, got {other:?}"),
    }
}

#[tokio::test]
async fn test_retry_after_is_capped_by_max_backoff() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path(BULK_PATH))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "8"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path(BULK_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_envelope()))
        .with_priority(2)
        .mount(&server)
        .await;

    let client = create_client(&server, RetryConfig::new(1).with_max_backoff(200));
    let started = Instant::now();
    client
        .write(Namespace::Projects, vec![KvPair::new("p-1", "{}")])
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

// =============================================================================
// Delete
// =============================================================================

#[tokio::test]
async fn test_delete_token_key() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path(
            "/client/v4/accounts/acct-1/storage/kv/namespaces/ns-tokens/values/abc123",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_envelope()))
        .expect(1)
        .mount(&server)
        .await;

    let client = create_client(&server, RetryConfig::disabled());
    client.delete(Namespace::Tokens, "abc123").await.unwrap();
}

#[tokio::test]
async fn test_delete_missing_key_is_noop() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "success": false,
            "errors": [{"code": 10009, "message": "key not found"}],
            "messages": []
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = create_client(&server, RetryConfig::disabled());
    client.delete(Namespace::Projects, "gone").await.unwrap();
    client.delete(Namespace::Projects, "gone").await.unwrap();
}

#[tokio::test]
async fn test_delete_structured_failure() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "errors": [{"code": 10000, "message": "authentication error"}],
            "messages": []
        })))
        .mount(&server)
        .await;

    let client = create_client(&server, RetryConfig::disabled());
    let result = client.delete(Namespace::Projects, "p-1").await;
    assert!(matches!(result, Err(EdgeError::Rejected { .. })));
}
