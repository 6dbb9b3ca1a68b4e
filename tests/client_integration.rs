//! Integration tests for the connector HTTP client against a mock server:
//! header wiring, status categorization, Retry-After parsing, timeouts, and
//! cancellation.

use std::time::Duration;

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use comradarr_core::{
    Connector, ConnectorClient, ConnectorError, ConnectorId, ConnectorKind, NetworkReason,
    RequestOptions,
};

/// Enables log capture for failing tests via `RUST_LOG`.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

fn connector_for(server: &MockServer) -> Connector {
    init_tracing();
    Connector::new(
        ConnectorId(1),
        ConnectorKind::Series,
        "test",
        server.uri(),
        "secret-key",
    )
}

async fn client_for(server: &MockServer) -> ConnectorClient {
    ConnectorClient::new(&connector_for(server)).expect("client")
}

#[tokio::test]
async fn test_get_decodes_json_and_sends_api_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/system/status"))
        .and(header("X-Api-Key", "secret-key"))
        .and(header("Accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"version": "4.0.0"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let value: Value = client
        .request("system/status", RequestOptions::get())
        .await
        .expect("request");
    assert_eq!(value["version"], "4.0.0");
}

#[tokio::test]
async fn test_post_sends_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v3/command"))
        .and(body_json(json!({"name": "RefreshSeries"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 9})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let value: Value = client
        .request("command", RequestOptions::post(json!({"name": "RefreshSeries"})))
        .await
        .expect("request");
    assert_eq!(value["id"], 9);
}

#[tokio::test]
async fn test_401_maps_to_authentication() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let result: Result<Value, _> = client.request("series", RequestOptions::get()).await;
    assert!(matches!(result, Err(ConnectorError::Authentication { .. })));
}

#[tokio::test]
async fn test_404_maps_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let result: Result<Value, _> = client.request("series/999", RequestOptions::get()).await;
    assert!(matches!(result, Err(ConnectorError::NotFound { .. })));
}

#[tokio::test]
async fn test_429_carries_retry_after_seconds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let result: Result<Value, _> = client.request("series", RequestOptions::get()).await;
    match result {
        Err(ConnectorError::RateLimit { retry_after, .. }) => {
            assert_eq!(retry_after, Some(Duration::from_secs(7)));
        }
        other => panic!("expected RateLimit, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_429_without_header_has_no_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let result: Result<Value, _> = client.request("series", RequestOptions::get()).await;
    match result {
        Err(ConnectorError::RateLimit { retry_after, .. }) => assert_eq!(retry_after, None),
        other => panic!("expected RateLimit, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_5xx_maps_to_server_with_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let result: Result<Value, _> = client.request("series", RequestOptions::get()).await;
    match result {
        Err(ConnectorError::Server { status, .. }) => assert_eq!(status, 503),
        other => panic!("expected Server, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_slow_response_hits_internal_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let result: Result<Value, _> = client
        .request(
            "series",
            RequestOptions::get().with_timeout(Duration::from_millis(100)),
        )
        .await;
    match result {
        Err(ConnectorError::Timeout { timeout }) => {
            assert_eq!(timeout, Duration::from_millis(100));
        }
        other => panic!("expected Timeout, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_external_cancel_aborts_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let cancel = CancellationToken::new();
    let request = client.request::<Value>(
        "series",
        RequestOptions::get()
            .with_timeout(Duration::from_secs(30))
            .with_cancel(cancel.clone()),
    );

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let result = request.await;
    match result {
        Err(ConnectorError::Network { reason, message }) => {
            assert_eq!(reason, NetworkReason::Unknown);
            assert_eq!(message, "request cancelled");
        }
        other => panic!("expected cancellation error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_non_json_success_body_is_decode_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let result: Result<Value, _> = client.request("series", RequestOptions::get()).await;
    assert!(matches!(result, Err(ConnectorError::Network { .. })));
}

#[tokio::test]
async fn test_connection_refused_is_classified() {
    // Nothing listens on the reserved discard port.
    let connector = Connector::new(
        ConnectorId(1),
        ConnectorKind::Series,
        "down",
        "http://127.0.0.1:9",
        "key",
    );
    let client = ConnectorClient::new(&connector).expect("client");
    let result: Result<Value, _> = client.request("series", RequestOptions::get()).await;
    match result {
        Err(ConnectorError::Network { reason, .. }) => {
            assert_eq!(reason, NetworkReason::ConnectionRefused);
        }
        other => panic!("expected Network error, got: {other:?}"),
    }
}

// ==================== Ping Tests ====================

#[tokio::test]
async fn test_ping_success_without_api_prefix() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "OK"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    assert!(client.ping().await);
}

#[tokio::test]
async fn test_ping_error_status_is_false() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    assert!(!client.ping().await);
}

#[tokio::test]
async fn test_ping_unreachable_is_false() {
    let connector = Connector::new(
        ConnectorId(1),
        ConnectorKind::Series,
        "down",
        "http://127.0.0.1:9",
        "key",
    );
    let client = ConnectorClient::new(&connector).expect("client");
    assert!(!client.ping().await);
}
