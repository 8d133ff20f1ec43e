#![allow(clippy::unwrap_used)]
// Integration tests for `RestClient` using wiremock.

use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use libradash_api::{ApiError, RestClient, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, RestClient) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let client = RestClient::with_client(reqwest::Client::new(), base_url);
    (server, client)
}

// ── GET ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn get_returns_json_body() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/libraries"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 2,
            "libraries": [{"id": "nyc-001"}, {"id": "nyc-002"}]
        })))
        .mount(&server)
        .await;

    let body = client.get("/libraries").await.unwrap();

    assert_eq!(body["total"], 2);
    assert_eq!(body["libraries"][0]["id"], "nyc-001");
}

#[tokio::test]
async fn get_maps_client_error_with_message() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/libraries/missing"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"message": "no such library"})),
        )
        .mount(&server)
        .await;

    let err = client.get("/libraries/missing").await.unwrap_err();

    match err {
        ApiError::Http { status, ref message } => {
            assert_eq!(status, 404);
            assert_eq!(message, "no such library");
        }
        other => panic!("expected Http error, got: {other:?}"),
    }
    assert!(!err.is_transient(), "4xx must not be transient");
}

#[tokio::test]
async fn server_errors_are_transient() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/stats"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client.get("/stats").await.unwrap_err();

    assert_eq!(err.status(), Some(503));
    assert!(err.is_transient(), "5xx must be transient");
}

#[tokio::test]
async fn non_json_success_body_is_a_deserialization_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/stats"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = client.get("/stats").await.unwrap_err();
    assert!(matches!(err, ApiError::Deserialization { .. }));
}

// ── POST / PUT / DELETE ─────────────────────────────────────────────

#[tokio::test]
async fn post_sends_json_body() {
    let (server, client) = setup().await;

    let payload = json!({"primary_library_id": "nyc-001", "setup_complete": true});

    Mock::given(method("POST"))
        .and(path("/configuration"))
        .and(body_json(&payload))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "cfg-1"})))
        .mount(&server)
        .await;

    let body = client.post("/configuration", &payload).await.unwrap();
    assert_eq!(body["id"], "cfg-1");
}

#[tokio::test]
async fn delete_with_empty_body_returns_null() {
    let (server, client) = setup().await;

    Mock::given(method("DELETE"))
        .and(path("/configuration/cfg-1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let body = client.delete("/configuration/cfg-1").await.unwrap();
    assert!(body.is_null());
}

// ── Timeouts ────────────────────────────────────────────────────────

#[tokio::test]
async fn timeout_carries_the_configured_duration() {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();

    let config =
        TransportConfig::new(base_url).with_timeout(std::time::Duration::from_secs(1));
    let client = RestClient::new(&config).unwrap();

    Mock::given(method("GET"))
        .and(path("/stats"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(std::time::Duration::from_millis(1500)),
        )
        .mount(&server)
        .await;

    let err = client.get("/stats").await.unwrap_err();

    match err {
        ApiError::Timeout { timeout_secs } => assert_eq!(timeout_secs, 1),
        other => panic!("expected Timeout error, got: {other:?}"),
    }
    assert!(err.is_transient());
}

// ── Auth header ─────────────────────────────────────────────────────

#[tokio::test]
async fn bearer_token_is_attached() {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();

    let config = TransportConfig::new(base_url)
        .with_api_token("sekrit-token".to_string().into());
    let client = RestClient::new(&config).unwrap();

    Mock::given(method("GET"))
        .and(path("/libraries"))
        .and(header("authorization", "Bearer sekrit-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    client.get("/libraries").await.unwrap();
}
