//! API Endpoint Tests
//!
//! Routes are driven through the router with in-memory stores and stub
//! HTTP collaborators.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use hq_api::create_router;
use hq_common::{Message, ReceivedRecord};
use hq_config::QueueConfig;
use hq_delivery::{DeliveryTransport, GatewayResolver, OriginClient, OriginError, ResolveError, TransportError};
use hq_engine::{QueueService, Remotes, Stores};
use hq_store::MemoryStore;

struct StubRemote;

#[async_trait]
impl GatewayResolver for StubRemote {
    async fn resolve(&self, _gateway: &str, _app_scope_id: &str) -> Result<String, ResolveError> {
        Ok("/db-1".to_string())
    }
}

#[async_trait]
impl DeliveryTransport for StubRemote {
    async fn deliver(&self, _address: &str, _message: &Message) -> Result<u16, TransportError> {
        Ok(200)
    }
}

#[async_trait]
impl OriginClient for StubRemote {
    async fn push_status(&self, _origin: &str, _subject: &str, _status: bool) -> Result<(), OriginError> {
        Ok(())
    }

    async fn push_received(&self, _origin: &str, _record: &ReceivedRecord) -> Result<(), OriginError> {
        Ok(())
    }
}

fn create_test_app() -> Router {
    let config = QueueConfig::new("memory://", "http://sserver", "admin", "app-1");
    let store = Arc::new(MemoryStore::new());
    let remote = Arc::new(StubRemote);

    let service = QueueService::new(
        &config,
        Stores {
            messages: store.clone(),
            statuses: store.clone(),
            publishers: store.clone(),
            received: store,
        },
        Remotes {
            resolver: remote.clone(),
            transport: remote.clone(),
            origin: remote,
        },
    );
    create_router(Arc::new(service))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let body = match body {
        Some(value) => Body::from(value.to_string()),
        None => Body::empty(),
    };
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "text/plain")
        .body(body)
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn outbound() -> Value {
    json!({
        "subject": "S1",
        "gateway": "G1",
        "method": "POST",
        "content": [{"a": 1}],
        "server": "origin1"
    })
}

// ============================================================================
// Queue
// ============================================================================

#[tokio::test]
async fn test_status_endpoint() {
    let app = create_test_app();
    let (status, body) = send(&app, Method::GET, "/", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["running"], true);
    assert_eq!(body["pendingMore"], false);
    assert_eq!(body["counts"]["pending"], 0);
}

#[tokio::test]
async fn test_command_requires_admin_key() {
    let app = create_test_app();

    let (status, body) = send(&app, Method::POST, "/cmd/stop", Some(json!({"key": "wrong"}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!({"code": 403, "message": "not authorized"}));

    let (status, _) = send(&app, Method::POST, "/cmd/stop", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, Method::POST, "/cmd/stop", Some(json!({"key": "admin"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["running"], false);

    let (status, body) = send(&app, Method::POST, "/cmd/start", Some(json!({"key": "admin"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["running"], true);
}

#[tokio::test]
async fn test_unknown_command() {
    let app = create_test_app();
    let (status, body) = send(&app, Method::POST, "/cmd/pause", Some(json!({"key": "admin"}))).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["code"], 405);
}

// ============================================================================
// Messages
// ============================================================================

#[tokio::test]
async fn test_add_and_list_messages() {
    let app = create_test_app();
    send(&app, Method::POST, "/cmd/stop", Some(json!({"key": "admin"}))).await;

    let (status, body) = send(&app, Method::POST, "/msg", Some(outbound())).await;
    assert_eq!(status, StatusCode::OK);
    let id = body["_id"].as_str().unwrap().to_string();
    assert!(body.get("send").is_none());

    let (status, page) = send(&app, Method::GET, "/msg?pg=1&offset=10", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["nb"], 1);
    assert_eq!(page["pg"], 1);
    assert_eq!(page["offset"], 10);
    assert_eq!(page["items"][0]["_id"], id.as_str());

    let (_, page) = send(&app, Method::GET, "/msg?filter=sent", None).await;
    assert_eq!(page["nb"], 0);

    let (status, _) = send(&app, Method::DELETE, &format!("/msg/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&app, Method::DELETE, &format!("/msg/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);
}

#[tokio::test]
async fn test_add_message_bad_format() {
    let app = create_test_app();
    let (status, body) = send(&app, Method::POST, "/msg", Some(json!({"subject": "S1"}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "bad format");
    assert!(body["detail"].as_array().unwrap().len() >= 4);
}

#[tokio::test]
async fn test_add_message_invalid_json() {
    let app = create_test_app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/msg")
        .body(Body::from("{not json"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_clear_pending() {
    let app = create_test_app();
    send(&app, Method::POST, "/cmd/stop", Some(json!({"key": "admin"}))).await;
    send(&app, Method::POST, "/msg", Some(outbound())).await;

    let (status, body) = send(&app, Method::DELETE, "/msg/all", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 200);

    let (_, page) = send(&app, Method::GET, "/msg?filter=all", None).await;
    assert_eq!(page["nb"], 0);
}

// ============================================================================
// Publishers
// ============================================================================

#[tokio::test]
async fn test_publisher_lifecycle() {
    let app = create_test_app();
    let admin = Some(json!({"key": "admin"}));

    let (status, created) = send(&app, Method::POST, "/register/create", admin.clone()).await;
    assert_eq!(status, StatusCode::OK);
    let key = created["key"].as_str().unwrap().to_string();

    let (status, list) = send(&app, Method::POST, "/register", admin.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list, json!([{"key": key}]));

    let uri = format!("/register/{}", key);
    let (status, _) = send(&app, Method::DELETE, &uri, admin.clone()).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::DELETE, &uri, admin).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::POST, "/register", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// ============================================================================
// Relay
// ============================================================================

#[tokio::test]
async fn test_relay_unknown_type() {
    let app = create_test_app();
    let (status, body) = send(&app, Method::POST, "/bogus", Some(json!({"hhr": "H1", "id": "r1"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
    assert_eq!(body["message"], "unknown message type: bogus");
}

#[tokio::test]
async fn test_relay_unknown_subject() {
    let app = create_test_app();
    let (status, body) = send(&app, Method::POST, "/messageRead", Some(json!({"hhr": "H1", "id": "r1"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
}

#[tokio::test]
async fn test_relay_to_known_subject() {
    let app = create_test_app();
    let mut init = outbound();
    init["subject"] = json!("H1");
    init["init"] = json!(true);
    send(&app, Method::POST, "/msg", Some(init)).await;

    let (status, body) = send(&app, Method::POST, "/messageRead", Some(json!({"hhr": "H1", "id": "r1"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "messageRead");
    assert_eq!(body["transfered"], true);
}
