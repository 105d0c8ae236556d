// ABOUTME: Integration tests for the HTTP surface using in-process tower requests
// ABOUTME: Verifies route payloads, status mapping, and the error body shape

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tower::ServiceExt;

use mesh_core::testing::{MockIdentityService, MockTransport};
use mesh_core::{
    ChatOrchestrator, IdentityIssuer, IdentityService, MemoryStore, Presence, ThreadRegistry,
    User, UserDirectory, UserRole,
};
use meshline::http::{api_router, AppState};
use meshline::responder::CannedResponder;

struct HttpHarness {
    state: Arc<AppState>,
    transport: Arc<MockTransport>,
}

fn user(id: &str, name: &str, role: UserRole) -> User {
    User {
        id: id.to_string(),
        display_name: name.to_string(),
        role,
        accent_color: "#38BDF8".to_string(),
        external_id: None,
        transport_identity: None,
        presence: Presence::Online,
        created_at: Utc::now(),
        last_seen_at: Utc::now(),
    }
}

async fn http_harness() -> HttpHarness {
    let store = Arc::new(MemoryStore::new());
    let directory = UserDirectory::new(store.clone());
    directory
        .seed(&[
            user("fredrick", "Fredrick Maina", UserRole::Human),
            user("assumpta", "Assumpta Wanyama", UserRole::Human),
            user("rohi", "Rohi Ogula", UserRole::Human),
            user("coach-mesh", "Coach MESH", UserRole::Assistant),
        ])
        .await
        .unwrap();

    let registry = ThreadRegistry::new(store);
    let identity = Arc::new(MockIdentityService::new());
    let transport = Arc::new(MockTransport::new());
    let issuer = Arc::new(IdentityIssuer::new(
        directory.clone(),
        identity as Arc<dyn IdentityService>,
    ));
    let orchestrator = Arc::new(ChatOrchestrator::new(
        directory,
        registry,
        issuer,
        transport.clone(),
        "https://transport.example",
    ));

    let (events, _) = broadcast::channel(16);
    let state = Arc::new(AppState {
        orchestrator,
        responder: Arc::new(CannedResponder),
        events,
        started_at: Instant::now(),
    });
    HttpHarness { state, transport }
}

async fn request(h: &HttpHarness, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = api_router(h.state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn health_reports_ok() {
    let h = http_harness().await;
    let (status, body) = request(&h, "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn users_index_lists_humans_and_the_assistant() {
    let h = http_harness().await;
    let (status, body) = request(&h, "GET", "/api/users", None).await;
    assert_eq!(status, StatusCode::OK);

    let names: Vec<&str> = body["users"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["displayName"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec!["Assumpta Wanyama", "Fredrick Maina", "Rohi Ogula"]
    );
    assert_eq!(body["assistant"]["displayName"], "Coach MESH");
    assert_eq!(body["assistant"]["tagline"], "Always-on finance guide");
}

#[tokio::test]
async fn creating_an_ai_thread_returns_the_summary() {
    let h = http_harness().await;
    let (status, body) = request(
        &h,
        "POST",
        "/api/threads",
        Some(json!({ "initiatorId": "fredrick", "mode": "ai" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["thread"]["topic"], "Coach MESH with Fredrick");
    assert_eq!(body["thread"]["mode"], "ai");
    assert_eq!(body["thread"]["unreadCount"], 0);
    assert!(body.get("config").is_none());
}

#[tokio::test]
async fn thread_creation_can_bundle_credentials() {
    let h = http_harness().await;
    let (status, body) = request(
        &h,
        "POST",
        "/api/threads",
        Some(json!({
            "initiatorId": "fredrick",
            "peerId": "assumpta",
            "mode": "user",
            "withConfig": true,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["thread"]["topic"], "Fredrick ↔ Assumpta");
    assert_eq!(body["config"]["endpointUrl"], "https://transport.example");
    assert_eq!(body["config"]["displayName"], "Fredrick Maina");
    assert!(body["config"]["token"].is_string());
}

#[tokio::test]
async fn user_mode_requires_a_peer() {
    let h = http_harness().await;
    let (status, body) = request(
        &h,
        "POST",
        "/api/threads",
        Some(json!({ "initiatorId": "fredrick", "mode": "user" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("peerId is required"));
}

#[tokio::test]
async fn unknown_initiator_maps_to_404() {
    let h = http_harness().await;
    let (status, body) = request(
        &h,
        "POST",
        "/api/threads",
        Some(json!({ "initiatorId": "ghost", "mode": "ai" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("ghost"));
}

#[tokio::test]
async fn chat_config_refuses_outsiders_with_403() {
    let h = http_harness().await;
    let (_, created) = request(
        &h,
        "POST",
        "/api/threads",
        Some(json!({ "initiatorId": "fredrick", "peerId": "assumpta", "mode": "user" })),
    )
    .await;
    let thread_id = created["thread"]["id"].as_str().unwrap();

    let (status, body) = request(
        &h,
        "POST",
        "/api/chat/config",
        Some(json!({ "userId": "rohi", "threadId": thread_id })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].is_string());

    let (status, body) = request(
        &h,
        "POST",
        "/api/chat/config",
        Some(json!({ "userId": "fredrick", "threadId": thread_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["config"]["threadId"], created["thread"]["transportThreadId"]);
}

#[tokio::test]
async fn thread_listing_is_scoped_to_the_user() {
    let h = http_harness().await;
    request(
        &h,
        "POST",
        "/api/threads",
        Some(json!({ "initiatorId": "fredrick", "peerId": "assumpta", "mode": "user" })),
    )
    .await;

    let (status, body) = request(&h, "GET", "/api/users/fredrick/threads", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["threads"].as_array().unwrap().len(), 1);

    let (status, body) = request(&h, "GET", "/api/users/rohi/threads", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["threads"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn ai_message_route_delivers_a_reply() {
    let h = http_harness().await;
    let (status, _) = request(
        &h,
        "POST",
        "/api/ai/messages",
        Some(json!({
            "senderUserId": "fredrick",
            "messageText": "How am I doing this month?",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let sent = h.transport.sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].sender_display_name, "Coach MESH");
    assert!(sent[0].body.contains("Fredrick"));
}

#[tokio::test]
async fn typing_route_requires_a_receiver() {
    let h = http_harness().await;
    let (status, body) = request(&h, "POST", "/api/ai/typing", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "receiverUserId is required");

    let (status, _) = request(
        &h,
        "POST",
        "/api/ai/typing",
        Some(json!({ "receiverUserId": "  " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = request(
        &h,
        "POST",
        "/api/ai/typing",
        Some(json!({ "receiverUserId": "fredrick" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert!(h.transport.typing_count() >= 1);
}

#[tokio::test]
async fn transport_events_are_republished_to_subscribers() {
    let h = http_harness().await;
    let mut rx = h.state.events.subscribe();

    let (status, body) = request(
        &h,
        "POST",
        "/api/transport/events",
        Some(json!({
            "messageId": "m1",
            "threadId": "19:thread-0001",
            "senderId": "8:mesh:0001",
            "body": "hello",
            "direction": "sent",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let event = rx.recv().await.unwrap();
    assert_eq!(event.message_id, "m1");
    assert_eq!(event.transport_thread_id, "19:thread-0001");
}

#[tokio::test]
async fn events_without_subscribers_are_still_accepted() {
    let h = http_harness().await;
    let (status, body) = request(
        &h,
        "POST",
        "/api/transport/events",
        Some(json!({
            "messageId": "m1",
            "threadId": "19:thread-0001",
            "body": "hello",
            "direction": "received",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
}
