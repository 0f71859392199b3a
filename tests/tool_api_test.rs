// Integration tests for the HTTP tool surface.
//
// Requests go through the full router with tower::ServiceExt::oneshot; the
// engine is fed directly instead of through an upstream connection.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use entity_watch::{
    api::{create_router, WatchAppState},
    clock::{ManualClock, SharedClock},
    config::EngineConfig,
    engine::WatchEngine,
    state::EntitySnapshot,
    upstream::UpstreamEvent,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

// ── Helpers ──────────────────────────────────────────────────────────────────

fn setup() -> (Router, Arc<WatchEngine>, ManualClock) {
    let clock = ManualClock::default();
    let shared: SharedClock = Arc::new(clock.clone());
    let engine = Arc::new(WatchEngine::new(EngineConfig::default(), shared));
    let state = Arc::new(WatchAppState::new(Arc::clone(&engine), 16));
    (create_router(state), engine, clock)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn snap(id: &str, state: &str) -> EntitySnapshot {
    EntitySnapshot::new(id, state, chrono::Utc::now())
}

async fn subscribe(app: &Router, body: Value) -> String {
    let (status, resp) = send(app, json_request("POST", "/api/subscriptions", body)).await;
    assert_eq!(status, StatusCode::CREATED);
    resp["subscriptionId"].as_str().unwrap().to_string()
}

// ── subscribe / list / unsubscribe ───────────────────────────────────────────

#[tokio::test]
async fn test_subscribe_with_empty_entities_is_bad_request() {
    let (app, _engine, _clock) = setup();

    let (status, body) = send(
        &app,
        json_request("POST", "/api/subscriptions", json!({"entityIds": []})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_argument");
}

#[tokio::test]
async fn test_subscribe_with_out_of_range_ttl_is_bad_request() {
    let (app, engine, _clock) = setup();

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/subscriptions",
            json!({"entityIds": ["light.kitchen"], "ttlSeconds": 10_000_000_000_000u64}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_argument");
    assert_eq!(engine.subscription_count(), 0);
}

#[tokio::test]
async fn test_subscribe_list_unsubscribe_roundtrip() {
    let (app, _engine, _clock) = setup();

    let id = subscribe(
        &app,
        json!({
            "entityIds": ["light.kitchen"],
            "filter": {"stateChange": true},
            "ttlSeconds": 60
        }),
    )
    .await;

    let (status, list) = send(&app, empty_request("GET", "/api/subscriptions")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["subscriptionId"], id.as_str());
    assert_eq!(list[0]["entityIds"], json!(["light.kitchen"]));
    assert_eq!(list[0]["filter"]["stateChange"], true);
    assert!(list[0]["expiresAt"].is_string());

    let uri = format!("/api/subscriptions/{}", id);
    let (_, body) = send(&app, empty_request("DELETE", &uri)).await;
    assert_eq!(body, json!({"removed": true}));

    let (_, body) = send(&app, empty_request("DELETE", &uri)).await;
    assert_eq!(body, json!({"removed": false}));
}

// ── recent changes ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_recent_changes_for_subscription() {
    let (app, engine, _clock) = setup();
    let id = subscribe(
        &app,
        json!({"entityIds": ["light.kitchen"], "filter": {"stateChange": true}}),
    )
    .await;

    engine.ingest(snap("light.kitchen", "off"));
    engine.ingest(snap("light.kitchen", "on"));

    let (status, changes) = send(
        &app,
        json_request("POST", "/api/changes", json!({"subscriptionId": id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(changes.as_array().unwrap().len(), 1);
    assert_eq!(changes[0]["stateChanged"], true);
    assert_eq!(changes[0]["current"]["state"], "on");
    assert_eq!(changes[0]["previous"]["state"], "off");

    // Cursor advanced
    let (_, changes) = send(
        &app,
        json_request("POST", "/api/changes", json!({"subscriptionId": id})),
    )
    .await;
    assert_eq!(changes, json!([]));
}

#[tokio::test]
async fn test_recent_changes_unknown_subscription_is_not_found() {
    let (app, _engine, _clock) = setup();

    let (status, body) = send(
        &app,
        json_request("POST", "/api/changes", json!({"subscriptionId": "nope"})),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn test_global_recent_changes_without_subscription() {
    let (app, engine, _clock) = setup();
    engine.ingest(snap("sensor.temp", "20"));
    engine.ingest(snap("sensor.temp", "21"));
    engine.ingest(snap("sensor.humidity", "40"));

    let (_, changes) = send(&app, json_request("POST", "/api/changes", json!({}))).await;
    assert_eq!(changes.as_array().unwrap().len(), 1);
    assert_eq!(changes[0]["entityId"], "sensor.temp");

    let (_, changes) = send(
        &app,
        json_request(
            "POST",
            "/api/changes",
            json!({"entityIds": ["sensor.humidity"], "includeUnchanged": true}),
        ),
    )
    .await;
    assert_eq!(changes.as_array().unwrap().len(), 1);
    assert_eq!(changes[0]["entityId"], "sensor.humidity");
    assert_eq!(changes[0]["stateChanged"], false);
}

// ── entities / health ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_get_entity_snapshot() {
    let (app, engine, _clock) = setup();
    engine.ingest(snap("light.kitchen", "on").with_attribute("brightness", json!(200)));

    let (status, body) = send(&app, empty_request("GET", "/api/entities/light.kitchen")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "on");
    assert_eq!(body["attributes"]["brightness"], 200);

    let (status, _) = send(&app, empty_request("GET", "/api/entities/light.none")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_reflects_upstream_state() {
    let (app, engine, _clock) = setup();

    let (status, body) = send(&app, empty_request("GET", "/api/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["kind"], "upstream_unavailable");

    engine.handle_upstream(UpstreamEvent::Connected);
    let (status, body) = send(&app, empty_request("GET", "/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["upstreamAvailable"], true);
}

// ── callbacks ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_register_and_unregister_callback() {
    let (app, _engine, _clock) = setup();

    let (status, body) = send(&app, empty_request("PUT", "/api/callbacks/agent-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"callbackId": "agent-1", "replaced": false}));

    let (_, body) = send(&app, empty_request("PUT", "/api/callbacks/agent-1")).await;
    assert_eq!(body["replaced"], true);

    let (_, body) = send(&app, empty_request("DELETE", "/api/callbacks/agent-1")).await;
    assert_eq!(body, json!({"removed": true}));

    let (_, body) = send(&app, empty_request("DELETE", "/api/callbacks/agent-1")).await;
    assert_eq!(body, json!({"removed": false}));
}

#[tokio::test]
async fn test_callback_stream_upgrade_requires_websocket() {
    let (app, _engine, _clock) = setup();
    send(&app, empty_request("PUT", "/api/callbacks/agent-1")).await;

    // Plain GET without upgrade headers is rejected by the WebSocket extractor
    let resp = app
        .clone()
        .oneshot(empty_request("GET", "/api/callbacks/agent-1/ws"))
        .await
        .unwrap();
    assert!(resp.status().is_client_error());
}
