//! Relay Flow Integration Tests
//!
//! Tests the subscription cascade end to end: board event in, topic
//! requests out, rounds published to the store and served over HTTP.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use autodarts_relay::infrastructure::autodarts::messages::{RequestKind, StreamMessage};
use autodarts_relay::infrastructure::autodarts::relay::{MatchRelay, RelayAction};
use autodarts_relay::infrastructure::autodarts::stream::{ConnectionState, StreamStatus};
use autodarts_relay::infrastructure::broadcast::RoundHub;
use autodarts_relay::infrastructure::http::{RelayServerState, router};
use autodarts_relay::{Round, RoundStore};

fn message(json: &str) -> StreamMessage {
    serde_json::from_str(json).unwrap()
}

fn sent_request(action: &RelayAction) -> (&RequestKind, &str, &str) {
    match action {
        RelayAction::Send(req) => (&req.kind, req.channel.as_str(), req.topic.as_str()),
        RelayAction::Publish(_) => panic!("expected a topic request, got a publish"),
    }
}

#[test]
fn full_match_lifecycle_cascade() {
    let mut relay = MatchRelay::new("board-7".to_string());

    // Fresh connection subscribes the board topic
    let actions = relay.on_open();
    assert_eq!(actions.len(), 1);
    assert_eq!(
        sent_request(&actions[0]),
        (&RequestKind::Subscribe, "autodarts.boards", "board-7.matches")
    );

    // A match starts: follow its state topic
    let actions = relay.on_message(message(
        r#"{"channel":"autodarts.boards","topic":"board-7.matches","data":{"event":"start","id":"m-9"}}"#,
    ));
    assert_eq!(actions.len(), 1);
    assert_eq!(
        sent_request(&actions[0]),
        (&RequestKind::Subscribe, "autodarts.matches", "m-9.state")
    );

    // State updates publish the most recent turn
    let actions = relay.on_message(message(
        r#"{"channel":"autodarts.matches","topic":"m-9.state","data":{"turns":[{"player":"Alice","score":420},{"player":"Bob","score":501}]}}"#,
    ));
    assert_eq!(actions.len(), 1);
    match &actions[0] {
        RelayAction::Publish(round) => {
            assert_eq!(round.player.as_deref(), Some("Alice"));
            assert_eq!(round.score, Some(420));
        }
        other => panic!("expected a publish, got {other:?}"),
    }

    // The match finishes: drop its state topic
    let actions = relay.on_message(message(
        r#"{"channel":"autodarts.boards","topic":"board-7.matches","data":{"event":"finish","id":"m-9"}}"#,
    ));
    assert_eq!(actions.len(), 1);
    assert_eq!(
        sent_request(&actions[0]),
        (&RequestKind::Unsubscribe, "autodarts.matches", "m-9.state")
    );

    // Updates after the finish are dropped
    let actions = relay.on_message(message(
        r#"{"channel":"autodarts.matches","topic":"m-9.state","data":{"turns":[{"score":1}]}}"#,
    ));
    assert!(actions.is_empty());
}

#[test]
fn new_match_replaces_previous_subscription() {
    let mut relay = MatchRelay::new("board-7".to_string());
    relay.on_open();
    relay.on_message(message(
        r#"{"channel":"autodarts.boards","data":{"event":"start","id":"m-1"}}"#,
    ));

    let actions = relay.on_message(message(
        r#"{"channel":"autodarts.boards","data":{"event":"start","id":"m-2"}}"#,
    ));
    assert_eq!(actions.len(), 2);
    assert_eq!(
        sent_request(&actions[0]),
        (&RequestKind::Unsubscribe, "autodarts.matches", "m-1.state")
    );
    assert_eq!(
        sent_request(&actions[1]),
        (&RequestKind::Subscribe, "autodarts.matches", "m-2.state")
    );
}

fn test_state() -> (Arc<RoundStore>, Arc<RoundHub>, Arc<StreamStatus>, Arc<RelayServerState>) {
    let store = Arc::new(RoundStore::new());
    let hub = Arc::new(RoundHub::with_defaults());
    let status = Arc::new(StreamStatus::new());
    let state = Arc::new(RelayServerState::new(
        "0.0.0-test".to_string(),
        Arc::clone(&store),
        Arc::clone(&hub),
        Arc::clone(&status),
    ));
    (store, hub, status, state)
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, value)
}

#[tokio::test]
async fn round_endpoint_is_empty_before_first_round() {
    let (_store, _hub, _status, state) = test_state();
    let (status, body) = get(router(state), "/round").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({}));
}

#[tokio::test]
async fn round_endpoint_serves_latest_round() {
    let (store, _hub, _status, state) = test_state();

    store.publish(Round {
        player: Some("Alice".to_string()),
        score: Some(420),
        ..Round::default()
    });
    store.publish(Round {
        player: Some("Bob".to_string()),
        score: Some(381),
        ..Round::default()
    });

    let (status, body) = get(router(state), "/round").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["player"], "Bob");
    assert_eq!(body["score"], 381);
}

#[tokio::test]
async fn health_reports_stream_connection() {
    let (_store, _hub, status_handle, state) = test_state();

    let (status, body) = get(router(Arc::clone(&state)), "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["stream"]["state"], "disconnected");

    status_handle.set_state(ConnectionState::Connected);
    status_handle.record_round();

    let (status, body) = get(router(state), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["stream"]["rounds_relayed"], 1);
}

#[tokio::test]
async fn readiness_follows_stream_state() {
    let (_store, _hub, status_handle, state) = test_state();

    let response = router(Arc::clone(&state))
        .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    status_handle.set_state(ConnectionState::Connected);
    let response = router(state)
        .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn relayed_rounds_reach_hub_subscribers() {
    let hub = RoundHub::with_defaults();
    let mut rx = hub.subscribe();

    let mut relay = MatchRelay::new("board-7".to_string());
    relay.on_open();
    relay.on_message(message(
        r#"{"channel":"autodarts.boards","data":{"event":"start","id":"m-9"}}"#,
    ));
    let actions = relay.on_message(message(
        r#"{"channel":"autodarts.matches","topic":"m-9.state","data":{"turns":[{"player":"Alice","score":57}]}}"#,
    ));

    for action in actions {
        if let RelayAction::Publish(round) = action {
            hub.send_round(round).unwrap();
        }
    }

    let round = rx.recv().await.unwrap();
    assert_eq!(round.player.as_deref(), Some("Alice"));
    assert_eq!(round.score, Some(57));
}
