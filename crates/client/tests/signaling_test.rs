//! Signaling client integration tests
//!
//! Request correlation, deadlines, transport loss, heartbeats and
//! notification ordering, driven through an in-memory link.

mod harness;

use harness::init_logging;
use openroom_client::signaling::{
    ConnectivityEvent, SignalingClient, SignalingOptions, TransportCommand, TransportEvent,
    TransportLink,
};
use openroom_client::Error;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn options() -> SignalingOptions {
    SignalingOptions {
        request_timeout: Duration::from_secs(15),
        heartbeat_interval: Duration::from_secs(3600),
    }
}

async fn read_request(commands: &mut mpsc::UnboundedReceiver<TransportCommand>) -> (u64, String) {
    match commands.recv().await {
        Some(TransportCommand::Send(text)) => {
            let frame: Value = serde_json::from_str(&text).unwrap();
            assert_eq!(frame["jsonrpc"], "2.0");
            (
                frame["id"].as_u64().unwrap(),
                frame["method"].as_str().unwrap().to_string(),
            )
        }
        other => panic!("Expected a request frame, got {:?}", other),
    }
}

fn response(id: u64, result: Value) -> TransportEvent {
    TransportEvent::Message(json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string())
}

#[tokio::test]
async fn test_out_of_order_responses_reach_their_callers() {
    init_logging();
    let (link, mut commands, events) = TransportLink::pair();
    let client = Arc::new(SignalingClient::start(link, options()));

    let mut calls = Vec::new();
    for n in 1..=3 {
        let client = Arc::clone(&client);
        calls.push(tokio::spawn(async move {
            client.send_request("echo", json!({ "n": n })).await
        }));
        // Keep transmission order deterministic
        let (id, method) = read_request(&mut commands).await;
        assert_eq!((id, method.as_str()), (n, "echo"));
    }

    for id in [3, 1, 2] {
        events.send(response(id, json!({ "answer": id }))).unwrap();
    }

    for (index, call) in calls.into_iter().enumerate() {
        let result = call.await.unwrap().unwrap();
        assert_eq!(result["answer"], index as u64 + 1);
    }
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_removes_request_and_ignores_late_response() {
    init_logging();
    let (link, mut commands, events) = TransportLink::pair();
    let client = SignalingClient::start(link, options());

    let request = client.send_request("publishVideo", json!({}));
    let server = async {
        let (id, _) = read_request(&mut commands).await;
        id
    };
    let (result, id) = tokio::join!(request, server);

    match result {
        Err(Error::RequestTimeout {
            method,
            id: timed_out,
            timeout_ms,
        }) => {
            assert_eq!(method, "publishVideo");
            assert_eq!(timed_out, id);
            assert_eq!(timeout_ms, 15_000);
        }
        other => panic!("Expected RequestTimeout, got {:?}", other),
    }
    assert_eq!(client.pending_count(), 0);

    // Late response for the abandoned id is dropped; the next request works
    events.send(response(id, json!({ "late": true }))).unwrap();
    let next = client.send_request("ping", json!({}));
    let server = async {
        let (next_id, _) = read_request(&mut commands).await;
        assert_eq!(next_id, id + 1);
        events.send(response(next_id, json!({ "value": "pong" }))).unwrap();
    };
    let (result, _) = tokio::join!(next, server);
    assert_eq!(result.unwrap()["value"], "pong");
}

#[tokio::test]
async fn test_transport_loss_fails_in_flight_requests() {
    init_logging();
    let (link, mut commands, events) = TransportLink::pair();
    let client = SignalingClient::start(link, options());
    let mut connectivity = client.take_connectivity_events().unwrap();

    let request = client.send_request("joinRoom", json!({}));
    let server = async {
        read_request(&mut commands).await;
        events
            .send(TransportEvent::Disconnected {
                reason: "connection reset".to_string(),
            })
            .unwrap();
    };
    let (result, _) = tokio::join!(request, server);

    assert!(matches!(result, Err(Error::TransportClosed)));
    assert!(!client.is_connected());
    assert_eq!(
        connectivity.recv().await,
        Some(ConnectivityEvent::Disconnected {
            reason: "connection reset".to_string()
        })
    );

    // Not connected: requests fail immediately
    assert!(matches!(
        client.send_request("joinRoom", json!({})).await,
        Err(Error::TransportClosed)
    ));

    events.send(TransportEvent::Reconnected).unwrap();
    assert_eq!(connectivity.recv().await, Some(ConnectivityEvent::Reconnected));
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_rpc_error_is_returned_to_caller() {
    init_logging();
    let (link, mut commands, events) = TransportLink::pair();
    let client = SignalingClient::start(link, options());

    let request = client.send_request("joinRoom", json!({}));
    let server = async {
        let (id, _) = read_request(&mut commands).await;
        events
            .send(TransportEvent::Message(
                json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {"code": 401, "message": "Invalid token"}
                })
                .to_string(),
            ))
            .unwrap();
    };
    let (result, _) = tokio::join!(request, server);

    match result {
        Err(Error::Rpc { code, message }) => {
            assert_eq!(code, 401);
            assert_eq!(message, "Invalid token");
        }
        other => panic!("Expected Rpc error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_notifications_dispatched_in_receipt_order() {
    init_logging();
    let (link, _commands, events) = TransportLink::pair();
    let client = SignalingClient::start(link, options());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    for method in ["participantJoined", "participantLeft"] {
        let seen = Arc::clone(&seen);
        let done = done_tx.clone();
        client.register_notification_handler(method, move |params| {
            seen.lock().push(format!("{}:{}", method, params["id"].as_str().unwrap_or("")));
            let _ = done.send(());
        });
    }

    let sequence = [
        ("participantJoined", "a"),
        ("participantJoined", "b"),
        ("participantLeft", "a"),
        ("unknownMethod", "x"),
        ("participantJoined", "c"),
    ];
    for (method, id) in sequence {
        events
            .send(TransportEvent::Message(
                json!({"jsonrpc": "2.0", "method": method, "params": {"id": id}}).to_string(),
            ))
            .unwrap();
    }
    // Garbage in between is dropped without disturbing the order
    events
        .send(TransportEvent::Message("{not json".to_string()))
        .unwrap();

    for _ in 0..4 {
        done_rx.recv().await.unwrap();
    }
    assert_eq!(
        *seen.lock(),
        vec![
            "participantJoined:a",
            "participantJoined:b",
            "participantLeft:a",
            "participantJoined:c"
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_and_missed_acknowledgement() {
    init_logging();
    let (link, mut commands, events) = TransportLink::pair();
    let client = SignalingClient::start(
        link,
        SignalingOptions {
            request_timeout: Duration::from_secs(2),
            heartbeat_interval: Duration::from_secs(5),
        },
    );

    // First heartbeat is answered
    let (id, method) = read_request(&mut commands).await;
    assert_eq!(method, "ping");
    events.send(response(id, json!({ "value": "pong" }))).unwrap();

    // Second one is not: the client forces a reconnection
    let (_, method) = read_request(&mut commands).await;
    assert_eq!(method, "ping");
    assert_eq!(commands.recv().await, Some(TransportCommand::Reconnect));
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_heartbeat_keeps_connection() {
    init_logging();
    let (link, mut commands, events) = TransportLink::pair();
    let _client = SignalingClient::start(
        link,
        SignalingOptions {
            request_timeout: Duration::from_secs(2),
            heartbeat_interval: Duration::from_secs(5),
        },
    );

    let (id, method) = read_request(&mut commands).await;
    assert_eq!(method, "ping");
    events
        .send(TransportEvent::Message(
            json!({"jsonrpc": "2.0", "id": id, "error": {"code": -32601, "message": "Method not found"}})
                .to_string(),
        ))
        .unwrap();

    // The next command is another ping, not a reconnection
    let (next, method) = read_request(&mut commands).await;
    assert_eq!(method, "ping");
    assert_eq!(next, id + 1);
}

#[tokio::test]
async fn test_terminal_failure_is_reported_once() {
    init_logging();
    let (link, _commands, events) = TransportLink::pair();
    let client = SignalingClient::start(link, options());
    let mut connectivity = client.take_connectivity_events().unwrap();

    events
        .send(TransportEvent::Reconnecting { attempt: 1 })
        .unwrap();
    events
        .send(TransportEvent::Failed {
            reason: "refused".to_string(),
        })
        .unwrap();
    drop(events);

    assert_eq!(
        connectivity.recv().await,
        Some(ConnectivityEvent::Reconnecting { attempt: 1 })
    );
    assert_eq!(
        connectivity.recv().await,
        Some(ConnectivityEvent::Failed {
            reason: "refused".to_string()
        })
    );
    assert_eq!(connectivity.recv().await, None);
}
