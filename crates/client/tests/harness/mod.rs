//! Session test harness
//!
//! Provides infrastructure for integration testing without a network or a
//! native WebRTC stack:
//! - A scripted in-memory transport whose server side is driven by the test
//! - A media engine whose peers, media and surfaces record every lifecycle
//!   call into a shared log
//! - A stats sink that keeps every record
//!
//! Basic usage pattern:
//!
//! 1. Build a `MockEngine` and call `join_session()`
//! 2. Drive the server with `ServerEnd::notify()` / `respond()`
//! 3. Call `barrier()` before inspecting the session snapshot
//! 4. Assert on events and on the `CallLog`

#![allow(dead_code)]

pub mod media;
pub mod server;

use openroom_client::stats::{StatsRecord, StatsSink};
use openroom_client::{ClientConfig, JoinOptions, RoomClient, Session, SessionEvent};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub use media::{CallLog, MockEngine, MockMedia, MockPeer, MockSurface};
pub use server::{ScriptedTransport, ServerEnd};

/// Upper bound for anything a test waits on
pub const GUARD: Duration = Duration::from_secs(30);

/// Initialize test logging (harmless when called repeatedly)
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info,openroom_client=debug")
        .with_test_writer()
        .try_init();
}

/// Configuration with a heartbeat far outside any test's time span
pub fn test_config() -> ClientConfig {
    let mut config = ClientConfig::default();
    config.signaling_url = "ws://test.local:4443/openvidu".to_string();
    config.heartbeat_interval_ms = 3_600_000;
    config
}

/// Join `ses_A` as `local` with `existing` as the participants snapshot
pub async fn join_session(
    config: ClientConfig,
    engine: Arc<MockEngine>,
    existing: Value,
) -> (Session, mpsc::UnboundedReceiver<SessionEvent>, ServerEnd) {
    let (transport, mut servers) = ScriptedTransport::new();
    let client = RoomClient::with_transport(config, engine, transport).expect("valid config");

    let join = client.join(
        "tok_B",
        JoinOptions {
            session_id: Some("ses_A".to_string()),
            metadata: "{\"clientData\":\"tester\"}".to_string(),
        },
    );
    let script = async {
        let mut server = servers.recv().await.expect("transport opened");
        let (id, params) = server.expect_request("joinRoom").await;
        assert_eq!(params["session"], "ses_A");
        assert_eq!(params["token"], "tok_B");
        server.respond(id, json!({ "id": "local", "metadata": "", "value": existing }));
        server
    };

    let (joined, server) = tokio::join!(join, script);
    let (session, events) = joined.expect("joined");
    (session, events, server)
}

/// Wait until every frame the server sent so far has reached the session.
///
/// Frames are dispatched in order, so once a later response resolves the
/// earlier notifications have been queued ahead of any new command.
pub async fn barrier(session: &Session, server: &mut ServerEnd) {
    let signal = session.send_signal(Some("barrier"), "", &[]);
    let script = async {
        let (id, _) = server.expect_request("sendMessage").await;
        server.respond(id, json!({}));
    };
    let (result, _) = tokio::join!(signal, script);
    result.expect("barrier round trip");
}

/// Next session event, failing the test when none arrives
pub async fn next_event(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(GUARD, events.recv())
        .await
        .expect("timed out waiting for a session event")
        .expect("event stream closed")
}

/// Events already delivered, without waiting
pub fn drain_events(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

/// Names of the given events
pub fn names(events: &[SessionEvent]) -> Vec<&'static str> {
    events.iter().map(|e| e.name()).collect()
}

/// `participantPublished` params with one camera stream
pub fn published(connection_id: &str, stream_id: &str) -> Value {
    json!({
        "id": connection_id,
        "streams": [{
            "id": stream_id,
            "hasAudio": true,
            "hasVideo": true,
            "audioActive": true,
            "videoActive": true,
            "typeOfVideo": "CAMERA",
            "frameRate": 30
        }]
    })
}

/// Keeps every record handed to it
#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<StatsRecord>>,
}

impl RecordingSink {
    pub fn records(&self) -> Vec<StatsRecord> {
        self.records.lock().clone()
    }
}

#[async_trait::async_trait]
impl StatsSink for RecordingSink {
    async fn emit(&self, record: StatsRecord) -> openroom_client::Result<()> {
        self.records.lock().push(record);
        Ok(())
    }
}
