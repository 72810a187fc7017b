//! Scripted signaling server
//!
//! `ScriptedTransport` hands the server side of every opened link to the
//! test, which then plays the server: it reads JSON-RPC requests, answers
//! them, pushes notifications and injects connectivity events.

use super::GUARD;
use async_trait::async_trait;
use openroom_client::signaling::{Transport, TransportCommand, TransportEvent, TransportLink};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;

/// In-memory [`Transport`]
pub struct ScriptedTransport {
    opened: mpsc::UnboundedSender<ServerEnd>,
}

impl ScriptedTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { opened: tx }), rx)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, uri: &str) -> openroom_client::Result<TransportLink> {
        let (link, commands, events) = TransportLink::pair();
        self.opened
            .send(ServerEnd::new(uri, commands, events))
            .map_err(|_| openroom_client::Error::Transport("test server gone".to_string()))?;
        Ok(link)
    }
}

/// Server side of one link
pub struct ServerEnd {
    pub uri: String,
    commands: mpsc::UnboundedReceiver<TransportCommand>,
    events: mpsc::UnboundedSender<TransportEvent>,
    /// Non-frame commands seen while looking for requests
    pub control: Vec<TransportCommand>,
    /// Heartbeats answered automatically
    pub pings: usize,
}

impl ServerEnd {
    pub fn new(
        uri: &str,
        commands: mpsc::UnboundedReceiver<TransportCommand>,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Self {
        Self {
            uri: uri.to_string(),
            commands,
            events,
            control: Vec::new(),
            pings: 0,
        }
    }

    /// Next raw command from the client
    pub async fn next_command(&mut self) -> TransportCommand {
        tokio::time::timeout(GUARD, self.commands.recv())
            .await
            .expect("timed out waiting for a client command")
            .expect("client dropped the link")
    }

    /// Next request frame as (id, method, params), answering heartbeats
    pub async fn next_request(&mut self) -> (u64, String, Value) {
        loop {
            match self.next_command().await {
                TransportCommand::Send(text) => {
                    let frame: Value = serde_json::from_str(&text).expect("client sent JSON");
                    let id = frame["id"].as_u64().expect("request id");
                    let method = frame["method"].as_str().expect("method").to_string();
                    if method == "ping" {
                        self.pings += 1;
                        self.respond(id, json!({ "value": "pong" }));
                        continue;
                    }
                    return (id, method, frame["params"].clone());
                }
                other => self.control.push(other),
            }
        }
    }

    /// Next request, asserting its method
    pub async fn expect_request(&mut self, method: &str) -> (u64, Value) {
        let (id, actual, params) = self.next_request().await;
        assert_eq!(actual, method, "unexpected request {} {}", actual, params);
        (id, params)
    }

    pub fn send_frame(&self, frame: Value) {
        let _ = self.events.send(TransportEvent::Message(frame.to_string()));
    }

    pub fn respond(&self, id: u64, result: Value) {
        self.send_frame(json!({ "jsonrpc": "2.0", "id": id, "result": result }));
    }

    pub fn respond_error(&self, id: u64, code: i64, message: &str) {
        self.send_frame(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": code, "message": message }
        }));
    }

    pub fn notify(&self, method: &str, params: Value) {
        self.send_frame(json!({ "jsonrpc": "2.0", "method": method, "params": params }));
    }

    pub fn transport_event(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }
}
