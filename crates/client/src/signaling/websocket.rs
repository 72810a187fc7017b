//! WebSocket signaling transport
//!
//! One supervisor task per connection pumps frames in both directions and,
//! when the socket drops, walks the [`RetryPolicy`] window before declaring
//! the connection failed.

use super::retry::RetryPolicy;
use super::transport::{Transport, TransportCommand, TransportEvent, TransportLink};
use crate::{Error, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// [`Transport`] over tokio-tungstenite
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport {
    policy: RetryPolicy,
}

impl WebSocketTransport {
    /// Create a transport using `policy` as its reconnection window
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, uri: &str) -> Result<TransportLink> {
        info!("Connecting to signaling server: {}", uri);

        let ws = dial(uri).await?;

        info!("Connected to signaling server");

        let (link, commands, events) = TransportLink::pair();
        tokio::spawn(supervise(uri.to_string(), ws, self.policy, commands, events));
        Ok(link)
    }
}

async fn dial(uri: &str) -> Result<WsStream> {
    let (ws, _) = connect_async(uri)
        .await
        .map_err(|e| Error::Transport(format!("Failed to connect: {}", e)))?;
    Ok(ws)
}

/// Why the pump stopped
enum PumpExit {
    /// Close requested or the client went away
    Closed,
    /// Socket lost, or a reconnect was requested
    Lost(String),
}

/// Outcome of a reconnection window
enum Redial {
    Connected(WsStream),
    Exhausted(String),
    Closed,
}

async fn supervise(
    uri: String,
    mut ws: WsStream,
    policy: RetryPolicy,
    mut commands: mpsc::UnboundedReceiver<TransportCommand>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    loop {
        match pump(&mut ws, &mut commands, &events).await {
            PumpExit::Closed => {
                let _ = ws.close(None).await;
                let _ = events.send(TransportEvent::Closed);
                break;
            }
            PumpExit::Lost(reason) => {
                warn!("Signaling connection lost: {}", reason);
                let _ = events.send(TransportEvent::Disconnected {
                    reason: reason.clone(),
                });

                match redial(&uri, &policy, &mut commands, &events, reason).await {
                    Redial::Connected(fresh) => {
                        info!("Signaling connection re-established");
                        ws = fresh;
                        let _ = events.send(TransportEvent::Reconnected);
                    }
                    Redial::Exhausted(reason) => {
                        error!(
                            "Reconnection window exhausted after {} attempts: {}",
                            policy.max_attempts(),
                            reason
                        );
                        let _ = events.send(TransportEvent::Failed { reason });
                        break;
                    }
                    Redial::Closed => {
                        let _ = events.send(TransportEvent::Closed);
                        break;
                    }
                }
            }
        }
    }

    debug!("WebSocket supervisor terminated");
}

async fn pump(
    ws: &mut WsStream,
    commands: &mut mpsc::UnboundedReceiver<TransportCommand>,
    events: &mpsc::UnboundedSender<TransportEvent>,
) -> PumpExit {
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(TransportCommand::Send(text)) => {
                    if let Err(e) = ws.send(Message::Text(text)).await {
                        return PumpExit::Lost(format!("send failed: {}", e));
                    }
                }
                Some(TransportCommand::Reconnect) => {
                    let _ = ws.close(None).await;
                    return PumpExit::Lost("reconnect requested".to_string());
                }
                Some(TransportCommand::Close) | None => return PumpExit::Closed,
            },
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if events.send(TransportEvent::Message(text)).is_err() {
                        return PumpExit::Closed;
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = ws.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(frame))) => {
                    return PumpExit::Lost(format!("closed by server: {:?}", frame));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return PumpExit::Lost(e.to_string()),
                None => return PumpExit::Lost("stream ended".to_string()),
            },
        }
    }
}

async fn redial(
    uri: &str,
    policy: &RetryPolicy,
    commands: &mut mpsc::UnboundedReceiver<TransportCommand>,
    events: &mpsc::UnboundedSender<TransportEvent>,
    mut last_error: String,
) -> Redial {
    let mut attempt = 0;
    while let Some(delay) = policy.delay_for_attempt(attempt) {
        attempt += 1;
        let _ = events.send(TransportEvent::Reconnecting { attempt });

        // Frames queued while offline are dropped; callers already saw
        // their requests fail with TransportClosed.
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                command = commands.recv() => match command {
                    Some(TransportCommand::Close) | None => return Redial::Closed,
                    Some(_) => {}
                },
            }
        }

        match dial(uri).await {
            Ok(ws) => return Redial::Connected(ws),
            Err(e) => {
                warn!("Reconnection attempt {} failed: {}", attempt, e);
                last_error = e.to_string();
            }
        }
    }

    Redial::Exhausted(last_error)
}
