//! Session owner task
//!
//! One task owns the [`SessionState`] and consumes a single queue carrying
//! notifications (in receipt order), connectivity changes and local
//! commands, so every registry mutation is serialized.

use super::model::SessionSnapshot;
use super::reconnect::{ReconnectAction, ReconnectionManager};
use super::state::{Followup, SessionState};
use crate::events::{DisconnectReason, SessionEvent};
use crate::media::{LocalMedia, PeerHandle, RenderSurface};
use crate::signaling::protocol::{methods, JoinRoomParams, JoinRoomResult};
use crate::signaling::{ConnectivityEvent, ServerNotification, SignalingClient, StreamInfo};
use crate::{Error, Result};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Everything the owner task consumes
pub(crate) enum SessionInput {
    Notification(ServerNotification),
    Connectivity(ConnectivityEvent),
    Command(SessionCommand),
}

/// Local requests; I/O already happened on the caller's side
pub(crate) enum SessionCommand {
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    LocalPublished {
        info: StreamInfo,
        peer: Arc<dyn PeerHandle>,
        media: Arc<dyn LocalMedia>,
        mirrored: bool,
        reply: oneshot::Sender<bool>,
    },
    LocalUnpublished {
        reply: oneshot::Sender<bool>,
    },
    Subscribed {
        stream_id: String,
        peer: Arc<dyn PeerHandle>,
        reply: oneshot::Sender<bool>,
    },
    Unsubscribed {
        stream_id: String,
        reply: oneshot::Sender<bool>,
    },
    AttachSurface {
        stream_id: String,
        surface: Arc<dyn RenderSurface>,
        reply: oneshot::Sender<bool>,
    },
    Disconnect {
        reply: Option<oneshot::Sender<()>>,
    },
}

pub(crate) struct SessionActor {
    state: SessionState,
    signaling: Arc<SignalingClient>,
    reconnection: ReconnectionManager,
    inputs: mpsc::UnboundedReceiver<SessionInput>,
}

impl SessionActor {
    pub(crate) fn new(
        state: SessionState,
        signaling: Arc<SignalingClient>,
        inputs: mpsc::UnboundedReceiver<SessionInput>,
    ) -> Self {
        Self {
            state,
            signaling,
            reconnection: ReconnectionManager::new(),
            inputs,
        }
    }

    /// Join, report the local connection id through `joined`, then process
    /// inputs until the session is torn down.
    ///
    /// Notifications that arrive while `joinRoom` is in flight queue up and
    /// are applied after the join snapshot.
    pub(crate) async fn run(mut self, join: JoinRoomParams, joined: oneshot::Sender<Result<String>>) {
        match self.join(join).await {
            Ok(result) => {
                let local_id = result.id.clone();
                self.state.apply_join(result);
                let _ = joined.send(Ok(local_id));
            }
            Err(e) => {
                warn!("Failed to join session {}: {}", self.state.session_id(), e);
                self.reconnection.mark_closing();
                self.signaling.close();
                let _ = joined.send(Err(e));
                return;
            }
        }

        while let Some(input) = self.inputs.recv().await {
            match input {
                SessionInput::Notification(notification) => self.on_notification(notification),
                SessionInput::Connectivity(event) => self.on_connectivity(event),
                SessionInput::Command(command) => self.on_command(command).await,
            }
            if self.state.is_closed() {
                break;
            }
        }

        debug!("Session {} owner task finished", self.state.session_id());
    }

    async fn join(&self, params: JoinRoomParams) -> Result<JoinRoomResult> {
        info!("Joining session {}", params.session);
        let value = self
            .signaling
            .send_request(methods::JOIN_ROOM, serde_json::to_value(&params)?)
            .await?;
        serde_json::from_value(value)
            .map_err(|e| Error::Protocol(format!("Invalid joinRoom result: {}", e)))
    }

    fn on_notification(&mut self, notification: ServerNotification) {
        match self.state.handle_notification(notification) {
            None => {}
            Some(Followup::Teardown(reason)) => self.shutdown(reason),
            Some(Followup::AddIceCandidate { peer, candidate }) => {
                tokio::spawn(async move {
                    if let Err(e) = peer.add_ice_candidate(&candidate).await {
                        warn!("Failed to add remote ICE candidate: {}", e);
                    }
                });
            }
        }
    }

    fn on_connectivity(&mut self, event: ConnectivityEvent) {
        match self.reconnection.on_event(&event) {
            ReconnectAction::Wait => {}
            ReconnectAction::Degraded { attempt } => {
                self.state.emit(SessionEvent::Reconnecting { attempt });
            }
            ReconnectAction::Restored => {
                info!(
                    "Session {} reconnected, keeping {} connection(s)",
                    self.state.session_id(),
                    self.state.connection_ids().len()
                );
                self.state.emit(SessionEvent::Reconnected);
            }
            ReconnectAction::Teardown(reason) => self.shutdown(reason),
        }
    }

    async fn on_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.state.snapshot());
            }
            SessionCommand::LocalPublished {
                info,
                peer,
                media,
                mirrored,
                reply,
            } => {
                let _ = reply.send(self.state.local_published(info, peer, media, mirrored));
            }
            SessionCommand::LocalUnpublished { reply } => {
                let _ = reply.send(self.state.local_unpublished());
            }
            SessionCommand::Subscribed {
                stream_id,
                peer,
                reply,
            } => {
                let _ = reply.send(self.state.attach_subscriber(&stream_id, peer));
            }
            SessionCommand::Unsubscribed { stream_id, reply } => {
                let _ = reply.send(self.state.detach_subscriber(&stream_id));
            }
            SessionCommand::AttachSurface {
                stream_id,
                surface,
                reply,
            } => {
                let _ = reply.send(self.state.attach_surface(&stream_id, surface));
            }
            SessionCommand::Disconnect { reply } => {
                self.reconnection.mark_closing();
                if self.signaling.is_connected() {
                    if let Err(e) = self.signaling.send_request(methods::LEAVE_ROOM, json!({})).await {
                        warn!("leaveRoom failed: {}", e);
                    }
                }
                self.shutdown(DisconnectReason::Disconnect);
                if let Some(reply) = reply {
                    let _ = reply.send(());
                }
            }
        }
    }

    fn shutdown(&mut self, reason: DisconnectReason) {
        self.reconnection.mark_closing();
        self.state.teardown(reason);
        self.signaling.close();
    }
}
