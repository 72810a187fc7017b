//! Session registry and notification handling
//!
//! [`SessionState`] is the only place connections and streams are created,
//! mutated or destroyed. It never awaits: every handler completes its
//! registry mutation before returning, and any follow-up I/O is handed back
//! to the caller as a [`Followup`].

use super::model::{
    Connection, ConnectionSnapshot, ConnectionState, SessionSnapshot, Stream, StreamSnapshot,
};
use crate::events::{DisconnectReason, LeaveReason, SessionEvent};
use crate::media::{LocalMedia, PeerHandle, RenderSurface};
use crate::signaling::protocol::{
    IceCandidateNotification, JoinRoomResult, NewMessageParams, ParticipantEvictedParams,
    ParticipantGoneParams, ParticipantJoinedParams, ParticipantPublishedParams,
};
use crate::signaling::{IceCandidate, ServerNotification, StreamInfo};
use crate::stats::{StatsMonitor, StatsNormalizer, StatsSink, StatsTarget};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const SIGNAL_PREFIX: &str = "signal";

/// What a stats monitor needs when a stream gains a peer
#[derive(Clone)]
pub struct StatsContext {
    pub normalizer: Arc<dyn StatsNormalizer>,
    pub sink: Arc<dyn StatsSink>,
    pub interval: Duration,
}

/// Work a handler leaves to the caller
pub enum Followup {
    /// Tear the whole session down
    Teardown(DisconnectReason),
    /// Hand a remote candidate to a peer
    AddIceCandidate {
        peer: Arc<dyn PeerHandle>,
        candidate: IceCandidate,
    },
}

/// Registry of connections and streams for one session
pub struct SessionState {
    session_id: String,
    local_connection_id: Option<String>,
    connections: IndexMap<String, Connection>,
    /// Connections whose leave or eviction has been processed
    departed: HashSet<String>,
    /// Remote stream ids already announced
    remote_streams_created: HashSet<String>,
    events: mpsc::UnboundedSender<SessionEvent>,
    stats: Option<StatsContext>,
    closed: Option<DisconnectReason>,
}

impl SessionState {
    pub fn new(
        session_id: impl Into<String>,
        events: mpsc::UnboundedSender<SessionEvent>,
        stats: Option<StatsContext>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            local_connection_id: None,
            connections: IndexMap::new(),
            departed: HashSet::new(),
            remote_streams_created: HashSet::new(),
            events,
            stats,
            closed: None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn local_connection_id(&self) -> Option<&str> {
        self.local_connection_id.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_some()
    }

    pub fn connection(&self, connection_id: &str) -> Option<&Connection> {
        self.connections.get(connection_id)
    }

    /// Connection ids in join order
    pub fn connection_ids(&self) -> Vec<String> {
        self.connections.keys().cloned().collect()
    }

    pub fn stream(&self, stream_id: &str) -> Option<&Stream> {
        self.connections
            .values()
            .filter_map(|c| c.stream.as_ref())
            .find(|s| s.id == stream_id)
    }

    pub fn local_stream(&self) -> Option<&Stream> {
        self.local_connection_id
            .as_ref()
            .and_then(|id| self.connections.get(id))
            .and_then(|c| c.stream.as_ref())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            local_connection_id: self.local_connection_id.clone(),
            connections: self
                .connections
                .values()
                .map(|c| ConnectionSnapshot {
                    connection_id: c.id.clone(),
                    state: c.state,
                    local: c.local,
                    stream: c.stream.as_ref().map(|s| StreamSnapshot {
                        stream_id: s.id.clone(),
                        local: s.local,
                        subscribed: s.is_subscribed(),
                        peer_state: s.peer_state(),
                    }),
                })
                .collect(),
        }
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        debug!("Session {} event: {}", self.session_id, event.name());
        if self.events.send(event).is_err() {
            debug!("Session event receiver dropped");
        }
    }

    /// Register the local participant and everyone already in the room
    pub fn apply_join(&mut self, result: JoinRoomResult) {
        let mut local = Connection::new(result.id.clone(), result.metadata.clone(), true);
        local.state = ConnectionState::Joined;
        info!(
            "Joined session {} as {} ({} participants present)",
            self.session_id,
            result.id,
            result.value.len()
        );
        self.local_connection_id = Some(result.id.clone());
        self.connections.insert(result.id, local);

        for participant in result.value {
            self.participant_joined(ParticipantJoinedParams {
                id: participant.id.clone(),
                metadata: participant.metadata,
            });
            if !participant.streams.is_empty() {
                self.participant_published(ParticipantPublishedParams {
                    id: participant.id,
                    streams: participant.streams,
                });
            }
        }
    }

    /// Apply one server notification
    pub fn handle_notification(&mut self, notification: ServerNotification) -> Option<Followup> {
        if self.is_closed() {
            debug!("Ignoring {} after teardown", notification.method());
            return None;
        }

        match notification {
            ServerNotification::ParticipantJoined(params) => self.participant_joined(params),
            ServerNotification::ParticipantPublished(params) => self.participant_published(params),
            ServerNotification::ParticipantUnpublished(params) => {
                self.participant_unpublished(params)
            }
            ServerNotification::ParticipantLeft(params) => {
                if Some(params.name.as_str()) == self.local_connection_id.as_deref() {
                    warn!(
                        "Server reports local participant left session {}",
                        self.session_id
                    );
                    return Some(Followup::Teardown(DisconnectReason::ForceDisconnect));
                }
                self.participant_left(&params.name, LeaveReason::Left)
            }
            ServerNotification::ParticipantEvicted(params) => {
                return self.participant_evicted(params);
            }
            ServerNotification::RecordingStarted(params) => {
                self.emit(SessionEvent::RecordingStateChanged {
                    recording: true,
                    recording_id: params.id,
                });
            }
            ServerNotification::RecordingStopped(params) => {
                self.emit(SessionEvent::RecordingStateChanged {
                    recording: false,
                    recording_id: params.id,
                });
            }
            ServerNotification::NewMessage(params) => self.message_received(params),
            ServerNotification::IceCandidate(params) => return self.ice_candidate(params),
            ServerNotification::MediaError(params) => {
                warn!("Media error in session {}: {}", self.session_id, params.error);
                self.emit(SessionEvent::MediaError {
                    message: params.error,
                });
            }
        }
        None
    }

    fn participant_joined(&mut self, params: ParticipantJoinedParams) {
        if self.departed.contains(&params.id) {
            debug!("Dropping stale join for departed connection {}", params.id);
            return;
        }
        if let Some(connection) = self.connections.get_mut(&params.id) {
            // A publish may have registered the connection before its join
            if connection.metadata.is_none() && params.metadata.is_some() {
                debug!("Filling metadata for connection {}", params.id);
                connection.metadata = params.metadata;
            } else {
                debug!("Connection {} already joined", params.id);
            }
            return;
        }

        let mut connection = Connection::new(params.id.clone(), params.metadata, false);
        connection.state = ConnectionState::Joined;
        let summary = connection.summary();
        self.connections.insert(params.id, connection);
        self.emit(SessionEvent::ConnectionJoined(summary));
    }

    fn participant_published(&mut self, params: ParticipantPublishedParams) {
        if self.departed.contains(&params.id) {
            debug!("Dropping publish for departed connection {}", params.id);
            return;
        }
        if !self.connections.contains_key(&params.id) {
            // Publish overtook the join notification
            self.participant_joined(ParticipantJoinedParams {
                id: params.id.clone(),
                metadata: None,
            });
        }

        for info in &params.streams {
            if self.remote_streams_created.contains(&info.id) {
                debug!("Stream {} already announced", info.id);
                continue;
            }
            self.add_remote_stream(&params.id, info);
        }
    }

    fn add_remote_stream(&mut self, connection_id: &str, info: &StreamInfo) {
        let replaced = self
            .connections
            .get(connection_id)
            .and_then(|c| c.stream.as_ref())
            .is_some();
        if replaced {
            debug!(
                "Connection {} publishes {} while holding a stream, replacing it",
                connection_id, info.id
            );
            self.dispose_stream(connection_id);
        }

        let Some(connection) = self.connections.get_mut(connection_id) else {
            return;
        };
        let stream = Stream::remote(connection_id, info);
        let summary = stream.summary();
        connection.stream = Some(stream);
        connection.state = ConnectionState::Publishing;
        self.remote_streams_created.insert(info.id.clone());
        self.emit(SessionEvent::StreamCreated(summary));
    }

    fn participant_unpublished(&mut self, params: ParticipantGoneParams) {
        let has_stream = self
            .connections
            .get(&params.name)
            .map(|c| c.stream.is_some())
            .unwrap_or(false);
        if !has_stream {
            debug!("Unpublish for {} without a stream", params.name);
            return;
        }
        self.dispose_stream(&params.name);
        if let Some(connection) = self.connections.get_mut(&params.name) {
            connection.state = ConnectionState::Idle;
        }
    }

    fn participant_left(&mut self, connection_id: &str, reason: LeaveReason) {
        self.departed.insert(connection_id.to_string());
        if !self.connections.contains_key(connection_id) {
            debug!("Connection {} already gone", connection_id);
            return;
        }

        self.dispose_stream(connection_id);
        if let Some(mut connection) = self.connections.shift_remove(connection_id) {
            connection.state = ConnectionState::Left;
            info!("Connection {} left session {} ({:?})", connection_id, self.session_id, reason);
        }
        self.emit(SessionEvent::ConnectionLeft {
            connection_id: connection_id.to_string(),
            reason,
        });
    }

    fn participant_evicted(&mut self, params: ParticipantEvictedParams) -> Option<Followup> {
        match params.connection_id {
            Some(id) if Some(id.as_str()) != self.local_connection_id.as_deref() => {
                self.participant_left(&id, LeaveReason::Evicted);
                None
            }
            _ => {
                warn!(
                    "Local participant evicted from session {}: {}",
                    self.session_id,
                    params.reason.as_deref().unwrap_or("no reason given")
                );
                Some(Followup::Teardown(DisconnectReason::ForceDisconnect))
            }
        }
    }

    fn message_received(&mut self, params: NewMessageParams) {
        let signal_type = params
            .signal_type
            .strip_prefix(SIGNAL_PREFIX)
            .map(|rest| rest.strip_prefix(':').unwrap_or(rest))
            .unwrap_or(&params.signal_type);
        let signal_type = (!signal_type.is_empty()).then(|| signal_type.to_string());

        self.emit(SessionEvent::SignalReceived {
            from: params.from.filter(|f| !f.is_empty()),
            signal_type,
            data: params.data,
        });
    }

    fn ice_candidate(&mut self, params: IceCandidateNotification) -> Option<Followup> {
        let endpoint = params.endpoint_name.as_str();
        let stream = self
            .connections
            .values()
            .filter_map(|c| c.stream.as_ref())
            .find(|s| s.id == endpoint)
            .or_else(|| {
                self.connections
                    .get(endpoint)
                    .and_then(|c| c.stream.as_ref())
            });

        match stream.and_then(|s| s.peer.clone()) {
            Some(peer) => Some(Followup::AddIceCandidate {
                peer,
                candidate: params.candidate,
            }),
            None => {
                debug!("No peer for ICE candidate endpoint {}", endpoint);
                None
            }
        }
    }

    /// Release a connection's stream, then unregister it.
    ///
    /// Native resources are released while the stream is still reachable so
    /// no lookup ever observes a half-torn-down stream.
    fn dispose_stream(&mut self, connection_id: &str) {
        let Some(connection) = self.connections.get_mut(connection_id) else {
            return;
        };
        let Some(stream) = connection.stream.as_mut() else {
            return;
        };

        stream.release_resources();
        let Some(stream) = connection.stream.take() else {
            return;
        };

        self.emit(SessionEvent::StreamDestroyed {
            stream_id: stream.id,
            connection_id: stream.connection_id,
        });
    }

    fn start_monitor(&self, stream: &Stream, peer: &Arc<dyn PeerHandle>) -> Option<StatsMonitor> {
        self.stats.as_ref().map(|ctx| {
            StatsMonitor::spawn(
                StatsTarget {
                    stream_id: stream.id.clone(),
                    connection_id: stream.connection_id.clone(),
                },
                Arc::clone(peer),
                Arc::clone(&ctx.normalizer),
                Arc::clone(&ctx.sink),
                ctx.interval,
            )
        })
    }

    /// Record the local stream after `publishVideo` succeeded.
    ///
    /// Returns `false`, releasing the resources, when the session can no
    /// longer take it.
    pub fn local_published(
        &mut self,
        info: StreamInfo,
        peer: Arc<dyn PeerHandle>,
        media: Arc<dyn LocalMedia>,
        mirrored: bool,
    ) -> bool {
        let local_id = match (&self.closed, &self.local_connection_id) {
            (None, Some(id)) => id.clone(),
            _ => {
                debug!("Session closed before local stream {} was registered", info.id);
                peer.close();
                media.stop();
                return false;
            }
        };

        if !self.connections.contains_key(&local_id) {
            warn!(
                "Local connection {} is not registered, dropping stream {}",
                local_id, info.id
            );
            peer.close();
            media.stop();
            return false;
        }
        if self.local_stream().is_some() {
            self.dispose_stream(&local_id);
        }

        let mut stream = Stream::local(&local_id, &info, Arc::clone(&peer), media, mirrored);
        stream.monitor = self.start_monitor(&stream, &peer);
        let summary = stream.summary();

        let Some(connection) = self.connections.get_mut(&local_id) else {
            return false;
        };
        connection.stream = Some(stream);
        connection.state = ConnectionState::Publishing;
        info!("Publishing stream {} in session {}", summary.stream_id, self.session_id);
        self.emit(SessionEvent::StreamCreated(summary));
        true
    }

    /// Dispose the local stream; no-op when nothing is published
    pub fn local_unpublished(&mut self) -> bool {
        let Some(local_id) = self.local_connection_id.clone() else {
            return false;
        };
        if self.local_stream().is_none() {
            return false;
        }
        self.dispose_stream(&local_id);
        if let Some(connection) = self.connections.get_mut(&local_id) {
            connection.state = ConnectionState::Idle;
        }
        true
    }

    /// Attach a negotiated subscriber peer to a remote stream.
    ///
    /// When the stream vanished during negotiation the peer is closed and
    /// `false` returned.
    pub fn attach_subscriber(&mut self, stream_id: &str, peer: Arc<dyn PeerHandle>) -> bool {
        let Some(connection_id) = self.owner_of(stream_id) else {
            debug!("Stream {} gone before subscription completed", stream_id);
            peer.close();
            return false;
        };

        let monitor = match self.stream(stream_id) {
            Some(stream) => self.start_monitor(stream, &peer),
            None => None,
        };

        let Some(stream) = self
            .connections
            .get_mut(&connection_id)
            .and_then(|c| c.stream.as_mut())
        else {
            peer.close();
            return false;
        };

        stream.release_peer();
        stream.peer = Some(peer);
        stream.monitor = monitor;
        debug!("Subscribed to stream {}", stream_id);
        true
    }

    /// Close the subscriber peer of a remote stream, keeping the stream
    pub fn detach_subscriber(&mut self, stream_id: &str) -> bool {
        let Some(connection_id) = self.owner_of(stream_id) else {
            return false;
        };
        match self
            .connections
            .get_mut(&connection_id)
            .and_then(|c| c.stream.as_mut())
        {
            Some(stream) if !stream.local && stream.peer.is_some() => {
                stream.release_peer();
                true
            }
            _ => false,
        }
    }

    /// Attach a rendering surface, replacing (and detaching) any previous one
    pub fn attach_surface(&mut self, stream_id: &str, surface: Arc<dyn RenderSurface>) -> bool {
        let Some(connection_id) = self.owner_of(stream_id) else {
            return false;
        };
        let Some(stream) = self
            .connections
            .get_mut(&connection_id)
            .and_then(|c| c.stream.as_mut())
        else {
            return false;
        };
        if stream.mirrored {
            surface.set_mirrored(true);
        }
        if let Some(previous) = stream.surface.replace(surface) {
            previous.detach();
        }
        true
    }

    fn owner_of(&self, stream_id: &str) -> Option<String> {
        self.connections
            .values()
            .find(|c| c.stream.as_ref().is_some_and(|s| s.id == stream_id))
            .map(|c| c.id.clone())
    }

    /// Dispose every stream, clear the registry and report `reason`.
    ///
    /// Only the first call has any effect.
    pub fn teardown(&mut self, reason: DisconnectReason) {
        if self.closed.is_some() {
            return;
        }
        self.closed = Some(reason);
        info!("Tearing down session {} ({})", self.session_id, reason);

        let ids: Vec<String> = self.connections.keys().cloned().collect();
        for id in &ids {
            self.dispose_stream(id);
            if let Some(connection) = self.connections.get_mut(id) {
                connection.state = ConnectionState::Left;
            }
        }
        self.connections.clear();
        self.departed.extend(ids);

        self.emit(SessionEvent::SessionDisconnected { reason });
    }

    pub fn close_reason(&self) -> Option<DisconnectReason> {
        self.closed
    }
}
