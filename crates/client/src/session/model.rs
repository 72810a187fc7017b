//! Connection and stream records owned by the session

use crate::events::{ConnectionSummary, StreamSummary};
use crate::media::{LocalMedia, PeerConnectionState, PeerHandle, RenderSurface};
use crate::signaling::StreamInfo;
use crate::stats::StatsMonitor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Joining,
    Joined,
    Publishing,
    Idle,
    /// Terminal
    Left,
}

/// One published media flow
pub struct Stream {
    pub id: String,
    pub connection_id: String,
    pub has_audio: bool,
    pub has_video: bool,
    pub audio_active: bool,
    pub video_active: bool,
    pub is_screen_share: bool,
    pub frame_rate: Option<u32>,
    pub local: bool,
    pub mirrored: bool,
    pub(crate) peer: Option<Arc<dyn PeerHandle>>,
    pub(crate) media: Option<Arc<dyn LocalMedia>>,
    pub(crate) surface: Option<Arc<dyn RenderSurface>>,
    pub(crate) monitor: Option<StatsMonitor>,
}

impl Stream {
    /// Remote stream announced by the server
    pub fn remote(connection_id: &str, info: &StreamInfo) -> Self {
        Self {
            id: info.id.clone(),
            connection_id: connection_id.to_string(),
            has_audio: info.has_audio,
            has_video: info.has_video,
            audio_active: info.audio_active,
            video_active: info.video_active,
            is_screen_share: info.is_screen_share(),
            frame_rate: info.frame_rate,
            local: false,
            mirrored: false,
            peer: None,
            media: None,
            surface: None,
            monitor: None,
        }
    }

    /// Locally published stream, already negotiated
    pub fn local(
        connection_id: &str,
        info: &StreamInfo,
        peer: Arc<dyn PeerHandle>,
        media: Arc<dyn LocalMedia>,
        mirrored: bool,
    ) -> Self {
        Self {
            local: true,
            mirrored,
            peer: Some(peer),
            media: Some(media),
            ..Self::remote(connection_id, info)
        }
    }

    /// WebRTC state of the underlying peer, `New` until one is attached
    pub fn peer_state(&self) -> PeerConnectionState {
        self.peer
            .as_ref()
            .map(|p| p.connection_state())
            .unwrap_or(PeerConnectionState::New)
    }

    pub fn is_subscribed(&self) -> bool {
        !self.local && self.peer.is_some()
    }

    pub fn summary(&self) -> StreamSummary {
        StreamSummary {
            stream_id: self.id.clone(),
            connection_id: self.connection_id.clone(),
            has_audio: self.has_audio,
            has_video: self.has_video,
            audio_active: self.audio_active,
            video_active: self.video_active,
            is_screen_share: self.is_screen_share,
            frame_rate: self.frame_rate,
            local: self.local,
            mirrored: self.mirrored,
        }
    }

    /// Stop stats polling and close the peer, keeping media and surface
    pub(crate) fn release_peer(&mut self) {
        if let Some(mut monitor) = self.monitor.take() {
            monitor.stop();
        }
        if let Some(peer) = self.peer.take() {
            peer.close();
        }
    }

    /// Release every native resource: stats, peer, captured media, surface
    pub(crate) fn release_resources(&mut self) {
        debug!("Releasing resources of stream {}", self.id);
        self.release_peer();
        if let Some(media) = self.media.take() {
            media.stop();
        }
        if let Some(surface) = self.surface.take() {
            surface.detach();
        }
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.id)
            .field("connection_id", &self.connection_id)
            .field("has_audio", &self.has_audio)
            .field("has_video", &self.has_video)
            .field("is_screen_share", &self.is_screen_share)
            .field("local", &self.local)
            .field("peer", &self.peer.is_some())
            .field("surface", &self.surface.is_some())
            .field("stats", &self.monitor.is_some())
            .finish()
    }
}

/// One participant
#[derive(Debug)]
pub struct Connection {
    pub id: String,
    pub metadata: Option<String>,
    pub local: bool,
    pub state: ConnectionState,
    pub(crate) stream: Option<Stream>,
}

impl Connection {
    pub fn new(id: impl Into<String>, metadata: Option<String>, local: bool) -> Self {
        Self {
            id: id.into(),
            metadata,
            local,
            state: ConnectionState::Joining,
            stream: None,
        }
    }

    pub fn stream(&self) -> Option<&Stream> {
        self.stream.as_ref()
    }

    pub fn summary(&self) -> ConnectionSummary {
        ConnectionSummary {
            connection_id: self.id.clone(),
            metadata: self.metadata.clone(),
            local: self.local,
        }
    }
}

/// Read-only copy of the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub local_connection_id: Option<String>,
    /// In join order
    pub connections: Vec<ConnectionSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSnapshot {
    pub connection_id: String,
    pub state: ConnectionState,
    pub local: bool,
    pub stream: Option<StreamSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSnapshot {
    pub stream_id: String,
    pub local: bool,
    pub subscribed: bool,
    pub peer_state: PeerConnectionState,
}

impl SessionSnapshot {
    pub fn connection_ids(&self) -> Vec<&str> {
        self.connections
            .iter()
            .map(|c| c.connection_id.as_str())
            .collect()
    }

    pub fn stream_ids(&self) -> Vec<&str> {
        self.connections
            .iter()
            .filter_map(|c| c.stream.as_ref())
            .map(|s| s.stream_id.as_str())
            .collect()
    }

    pub fn connection(&self, connection_id: &str) -> Option<&ConnectionSnapshot> {
        self.connections
            .iter()
            .find(|c| c.connection_id == connection_id)
    }
}
