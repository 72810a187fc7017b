//! Outward session events

use crate::stats::StatsRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DisconnectReason {
    /// The local caller disconnected
    Disconnect,
    /// The transport reported unrecoverable loss
    NetworkDisconnect,
    /// The server removed the local participant
    ForceDisconnect,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::Disconnect => "disconnect",
            DisconnectReason::NetworkDisconnect => "networkDisconnect",
            DisconnectReason::ForceDisconnect => "forceDisconnect",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a remote connection went away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LeaveReason {
    Left,
    Evicted,
}

/// Connection fields carried by [`SessionEvent::ConnectionJoined`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSummary {
    pub connection_id: String,
    pub metadata: Option<String>,
    pub local: bool,
}

/// Stream fields carried by [`SessionEvent::StreamCreated`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSummary {
    pub stream_id: String,
    pub connection_id: String,
    pub has_audio: bool,
    pub has_video: bool,
    pub audio_active: bool,
    pub video_active: bool,
    pub is_screen_share: bool,
    pub frame_rate: Option<u32>,
    pub local: bool,
    #[serde(default)]
    pub mirrored: bool,
}

/// Everything the session reports to its observer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    ConnectionJoined(ConnectionSummary),
    ConnectionLeft {
        connection_id: String,
        reason: LeaveReason,
    },
    StreamCreated(StreamSummary),
    StreamDestroyed {
        stream_id: String,
        connection_id: String,
    },
    /// Terminal; nothing follows
    SessionDisconnected { reason: DisconnectReason },
    SignalReceived {
        /// `None` for server-originated signals
        from: Option<String>,
        /// Signal type without its `signal:` prefix
        signal_type: Option<String>,
        data: String,
    },
    RecordingStateChanged { recording: bool, recording_id: String },
    StatsRecord(StatsRecord),
    /// Non-terminal degraded state while the transport retries
    Reconnecting { attempt: usize },
    Reconnected,
    MediaError { message: String },
}

impl SessionEvent {
    /// Variant name, for logs
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::ConnectionJoined(_) => "ConnectionJoined",
            SessionEvent::ConnectionLeft { .. } => "ConnectionLeft",
            SessionEvent::StreamCreated(_) => "StreamCreated",
            SessionEvent::StreamDestroyed { .. } => "StreamDestroyed",
            SessionEvent::SessionDisconnected { .. } => "SessionDisconnected",
            SessionEvent::SignalReceived { .. } => "SignalReceived",
            SessionEvent::RecordingStateChanged { .. } => "RecordingStateChanged",
            SessionEvent::StatsRecord(_) => "StatsRecord",
            SessionEvent::Reconnecting { .. } => "Reconnecting",
            SessionEvent::Reconnected => "Reconnected",
            SessionEvent::MediaError { .. } => "MediaError",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionEvent::SessionDisconnected { .. })
    }
}
