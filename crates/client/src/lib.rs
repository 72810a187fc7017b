//! Real-time room client core
//!
//! Joins a media room over JSON-RPC signaling, mirrors the server's view of
//! participants and their streams, and turns WebRTC counters into rates.
//!
//! # Features
//!
//! - **JSON-RPC 2.0 signaling**: id correlation, per-request deadlines,
//!   heartbeats and in-order notification dispatch over WebSocket
//! - **Session state machine**: join-ordered connection registry with
//!   idempotent handling of duplicate and stale notifications
//! - **Reconnection**: transient loss keeps the session, an exhausted retry
//!   window tears it down with `networkDisconnect`
//! - **Stats differencing**: per-stream polling with vendor report
//!   normalization, delivered to session events or an HTTP collector
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  RoomClient (config, transport, media engine, sink)  │
//! │  ↓ join()                                            │
//! │  Session handle ── commands ──┐                      │
//! │                               ↓                      │
//! │  SignalingClient ─ notifications ─→ session owner    │
//! │  └─ Transport (WebSocket + retry window)   │         │
//! │                                            ↓         │
//! │  SessionState: Connection → Stream → StatsMonitor    │
//! │  ↓                                                   │
//! │  SessionEvent stream                                 │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use openroom_client::ClientConfig;
//!
//! let mut config = ClientConfig::default();
//! config.signaling_url = "wss://media.example.org:4443/openvidu".to_string();
//! config.stats.enabled = true;
//! assert!(config.validate().is_ok());
//! ```
//!
//! ## Async Usage
//!
//! ```no_run
//! use openroom_client::{ClientConfig, JoinOptions, MediaEngine, RoomClient, SessionEvent};
//! use std::sync::Arc;
//!
//! # async fn example(engine: Arc<dyn MediaEngine>) -> openroom_client::Result<()> {
//! let client = RoomClient::new(ClientConfig::default(), engine)?;
//! let (session, mut events) = client
//!     .join("wss://media.example.org:4443?sessionId=ses_A&token=tok_B", JoinOptions::default())
//!     .await?;
//!
//! while let Some(event) = events.recv().await {
//!     if let SessionEvent::StreamCreated(stream) = &event {
//!         if !stream.local {
//!             session.subscribe(&stream.stream_id).await?;
//!         }
//!     }
//!     if event.is_terminal() {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod media;
pub mod session;
pub mod signaling;
pub mod stats;
pub mod token;

pub use client::{JoinOptions, RoomClient};
pub use config::{ClientConfig, StatsConfig};
pub use error::{Error, MediaAccessErrorKind, Result};
pub use events::{ConnectionSummary, DisconnectReason, LeaveReason, SessionEvent, StreamSummary};
pub use media::{
    ExtensionStatus, LocalMedia, MediaConstraints, MediaEngine, PeerConnectionState, PeerHandle,
    PublishOptions, RenderSurface,
};
pub use session::{ConnectionState, Session, SessionSnapshot};
pub use signaling::{RetryPolicy, SignalingClient};
pub use stats::{ReportShape, StatsRecord, StatsSink};
pub use token::JoinToken;

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
