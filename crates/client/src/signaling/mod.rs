//! Signaling: JSON-RPC 2.0 over a persistent connection
//!
//! - [`transport`]: the connection abstraction and its event vocabulary
//! - [`websocket`]: tokio-tungstenite implementation with a reconnection window
//! - [`client`]: request correlation, deadlines, heartbeats, notification dispatch
//! - [`protocol`]: frames and room payloads

pub mod client;
pub mod protocol;
pub mod retry;
pub mod transport;
pub mod websocket;

pub use client::{ConnectivityEvent, NotificationHandler, SignalingClient, SignalingOptions};
pub use protocol::{IceCandidate, ServerNotification, StreamInfo};
pub use retry::RetryPolicy;
pub use transport::{Transport, TransportCommand, TransportEvent, TransportLink};
pub use websocket::WebSocketTransport;
