//! Error types for the OpenRoom client

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for OpenRoom client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Why acquiring local media failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaAccessErrorKind {
    /// The user or platform refused camera access
    CameraAccessDenied,
    /// The user or platform refused microphone access
    MicrophoneAccessDenied,
    /// The user refused to share a window/screen
    ScreenCaptureDenied,
    /// Screen sharing is not available on this platform
    ScreenSharingNotSupported,
    /// The screen capture extension is not installed
    ScreenExtensionNotInstalled,
    /// The screen capture extension is installed but disabled
    ScreenExtensionDisabled,
}

/// Error types that can occur in the OpenRoom client
#[derive(Debug, Error)]
pub enum Error {
    /// Connection-level failure of the signaling transport
    #[error("Transport error: {0}")]
    Transport(String),

    /// The transport dropped while a request was in flight, or is not open
    #[error("Transport closed")]
    TransportClosed,

    /// No response arrived for a request before its deadline
    #[error("Request '{method}' (id {id}) timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// JSON-RPC method name
        method: String,
        /// Correlation id of the abandoned request
        id: u64,
        /// Deadline that expired
        timeout_ms: u64,
    },

    /// Malformed or unexpected server payload
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server answered a request with a JSON-RPC error object
    #[error("RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code
        code: i64,
        /// Server-supplied message
        message: String,
    },

    /// Local media acquisition failed
    #[error("Media access error ({kind:?}): {message}")]
    MediaAccess {
        /// Failure category
        kind: MediaAccessErrorKind,
        /// Collaborator-supplied detail
        message: String,
    },

    /// A stats report did not match any known shape
    #[error("Stats normalization error: {0}")]
    StatsNormalization(String),

    /// Configuration error
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Join token could not be interpreted
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Operation not valid in the current session state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The session has been torn down
    #[error("Session closed")]
    SessionClosed,

    /// HTTP error from the stats sink
    #[error("HTTP error: {0}")]
    Http(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a media access error
    pub fn media_access(kind: MediaAccessErrorKind, message: impl Into<String>) -> Self {
        Error::MediaAccess {
            kind,
            message: message.into(),
        }
    }

    /// Whether this failure belongs to the connection as a whole rather than
    /// to the single operation that observed it
    pub fn is_transport_level(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::TransportClosed)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_level_classification() {
        assert!(Error::TransportClosed.is_transport_level());
        assert!(Error::Transport("reset".to_string()).is_transport_level());
        assert!(!Error::RequestTimeout {
            method: "publishVideo".to_string(),
            id: 7,
            timeout_ms: 15000,
        }
        .is_transport_level());
        assert!(!Error::Protocol("bad frame".to_string()).is_transport_level());
    }

    #[test]
    fn test_timeout_message_names_method() {
        let err = Error::RequestTimeout {
            method: "joinRoom".to_string(),
            id: 1,
            timeout_ms: 15000,
        };
        assert_eq!(
            err.to_string(),
            "Request 'joinRoom' (id 1) timed out after 15000ms"
        );
    }
}
