//! Persistent signaling transport abstraction
//!
//! A transport owns one framed, bidirectional connection and its reconnection
//! window. The signaling client talks to it exclusively through a
//! [`TransportLink`]: commands go down, frames and connectivity events come up
//! in the order they happened.

use crate::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Instruction from the signaling client to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    /// Send one text frame
    Send(String),
    /// Drop the current connection and run the reconnection window
    Reconnect,
    /// Close for good
    Close,
}

/// Event surfaced by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One text frame received
    Message(String),
    /// Connection lost; the reconnection window starts
    Disconnected {
        /// Cause reported by the transport
        reason: String,
    },
    /// A reconnection attempt is about to run (1-based)
    Reconnecting {
        /// Attempt number
        attempt: usize,
    },
    /// Connection re-established inside the window
    Reconnected,
    /// Reconnection window exhausted; terminal
    Failed {
        /// Last error observed
        reason: String,
    },
    /// Closed on request; terminal
    Closed,
}

impl TransportEvent {
    /// Whether no further events will follow
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransportEvent::Failed { .. } | TransportEvent::Closed)
    }
}

/// Both directions of an open transport
pub struct TransportLink {
    /// Commands to the transport
    pub commands: mpsc::UnboundedSender<TransportCommand>,
    /// Frames and connectivity events from the transport
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

impl TransportLink {
    /// Create a link together with the transport-side ends
    pub fn pair() -> (
        TransportLink,
        mpsc::UnboundedReceiver<TransportCommand>,
        mpsc::UnboundedSender<TransportEvent>,
    ) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (evt_tx, evt_rx) = mpsc::unbounded_channel();
        (
            TransportLink {
                commands: cmd_tx,
                events: evt_rx,
            },
            cmd_rx,
            evt_tx,
        )
    }
}

/// Factory for signaling connections
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a connection to `uri`.
    ///
    /// Resolves once the connection is usable. Failures here are reported to
    /// the caller directly; failures after this point arrive as events.
    async fn open(&self, uri: &str) -> Result<TransportLink>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_events() {
        assert!(TransportEvent::Closed.is_terminal());
        assert!(TransportEvent::Failed {
            reason: "refused".to_string()
        }
        .is_terminal());
        assert!(!TransportEvent::Reconnected.is_terminal());
        assert!(!TransportEvent::Disconnected {
            reason: "reset".to_string()
        }
        .is_terminal());
    }

    #[tokio::test]
    async fn test_pair_wires_both_directions() {
        let (mut link, mut commands, events) = TransportLink::pair();
        link.commands
            .send(TransportCommand::Send("{}".to_string()))
            .unwrap();
        assert_eq!(
            commands.recv().await,
            Some(TransportCommand::Send("{}".to_string()))
        );

        events.send(TransportEvent::Reconnected).unwrap();
        assert_eq!(link.events.recv().await, Some(TransportEvent::Reconnected));
    }
}
