//! Reconnection handling
//!
//! The transport owns the retry window; this only decides what each
//! connectivity change means for the session. Transient loss leaves the
//! registry untouched, and notifications resume on the same connection
//! after a reconnect, so the existing model is kept as is.

use crate::events::DisconnectReason;
use crate::signaling::ConnectivityEvent;
use tokio::time::Instant;
use tracing::{info, warn};

/// Session-level reaction to a connectivity change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectAction {
    /// Nothing to do yet
    Wait,
    /// Report a non-terminal degraded state
    Degraded { attempt: usize },
    /// Report recovery
    Restored,
    /// Tear the session down
    Teardown(DisconnectReason),
}

/// Tracks the degraded period between a loss and its outcome
#[derive(Debug, Default)]
pub struct ReconnectionManager {
    degraded_since: Option<Instant>,
    attempts: usize,
    closing: bool,
}

impl ReconnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// The local side is closing; a `Closed` transport is then expected
    pub fn mark_closing(&mut self) {
        self.closing = true;
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded_since.is_some()
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn on_event(&mut self, event: &ConnectivityEvent) -> ReconnectAction {
        let action = decide(event, self.closing);
        match action {
            ReconnectAction::Wait => {
                if matches!(event, ConnectivityEvent::Disconnected { .. }) {
                    self.degraded_since.get_or_insert_with(Instant::now);
                }
            }
            ReconnectAction::Degraded { attempt } => {
                self.degraded_since.get_or_insert_with(Instant::now);
                self.attempts = attempt;
            }
            ReconnectAction::Restored => {
                if let Some(since) = self.degraded_since.take() {
                    info!(
                        "Signaling restored after {:?} and {} attempt(s)",
                        since.elapsed(),
                        self.attempts
                    );
                }
                self.attempts = 0;
            }
            ReconnectAction::Teardown(_) => {
                self.degraded_since = None;
            }
        }
        action
    }
}

/// Map one connectivity event to an action.
///
/// `closing` is set once the local side asked the transport to close.
pub fn decide(event: &ConnectivityEvent, closing: bool) -> ReconnectAction {
    match event {
        ConnectivityEvent::Disconnected { reason } => {
            warn!("Signaling connection lost ({}), waiting for reconnection", reason);
            ReconnectAction::Wait
        }
        ConnectivityEvent::Reconnecting { attempt } => ReconnectAction::Degraded { attempt: *attempt },
        ConnectivityEvent::Reconnected => ReconnectAction::Restored,
        ConnectivityEvent::Failed { reason } => {
            warn!("Signaling reconnection window exhausted: {}", reason);
            ReconnectAction::Teardown(DisconnectReason::NetworkDisconnect)
        }
        ConnectivityEvent::Closed if closing => ReconnectAction::Wait,
        ConnectivityEvent::Closed => ReconnectAction::Teardown(DisconnectReason::NetworkDisconnect),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_loss_is_not_terminal() {
        let mut manager = ReconnectionManager::new();
        let lost = ConnectivityEvent::Disconnected {
            reason: "reset".to_string(),
        };
        assert_eq!(manager.on_event(&lost), ReconnectAction::Wait);
        assert!(manager.is_degraded());
        assert_eq!(
            manager.on_event(&ConnectivityEvent::Reconnecting { attempt: 2 }),
            ReconnectAction::Degraded { attempt: 2 }
        );
        assert_eq!(manager.attempts(), 2);
        assert_eq!(
            manager.on_event(&ConnectivityEvent::Reconnected),
            ReconnectAction::Restored
        );
        assert!(!manager.is_degraded());
        assert_eq!(manager.attempts(), 0);
    }

    #[test]
    fn test_exhausted_window_is_network_disconnect() {
        assert_eq!(
            decide(
                &ConnectivityEvent::Failed {
                    reason: "refused".to_string()
                },
                false
            ),
            ReconnectAction::Teardown(DisconnectReason::NetworkDisconnect)
        );
    }

    #[test]
    fn test_closed_depends_on_who_closed() {
        assert_eq!(decide(&ConnectivityEvent::Closed, true), ReconnectAction::Wait);
        assert_eq!(
            decide(&ConnectivityEvent::Closed, false),
            ReconnectAction::Teardown(DisconnectReason::NetworkDisconnect)
        );
    }
}
