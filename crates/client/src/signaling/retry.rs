//! Reconnection backoff policy
//!
//! Bounds the window during which the transport keeps retrying after the
//! signaling connection drops. Exhausting it is what turns a transient blip
//! into a `networkDisconnect` teardown.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff policy for re-establishing the signaling connection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Give up immediately after a disconnect
    None,

    /// Fixed number of attempts with constant delay
    Fixed {
        /// Number of reconnection attempts
        attempts: usize,
        /// Delay before each attempt, in milliseconds
        delay_ms: u64,
    },

    /// Exponential backoff
    Exponential {
        /// Delay before the first attempt, in milliseconds
        base_delay_ms: u64,
        /// Upper bound for any single delay, in milliseconds
        max_delay_ms: u64,
        /// Maximum number of attempts
        max_attempts: usize,
        /// Backoff multiplier (typically 2.0)
        multiplier: f64,
    },
}

impl RetryPolicy {
    /// Create a fixed retry policy
    pub fn fixed(attempts: usize, delay: Duration) -> Self {
        RetryPolicy::Fixed {
            attempts,
            delay_ms: delay.as_millis() as u64,
        }
    }

    /// Create an exponential backoff policy starting at 500ms, capped at 8s
    pub fn exponential(max_attempts: usize) -> Self {
        RetryPolicy::Exponential {
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            max_attempts,
            multiplier: 2.0,
        }
    }

    /// Get delay before a specific attempt number (0-indexed), or `None`
    /// once the window is exhausted
    pub fn delay_for_attempt(&self, attempt: usize) -> Option<Duration> {
        match self {
            RetryPolicy::None => None,
            RetryPolicy::Fixed { attempts, delay_ms } => {
                if attempt < *attempts {
                    Some(Duration::from_millis(*delay_ms))
                } else {
                    None
                }
            }
            RetryPolicy::Exponential {
                base_delay_ms,
                max_delay_ms,
                max_attempts,
                multiplier,
            } => {
                if attempt >= *max_attempts {
                    return None;
                }

                let delay_ms = (*base_delay_ms as f64) * multiplier.powi(attempt as i32);
                let delay = Duration::from_millis(delay_ms as u64);

                Some(delay.min(Duration::from_millis(*max_delay_ms)))
            }
        }
    }

    /// Get maximum number of attempts
    pub fn max_attempts(&self) -> usize {
        match self {
            RetryPolicy::None => 0,
            RetryPolicy::Fixed { attempts, .. } => *attempts,
            RetryPolicy::Exponential { max_attempts, .. } => *max_attempts,
        }
    }

    /// Sum of every delay in the window
    pub fn total_window(&self) -> Duration {
        (0..self.max_attempts())
            .filter_map(|attempt| self.delay_for_attempt(attempt))
            .sum()
    }
}

impl Default for RetryPolicy {
    /// 6 attempts: 0.5/1/2/4/8/8s, roughly a 23s window
    fn default() -> Self {
        RetryPolicy::exponential(6)
    }
}
