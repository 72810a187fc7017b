//! Configuration types for the OpenRoom client

use crate::signaling::RetryPolicy;
use crate::stats::ReportShape;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration for [`RoomClient`](crate::RoomClient)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// WebSocket signaling server URL (ws:// or wss://)
    pub signaling_url: String,

    /// Deadline for a single JSON-RPC request (default: 15000ms)
    pub request_timeout_ms: u64,

    /// Heartbeat period (default: 5000ms)
    pub heartbeat_interval_ms: u64,

    /// Reconnection window used by the WebSocket transport
    pub reconnect: RetryPolicy,

    /// WebRTC statistics collection
    pub stats: StatsConfig,
}

/// Statistics collection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Attach a stats monitor to every stream with a peer (default: false)
    pub enabled: bool,

    /// Polling period (default: 1000ms, range: 100-60000ms)
    pub interval_ms: u64,

    /// POST records to this endpoint instead of the session event channel
    pub http_endpoint: Option<String>,

    /// Execution label attached to HTTP records
    pub exec: String,

    /// Component label attached to HTTP records
    pub component: String,

    /// Force a report shape instead of probing the media engine
    pub report_shape: Option<ReportShape>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            signaling_url: "wss://localhost:4443/openvidu".to_string(),
            request_timeout_ms: 15_000,
            heartbeat_interval_ms: 5_000,
            reconnect: RetryPolicy::default(),
            stats: StatsConfig::default(),
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: 1_000,
            http_endpoint: None,
            exec: String::new(),
            component: String::new(),
            report_shape: None,
        }
    }
}

impl ClientConfig {
    /// Parse configuration from a JSON document, filling unspecified fields
    /// with defaults
    pub fn from_json_str(json: &str) -> crate::Result<Self> {
        let config: ClientConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Request deadline as a [`Duration`]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Heartbeat period as a [`Duration`]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `signaling_url` is not a WebSocket URL
    /// - `request_timeout_ms` or `heartbeat_interval_ms` is zero
    /// - `stats.interval_ms` is not in range 100-60000
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if !self.signaling_url.starts_with("ws://") && !self.signaling_url.starts_with("wss://") {
            return Err(Error::InvalidConfig(format!(
                "signaling_url must start with ws:// or wss://, got {}",
                self.signaling_url
            )));
        }

        if self.request_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "request_timeout_ms must be greater than zero".to_string(),
            ));
        }

        if self.heartbeat_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "heartbeat_interval_ms must be greater than zero".to_string(),
            ));
        }

        if !(100..=60_000).contains(&self.stats.interval_ms) {
            return Err(Error::InvalidConfig(format!(
                "stats.interval_ms must be in range 100-60000, got {}",
                self.stats.interval_ms
            )));
        }

        Ok(())
    }
}

impl StatsConfig {
    /// Polling period as a [`Duration`]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}
