//! Client context
//!
//! [`RoomClient`] bundles configuration, the signaling transport, the media
//! engine and the stats sink, and creates sessions from them. Nothing is
//! global: every session gets its own signaling client.

use crate::config::ClientConfig;
use crate::events::SessionEvent;
use crate::media::MediaEngine;
use crate::session::{Session, SessionParams, StatsContext};
use crate::signaling::{SignalingClient, SignalingOptions, Transport, WebSocketTransport};
use crate::stats::{ChannelStatsSink, HttpStatsSink, ReportShape, StatsSink};
use crate::token::JoinToken;
use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// Per-join options
#[derive(Debug, Clone, Default)]
pub struct JoinOptions {
    /// Session to join when the token does not name one
    pub session_id: Option<String>,
    /// Client data shown to other participants
    pub metadata: String,
}

/// Entry point for joining rooms
pub struct RoomClient {
    config: ClientConfig,
    engine: Arc<dyn MediaEngine>,
    transport: Arc<dyn Transport>,
    stats_sink: Option<Arc<dyn StatsSink>>,
    report_shape: ReportShape,
}

impl RoomClient {
    /// Client over a WebSocket transport using the configured retry window
    pub fn new(config: ClientConfig, engine: Arc<dyn MediaEngine>) -> Result<Self> {
        let transport = Arc::new(WebSocketTransport::new(config.reconnect));
        Self::with_transport(config, engine, transport)
    }

    /// Client over an arbitrary transport
    pub fn with_transport(
        config: ClientConfig,
        engine: Arc<dyn MediaEngine>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        config.validate()?;

        let report_shape = config
            .stats
            .report_shape
            .unwrap_or_else(|| ReportShape::probe(&engine.platform_name()));

        let stats_sink = match HttpStatsSink::from_config(&config.stats)? {
            Some(sink) => Some(Arc::new(sink) as Arc<dyn StatsSink>),
            None => None,
        };

        Ok(Self {
            config,
            engine,
            transport,
            stats_sink,
            report_shape,
        })
    }

    /// Send stats records to `sink` instead of the session event stream
    pub fn with_stats_sink(mut self, sink: Arc<dyn StatsSink>) -> Self {
        self.stats_sink = Some(sink);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Stats report shape chosen at construction
    pub fn report_shape(&self) -> ReportShape {
        self.report_shape
    }

    /// Connect, join and return the session with its event stream
    pub async fn join(
        &self,
        token: &str,
        options: JoinOptions,
    ) -> Result<(Session, mpsc::UnboundedReceiver<SessionEvent>)> {
        let token = JoinToken::parse(token)?;
        let session_id = token
            .session_id
            .clone()
            .or(options.session_id)
            .ok_or_else(|| Error::InvalidToken("no session id in token or options".to_string()))?;
        let url = token
            .signaling_url
            .clone()
            .unwrap_or_else(|| self.config.signaling_url.clone());

        info!("Joining session {} via {}", session_id, url);

        let signaling = SignalingClient::connect(
            self.transport.as_ref(),
            &url,
            SignalingOptions {
                request_timeout: self.config.request_timeout(),
                heartbeat_interval: self.config.heartbeat_interval(),
            },
        )
        .await?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let stats = self.config.stats.enabled.then(|| StatsContext {
            normalizer: self.report_shape.normalizer(),
            sink: self
                .stats_sink
                .clone()
                .unwrap_or_else(|| Arc::new(ChannelStatsSink::new(events_tx.clone())) as Arc<dyn StatsSink>),
            interval: self.config.stats.interval(),
        });

        let session = Session::join(
            Arc::new(signaling),
            Arc::clone(&self.engine),
            SessionParams {
                session_id,
                token: token.token,
                secret: token.secret,
                recorder: token.recorder,
                metadata: options.metadata,
                stats,
            },
            events_tx,
        )
        .await?;

        Ok((session, events_rx))
    }
}
