//! Command-line room observer
//!
//! Joins a room without publishing and logs every session event.
//!
//! # Usage
//!
//! ```bash
//! # Join with a server-issued URL token
//! cargo run --features cli --bin openroom-join -- \
//!   --token 'wss://media.example.org:4443?sessionId=ses_A&token=tok_B'
//!
//! # Opaque token against an explicit server
//! cargo run --features cli --bin openroom-join -- \
//!   --url wss://localhost:4443/openvidu --session ses_A --token tok_B
//! ```

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use openroom_client::{
    ClientConfig, Error, ExtensionStatus, JoinOptions, LocalMedia,
    MediaConstraints, MediaEngine, PeerHandle, RoomClient, SessionEvent,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// OpenRoom join client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Signaling URL, used when the token does not carry one
    #[arg(long, env = "OPENROOM_SIGNALING_URL")]
    url: Option<String>,

    /// Join token
    #[arg(long, env = "OPENROOM_TOKEN")]
    token: String,

    /// Session id, used when the token does not carry one
    #[arg(long, env = "OPENROOM_SESSION")]
    session: Option<String>,

    /// Client metadata shown to other participants
    #[arg(long, default_value = "")]
    metadata: String,

    /// JSON configuration file
    #[arg(long, env = "OPENROOM_CONFIG")]
    config: Option<PathBuf>,
}

/// Engine for a process with no devices and no native WebRTC stack
struct HeadlessEngine;

#[async_trait]
impl MediaEngine for HeadlessEngine {
    async fn acquire_media(&self, _constraints: &MediaConstraints) -> openroom_client::Result<Arc<dyn LocalMedia>> {
        Err(Error::InvalidState(
            "no capture devices in headless mode".to_string(),
        ))
    }

    async fn create_peer(
        &self,
        _media: Option<Arc<dyn LocalMedia>>,
    ) -> openroom_client::Result<Arc<dyn PeerHandle>> {
        Err(Error::InvalidState(
            "no peer connections in headless mode".to_string(),
        ))
    }

    async fn probe_screen_extension(&self) -> ExtensionStatus {
        ExtensionStatus::NotInstalled
    }

    fn platform_name(&self) -> String {
        format!("openroom-join/{}", openroom_client::version())
    }

    fn supports_screen_sharing(&self) -> bool {
        false
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(args: &Args) -> anyhow::Result<ClientConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            ClientConfig::from_json_str(&text)?
        }
        None => ClientConfig::default(),
    };
    if let Some(url) = &args.url {
        config.signaling_url = url.clone();
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing();

    info!(version = openroom_client::version(), "openroom-join starting");

    let config = load_config(&args)?;
    let client = RoomClient::new(config, Arc::new(HeadlessEngine))?;

    let (session, mut events) = client
        .join(
            &args.token,
            JoinOptions {
                session_id: args.session.clone(),
                metadata: args.metadata.clone(),
            },
        )
        .await
        .context("joining session")?;

    info!(
        session = session.session_id(),
        connection = session.local_connection_id(),
        "Joined"
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, leaving session");
                session.disconnect().await?;
                break;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                match &event {
                    SessionEvent::MediaError { message } => warn!("Media error: {}", message),
                    SessionEvent::Reconnecting { attempt } => warn!("Reconnecting (attempt {})", attempt),
                    other => info!(event = other.name(), "{:?}", other),
                }
                if event.is_terminal() {
                    break;
                }
            }
        }
    }

    Ok(())
}
