//! Public session handle
//!
//! Commands perform their signaling and media I/O here, outside the owner
//! task, and then hand the outcome to the owner task for the registry
//! mutation.

use super::actor::{SessionActor, SessionCommand, SessionInput};
use super::model::SessionSnapshot;
use super::state::{SessionState, StatsContext};
use crate::events::SessionEvent;
use crate::media::{acquire_local_media, LocalMedia, MediaEngine, PeerHandle, PublishOptions, RenderSurface};
use crate::signaling::protocol::{
    methods, notifications, JoinRoomParams, OnIceCandidateParams, PublishVideoParams,
    PublishVideoResult, ReceiveVideoParams, ReceiveVideoResult, SignalMessage,
};
use crate::signaling::{IceCandidate, ServerNotification, SignalingClient, StreamInfo};
use crate::{Error, Result};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Everything `joinRoom` needs besides the signaling client
#[derive(Clone)]
pub struct SessionParams {
    pub session_id: String,
    pub token: String,
    pub secret: String,
    pub recorder: bool,
    /// Free-form client data shown to other participants
    pub metadata: String,
    pub stats: Option<StatsContext>,
}

/// A joined session
pub struct Session {
    session_id: String,
    local_connection_id: String,
    signaling: Arc<SignalingClient>,
    engine: Arc<dyn MediaEngine>,
    inputs: mpsc::UnboundedSender<SessionInput>,
    actor: Mutex<Option<JoinHandle<()>>>,
}

fn decode<T: DeserializeOwned>(method: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::Protocol(format!("Invalid {} result: {}", method, e)))
}

impl Session {
    /// Join a room over `signaling`.
    ///
    /// Events, including stats records from a channel sink, are delivered to
    /// `events`. Resolves once `joinRoom` succeeded and the existing
    /// participants are registered.
    pub async fn join(
        signaling: Arc<SignalingClient>,
        engine: Arc<dyn MediaEngine>,
        params: SessionParams,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Self> {
        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();

        for method in notifications::ALL {
            let inputs = inputs_tx.clone();
            signaling.register_notification_handler(method, move |params| {
                match ServerNotification::from_method(method, params) {
                    Ok(notification) => {
                        let _ = inputs.send(SessionInput::Notification(notification));
                    }
                    Err(e) => warn!("Dropping notification: {}", e),
                }
            });
        }

        if let Some(mut connectivity) = signaling.take_connectivity_events() {
            let inputs = inputs_tx.clone();
            tokio::spawn(async move {
                while let Some(event) = connectivity.recv().await {
                    if inputs.send(SessionInput::Connectivity(event)).is_err() {
                        break;
                    }
                }
            });
        }

        let join = JoinRoomParams {
            token: params.token,
            session: params.session_id.clone(),
            metadata: params.metadata,
            secret: params.secret,
            recorder: params.recorder,
            platform: engine.platform_name(),
        };

        let state = SessionState::new(params.session_id.clone(), events, params.stats);
        let actor = SessionActor::new(state, Arc::clone(&signaling), inputs_rx);
        let (joined_tx, joined_rx) = oneshot::channel();
        let task = tokio::spawn(actor.run(join, joined_tx));

        let local_connection_id = match joined_rx.await {
            Ok(Ok(id)) => id,
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(Error::SessionClosed),
        };

        Ok(Self {
            session_id: params.session_id,
            local_connection_id,
            signaling,
            engine,
            inputs: inputs_tx,
            actor: Mutex::new(Some(task)),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn local_connection_id(&self) -> &str {
        &self.local_connection_id
    }

    /// Whether the session has been torn down
    pub fn is_closed(&self) -> bool {
        self.inputs.is_closed()
    }

    async fn command<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> SessionCommand) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.inputs
            .send(SessionInput::Command(build(tx)))
            .map_err(|_| Error::SessionClosed)?;
        rx.await.map_err(|_| Error::SessionClosed)
    }

    /// Current registry contents
    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        self.command(|reply| SessionCommand::Snapshot { reply }).await
    }

    /// Publish local media; resolves with the server-assigned stream id
    pub async fn publish(&self, options: &PublishOptions) -> Result<String> {
        let snapshot = self.snapshot().await?;
        let already = snapshot
            .connection(&self.local_connection_id)
            .and_then(|c| c.stream.as_ref())
            .is_some();
        if already {
            return Err(Error::InvalidState("already publishing".to_string()));
        }

        let media = acquire_local_media(self.engine.as_ref(), options).await?;
        let peer = match self.engine.create_peer(Some(Arc::clone(&media))).await {
            Ok(peer) => peer,
            Err(e) => {
                media.stop();
                return Err(e);
            }
        };

        let info = match self.negotiate_publish(&peer, &media, options).await {
            Ok(info) => info,
            Err(e) => {
                warn!("Failed to publish: {}", e);
                peer.close();
                media.stop();
                return Err(e);
            }
        };

        let stream_id = info.id.clone();
        let registered = self
            .command(|reply| SessionCommand::LocalPublished {
                info,
                peer: Arc::clone(&peer),
                media: Arc::clone(&media),
                mirrored: options.mirrored(),
                reply,
            })
            .await;

        match registered {
            Ok(true) => Ok(stream_id),
            Ok(false) => Err(Error::SessionClosed),
            Err(e) => {
                peer.close();
                media.stop();
                Err(e)
            }
        }
    }

    async fn negotiate_publish(
        &self,
        peer: &Arc<dyn PeerHandle>,
        media: &Arc<dyn LocalMedia>,
        options: &PublishOptions,
    ) -> Result<StreamInfo> {
        let sdp_offer = peer.create_offer().await?;
        let params = PublishVideoParams {
            sdp_offer,
            do_loopback: false,
            has_audio: media.has_audio(),
            has_video: media.has_video(),
            audio_active: options.publish_audio,
            video_active: options.publish_video,
            type_of_video: options.type_of_video().to_string(),
            frame_rate: options.frame_rate,
        };

        let value = self
            .signaling
            .send_request(methods::PUBLISH_VIDEO, serde_json::to_value(&params)?)
            .await?;
        let result: PublishVideoResult = decode(methods::PUBLISH_VIDEO, value)?;
        peer.apply_answer(&result.sdp_answer).await?;

        Ok(StreamInfo {
            id: result.id,
            has_audio: params.has_audio,
            has_video: params.has_video,
            audio_active: params.audio_active,
            video_active: params.video_active,
            type_of_video: Some(params.type_of_video),
            frame_rate: params.frame_rate,
        })
    }

    /// Stop publishing. The local stream is disposed even when the server
    /// request fails; a no-op when nothing is published.
    pub async fn unpublish(&self) -> Result<()> {
        let snapshot = self.snapshot().await?;
        let publishing = snapshot
            .connection(&self.local_connection_id)
            .and_then(|c| c.stream.as_ref())
            .is_some();
        if !publishing {
            debug!("Nothing published in session {}", self.session_id);
            return Ok(());
        }

        let outcome = self
            .signaling
            .send_request(methods::UNPUBLISH_VIDEO, json!({}))
            .await;
        self.command(|reply| SessionCommand::LocalUnpublished { reply })
            .await?;
        outcome.map(|_| ())
    }

    /// Receive a remote stream
    pub async fn subscribe(&self, stream_id: &str) -> Result<()> {
        let snapshot = self.snapshot().await?;
        let stream = snapshot
            .connections
            .iter()
            .filter_map(|c| c.stream.as_ref())
            .find(|s| s.stream_id == stream_id)
            .ok_or_else(|| Error::InvalidState(format!("unknown stream {}", stream_id)))?;
        if stream.local {
            return Err(Error::InvalidState(format!(
                "stream {} is published locally",
                stream_id
            )));
        }
        if stream.subscribed {
            debug!("Already subscribed to {}", stream_id);
            return Ok(());
        }

        let peer = self.engine.create_peer(None).await?;
        if let Err(e) = self.negotiate_subscribe(&peer, stream_id).await {
            warn!("Failed to subscribe to {}: {}", stream_id, e);
            peer.close();
            return Err(e);
        }

        let attached = self
            .command(|reply| SessionCommand::Subscribed {
                stream_id: stream_id.to_string(),
                peer: Arc::clone(&peer),
                reply,
            })
            .await;
        match attached {
            Ok(true) => {
                info!("Subscribed to {}", stream_id);
                Ok(())
            }
            // Unpublished while negotiating; the peer is already closed
            Ok(false) => Ok(()),
            Err(e) => {
                peer.close();
                Err(e)
            }
        }
    }

    async fn negotiate_subscribe(&self, peer: &Arc<dyn PeerHandle>, stream_id: &str) -> Result<()> {
        let sdp_offer = peer.create_offer().await?;
        let params = ReceiveVideoParams {
            sender: stream_id.to_string(),
            sdp_offer,
        };
        let value = self
            .signaling
            .send_request(methods::RECEIVE_VIDEO_FROM, serde_json::to_value(&params)?)
            .await?;
        let result: ReceiveVideoResult = decode(methods::RECEIVE_VIDEO_FROM, value)?;
        peer.apply_answer(&result.sdp_answer).await
    }

    /// Stop receiving a remote stream; the stream stays registered
    pub async fn unsubscribe(&self, stream_id: &str) -> Result<()> {
        let snapshot = self.snapshot().await?;
        let subscribed = snapshot
            .connections
            .iter()
            .filter_map(|c| c.stream.as_ref())
            .any(|s| s.stream_id == stream_id && s.subscribed);
        if !subscribed {
            return Ok(());
        }

        let outcome = self
            .signaling
            .send_request(methods::UNSUBSCRIBE_FROM_VIDEO, json!({ "sender": stream_id }))
            .await;
        self.command(|reply| SessionCommand::Unsubscribed {
            stream_id: stream_id.to_string(),
            reply,
        })
        .await?;
        outcome.map(|_| ())
    }

    /// Send a signal to `to`, or to every participant when empty
    pub async fn send_signal(&self, signal_type: Option<&str>, data: &str, to: &[String]) -> Result<()> {
        let message = SignalMessage {
            to: to.to_vec(),
            data: data.to_string(),
            signal_type: match signal_type {
                Some(t) => format!("signal:{}", t),
                None => "signal".to_string(),
            },
        };
        let params = json!({ "message": serde_json::to_string(&message)? });
        self.signaling
            .send_request(methods::SEND_MESSAGE, params)
            .await
            .map(|_| ())
    }

    /// Forward a local ICE candidate; only transport failures are reported
    pub fn send_ice_candidate(&self, endpoint_name: &str, candidate: &IceCandidate) -> Result<()> {
        let params = OnIceCandidateParams {
            endpoint_name: endpoint_name.to_string(),
            candidate: candidate.clone(),
        };
        self.signaling
            .send_detached(methods::ON_ICE_CANDIDATE, serde_json::to_value(&params)?)
    }

    /// Attach a rendering surface to a stream; `false` when the stream is gone
    pub async fn attach_surface(&self, stream_id: &str, surface: Arc<dyn RenderSurface>) -> Result<bool> {
        self.command(|reply| SessionCommand::AttachSurface {
            stream_id: stream_id.to_string(),
            surface,
            reply,
        })
        .await
    }

    /// Leave the room and dispose every stream. Idempotent.
    pub async fn disconnect(&self) -> Result<()> {
        match self
            .command(|reply| SessionCommand::Disconnect { reply: Some(reply) })
            .await
        {
            Ok(()) | Err(Error::SessionClosed) => {}
            Err(e) => return Err(e),
        }

        let task = self.actor.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Session owner task ended abnormally: {}", e);
            }
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self
            .inputs
            .send(SessionInput::Command(SessionCommand::Disconnect { reply: None }));
    }
}
