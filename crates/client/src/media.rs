//! Media collaborators
//!
//! Device access, native peer connections, rendering surfaces and the
//! screen-capture extension live outside this crate. The session only calls
//! their lifecycle methods through the traits below.

use crate::error::MediaAccessErrorKind;
use crate::signaling::IceCandidate;
use crate::stats::RawStatsReport;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Native WebRTC connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Captured local media (camera/microphone/screen)
pub trait LocalMedia: Send + Sync {
    fn has_audio(&self) -> bool;
    fn has_video(&self) -> bool;
    /// Stop every captured track
    fn stop(&self);
}

/// Native peer connection
#[async_trait]
pub trait PeerHandle: Send + Sync {
    /// Generate the local SDP offer
    async fn create_offer(&self) -> Result<String>;

    /// Apply the remote SDP answer
    async fn apply_answer(&self, sdp_answer: &str) -> Result<()>;

    /// Add a remote ICE candidate
    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()>;

    /// Current cumulative counters
    async fn get_stats(&self) -> Result<RawStatsReport>;

    fn connection_state(&self) -> PeerConnectionState;

    /// Release the native connection. Must be idempotent.
    fn close(&self);
}

/// Where a stream is being rendered (a video element in a browser)
pub trait RenderSurface: Send + Sync {
    fn detach(&self);

    /// Flip the rendering horizontally; only requested for local camera streams
    fn set_mirrored(&self, _mirrored: bool) {}
}

/// Screen-capture extension availability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtensionStatus {
    NotInstalled,
    InstalledEnabled,
    InstalledDisabled,
}

/// Platform capabilities the session depends on
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Acquire local media honoring `constraints`
    async fn acquire_media(&self, constraints: &MediaConstraints) -> Result<Arc<dyn LocalMedia>>;

    /// Create a peer connection, sending `media` when given
    async fn create_peer(&self, media: Option<Arc<dyn LocalMedia>>) -> Result<Arc<dyn PeerHandle>>;

    /// Probe the screen-capture extension
    async fn probe_screen_extension(&self) -> ExtensionStatus;

    /// Platform identifier (e.g. "Chrome", "Firefox"), used to pick a stats normalizer
    fn platform_name(&self) -> String;

    /// Whether screen capture is possible at all on this platform
    fn supports_screen_sharing(&self) -> bool {
        true
    }
}

/// Audio input selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioSource {
    #[default]
    Default,
    Disabled,
    Device(String),
}

/// Video input selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoSource {
    #[default]
    Default,
    Disabled,
    Device(String),
    Screen,
}

/// What to publish
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishOptions {
    pub audio_source: AudioSource,
    pub video_source: VideoSource,
    /// Start with audio unmuted
    pub publish_audio: bool,
    /// Start with video enabled
    pub publish_video: bool,
    /// "WIDTHxHEIGHT"
    pub resolution: String,
    pub frame_rate: Option<u32>,
    /// Render the local camera flipped, like a mirror
    pub mirror: bool,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            audio_source: AudioSource::Default,
            video_source: VideoSource::Default,
            publish_audio: true,
            publish_video: true,
            resolution: "640x480".to_string(),
            frame_rate: None,
            mirror: true,
        }
    }
}

/// Audio track request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioConstraint {
    Disabled,
    Any,
    Exact { device_id: String },
}

/// Video track request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoConstraints {
    pub device_id: Option<String>,
    pub screen: bool,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub ideal_frame_rate: Option<u32>,
}

/// Device request handed to [`MediaEngine::acquire_media`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: AudioConstraint,
    pub video: Option<VideoConstraints>,
}

impl PublishOptions {
    /// Whether this publishes a screen instead of a camera
    pub fn is_screen(&self) -> bool {
        self.video_source == VideoSource::Screen
    }

    /// Whether the local rendering should be flipped; never for screens
    pub fn mirrored(&self) -> bool {
        self.mirror && !self.is_screen()
    }

    /// Wire value for `typeOfVideo`
    pub fn type_of_video(&self) -> &'static str {
        if self.is_screen() {
            "SCREEN"
        } else {
            "CAMERA"
        }
    }

    /// Build the device request for these options
    pub fn media_constraints(&self) -> Result<MediaConstraints> {
        let audio = match &self.audio_source {
            AudioSource::Disabled => AudioConstraint::Disabled,
            AudioSource::Default => AudioConstraint::Any,
            AudioSource::Device(id) => AudioConstraint::Exact {
                device_id: id.clone(),
            },
        };

        let video = match &self.video_source {
            VideoSource::Disabled => None,
            source => {
                let (ideal_width, ideal_height) = parse_resolution(&self.resolution)?;
                Some(VideoConstraints {
                    device_id: match source {
                        VideoSource::Device(id) => Some(id.clone()),
                        _ => None,
                    },
                    screen: *source == VideoSource::Screen,
                    ideal_width,
                    ideal_height,
                    ideal_frame_rate: self.frame_rate,
                })
            }
        };

        if audio == AudioConstraint::Disabled && video.is_none() {
            return Err(Error::InvalidConfig(
                "at least one of audio or video must be enabled".to_string(),
            ));
        }

        Ok(MediaConstraints { audio, video })
    }
}

fn parse_resolution(resolution: &str) -> Result<(u32, u32)> {
    let lower = resolution.to_ascii_lowercase();
    let (w, h) = lower
        .split_once('x')
        .ok_or_else(|| Error::InvalidConfig(format!("resolution must be WxH, got {}", resolution)))?;
    let parse = |s: &str| {
        s.trim()
            .parse::<u32>()
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| Error::InvalidConfig(format!("invalid resolution: {}", resolution)))
    };
    Ok((parse(w)?, parse(h)?))
}

/// Acquire local media for `options`, going through the screen extension
/// probe first when sharing a screen
pub async fn acquire_local_media(
    engine: &dyn MediaEngine,
    options: &PublishOptions,
) -> Result<Arc<dyn LocalMedia>> {
    let constraints = options.media_constraints()?;

    if options.is_screen() {
        if !engine.supports_screen_sharing() {
            return Err(Error::media_access(
                MediaAccessErrorKind::ScreenSharingNotSupported,
                format!("screen sharing unavailable on {}", engine.platform_name()),
            ));
        }
        match engine.probe_screen_extension().await {
            ExtensionStatus::InstalledEnabled => debug!("Screen extension available"),
            ExtensionStatus::InstalledDisabled => {
                return Err(Error::media_access(
                    MediaAccessErrorKind::ScreenExtensionDisabled,
                    "You must enable the screen extension",
                ));
            }
            ExtensionStatus::NotInstalled => {
                return Err(Error::media_access(
                    MediaAccessErrorKind::ScreenExtensionNotInstalled,
                    "Screen extension not installed",
                ));
            }
        }
    }

    engine.acquire_media(&constraints).await.map_err(|e| match e {
        Error::MediaAccess { .. } => e,
        other => {
            let kind = if options.is_screen() {
                MediaAccessErrorKind::ScreenCaptureDenied
            } else if constraints.video.is_none() {
                MediaAccessErrorKind::MicrophoneAccessDenied
            } else {
                MediaAccessErrorKind::CameraAccessDenied
            };
            warn!("Media acquisition failed: {}", other);
            Error::media_access(kind, other.to_string())
        }
    })
}
