//! Media test doubles
//!
//! Every lifecycle call lands in a shared [`CallLog`]. When a session event
//! stream is attached to the log, events already emitted are flushed into it
//! before each call is recorded, so the log shows the true interleaving of
//! native resource release and outward events.

use async_trait::async_trait;
use openroom_client::signaling::IceCandidate;
use openroom_client::stats::RawStatsReport;
use openroom_client::{
    Error, ExtensionStatus, LocalMedia, MediaAccessErrorKind, MediaConstraints, MediaEngine,
    PeerConnectionState, PeerHandle, RenderSurface, Result, SessionEvent,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Ordered record of lifecycle calls
#[derive(Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
    events: Arc<Mutex<Option<mpsc::UnboundedReceiver<SessionEvent>>>>,
    seen: Arc<Mutex<Vec<SessionEvent>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interleave session events with recorded calls from now on
    pub fn attach_events(&self, events: mpsc::UnboundedReceiver<SessionEvent>) {
        *self.events.lock() = Some(events);
    }

    fn flush_events(&self) {
        let mut guard = self.events.lock();
        if let Some(rx) = guard.as_mut() {
            while let Ok(event) = rx.try_recv() {
                self.entries.lock().push(format!("event:{}", event.name()));
                self.seen.lock().push(event);
            }
        }
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.flush_events();
        self.entries.lock().push(entry.into());
    }

    /// Everything recorded so far, with pending events flushed
    pub fn entries(&self) -> Vec<String> {
        self.flush_events();
        self.entries.lock().clone()
    }

    /// Events captured through the attached stream
    pub fn events(&self) -> Vec<SessionEvent> {
        self.flush_events();
        self.seen.lock().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| e.as_str() == entry).count()
    }

    pub fn clear(&self) {
        self.flush_events();
        self.entries.lock().clear();
        self.seen.lock().clear();
    }
}

/// Peer connection double
pub struct MockPeer {
    pub name: String,
    log: CallLog,
    reports: Mutex<VecDeque<Result<RawStatsReport>>>,
    stats_calls: AtomicUsize,
    closed: AtomicBool,
    candidates: Mutex<Vec<IceCandidate>>,
}

impl MockPeer {
    pub fn new(name: impl Into<String>, log: CallLog) -> Self {
        Self {
            name: name.into(),
            log,
            reports: Mutex::new(VecDeque::new()),
            stats_calls: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            candidates: Mutex::new(Vec::new()),
        }
    }

    /// Queue reports returned by successive `get_stats` calls
    pub fn script_stats(&self, reports: impl IntoIterator<Item = Result<RawStatsReport>>) {
        self.reports.lock().extend(reports);
    }

    pub fn stats_calls(&self) -> usize {
        self.stats_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn candidates(&self) -> Vec<IceCandidate> {
        self.candidates.lock().clone()
    }
}

#[async_trait]
impl PeerHandle for MockPeer {
    async fn create_offer(&self) -> Result<String> {
        self.log.record(format!("peer.offer:{}", self.name));
        Ok(format!("v=0 offer {}", self.name))
    }

    async fn apply_answer(&self, sdp_answer: &str) -> Result<()> {
        self.log.record(format!("peer.answer:{}:{}", self.name, sdp_answer));
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()> {
        self.candidates.lock().push(candidate.clone());
        self.log.record(format!("peer.ice:{}", self.name));
        Ok(())
    }

    async fn get_stats(&self) -> Result<RawStatsReport> {
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        self.reports
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Transport("no more scripted stats".to_string())))
    }

    fn connection_state(&self) -> PeerConnectionState {
        if self.is_closed() {
            PeerConnectionState::Closed
        } else {
            PeerConnectionState::Connected
        }
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.log.record(format!("peer.close:{}", self.name));
        }
    }
}

/// Captured media double
pub struct MockMedia {
    log: CallLog,
    audio: bool,
    video: bool,
}

impl LocalMedia for MockMedia {
    fn has_audio(&self) -> bool {
        self.audio
    }

    fn has_video(&self) -> bool {
        self.video
    }

    fn stop(&self) {
        self.log.record("media.stop");
    }
}

/// Rendering surface double
pub struct MockSurface {
    pub name: String,
    log: CallLog,
    mirrored: AtomicBool,
}

impl MockSurface {
    pub fn new(name: impl Into<String>, log: CallLog) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            log,
            mirrored: AtomicBool::new(false),
        })
    }

    pub fn is_mirrored(&self) -> bool {
        self.mirrored.load(Ordering::SeqCst)
    }
}

impl RenderSurface for MockSurface {
    fn detach(&self) {
        self.log.record(format!("surface.detach:{}", self.name));
    }

    fn set_mirrored(&self, mirrored: bool) {
        self.mirrored.store(mirrored, Ordering::SeqCst);
    }
}

/// Media engine double
pub struct MockEngine {
    pub log: CallLog,
    peers: Mutex<Vec<Arc<MockPeer>>>,
    stats_for_new_peers: Mutex<Vec<RawStatsReport>>,
    media_failure: Mutex<Option<Error>>,
    extension: Mutex<ExtensionStatus>,
    last_constraints: Mutex<Option<MediaConstraints>>,
    platform: String,
}

impl MockEngine {
    pub fn new(log: CallLog) -> Arc<Self> {
        Self::with_platform(log, "Firefox")
    }

    pub fn with_platform(log: CallLog, platform: &str) -> Arc<Self> {
        Arc::new(Self {
            log,
            peers: Mutex::new(Vec::new()),
            stats_for_new_peers: Mutex::new(Vec::new()),
            media_failure: Mutex::new(None),
            extension: Mutex::new(ExtensionStatus::InstalledEnabled),
            last_constraints: Mutex::new(None),
            platform: platform.to_string(),
        })
    }

    /// Peers created so far, in creation order
    pub fn peers(&self) -> Vec<Arc<MockPeer>> {
        self.peers.lock().clone()
    }

    pub fn peer(&self, index: usize) -> Arc<MockPeer> {
        Arc::clone(&self.peers.lock()[index])
    }

    /// Stats every new peer will report
    pub fn script_stats(&self, reports: Vec<RawStatsReport>) {
        *self.stats_for_new_peers.lock() = reports;
    }

    /// Make the next `acquire_media` fail with `error`
    pub fn fail_media(&self, error: Error) {
        *self.media_failure.lock() = Some(error);
    }

    pub fn set_extension(&self, status: ExtensionStatus) {
        *self.extension.lock() = status;
    }

    pub fn last_constraints(&self) -> Option<MediaConstraints> {
        self.last_constraints.lock().clone()
    }
}

#[async_trait]
impl MediaEngine for MockEngine {
    async fn acquire_media(&self, constraints: &MediaConstraints) -> Result<Arc<dyn LocalMedia>> {
        *self.last_constraints.lock() = Some(constraints.clone());
        if let Some(error) = self.media_failure.lock().take() {
            self.log.record("media.denied");
            return Err(error);
        }
        self.log.record("media.acquire");
        Ok(Arc::new(MockMedia {
            log: self.log.clone(),
            audio: !matches!(constraints.audio, openroom_client::media::AudioConstraint::Disabled),
            video: constraints.video.is_some(),
        }))
    }

    async fn create_peer(&self, media: Option<Arc<dyn LocalMedia>>) -> Result<Arc<dyn PeerHandle>> {
        let mut peers = self.peers.lock();
        let role = if media.is_some() { "pub" } else { "sub" };
        let peer = Arc::new(MockPeer::new(
            format!("{}{}", role, peers.len()),
            self.log.clone(),
        ));
        peer.script_stats(self.stats_for_new_peers.lock().iter().cloned().map(Ok));
        peers.push(Arc::clone(&peer));
        Ok(peer)
    }

    async fn probe_screen_extension(&self) -> ExtensionStatus {
        *self.extension.lock()
    }

    fn platform_name(&self) -> String {
        self.platform.clone()
    }
}

/// Shorthand for a media access failure
pub fn denied(kind: MediaAccessErrorKind) -> Error {
    Error::media_access(kind, "Permission denied")
}
