//! Per-stream polling task
//!
//! Each tick pulls the peer's cumulative report, normalizes it, differences
//! it against the baseline and hands the records to the sink. Stopping the
//! monitor lets an in-flight tick finish but never re-arms the timer, and the
//! task drops its peer reference on exit.

use super::engine::{StatsEngine, StatsTarget};
use super::normalize::StatsNormalizer;
use super::sink::StatsSink;
use crate::media::PeerHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Handle to a running stats monitor
pub struct StatsMonitor {
    target: StatsTarget,
    shutdown_tx: mpsc::Sender<()>,
    rebind_tx: mpsc::UnboundedSender<Arc<dyn PeerHandle>>,
    task: Option<JoinHandle<()>>,
}

impl StatsMonitor {
    /// Start polling `peer` every `interval`
    pub fn spawn(
        target: StatsTarget,
        peer: Arc<dyn PeerHandle>,
        normalizer: Arc<dyn StatsNormalizer>,
        sink: Arc<dyn StatsSink>,
        interval: Duration,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let (rebind_tx, rebind_rx) = mpsc::unbounded_channel();

        info!(
            "Starting stats monitor for {} every {}ms ({:?} reports)",
            target.stream_id,
            interval.as_millis(),
            normalizer.shape()
        );

        let engine = StatsEngine::new(target.clone(), interval);
        let task = tokio::spawn(run(
            engine,
            peer,
            normalizer,
            sink,
            interval,
            shutdown_rx,
            rebind_rx,
        ));

        Self {
            target,
            shutdown_tx,
            rebind_tx,
            task: Some(task),
        }
    }

    pub fn target(&self) -> &StatsTarget {
        &self.target
    }

    /// Point the monitor at a new peer connection and drop every baseline
    pub fn rebind(&self, peer: Arc<dyn PeerHandle>) {
        if self.rebind_tx.send(peer).is_err() {
            debug!("Stats monitor for {} already stopped", self.target.stream_id);
        }
    }

    /// Stop polling; does not wait for the task
    pub fn stop(&mut self) {
        let _ = self.shutdown_tx.try_send(());
        self.task.take();
    }

    /// Stop polling and wait until the task has released its peer
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.try_send(());
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Stats monitor for {} ended abnormally: {}", self.target.stream_id, e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for StatsMonitor {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.try_send(());
    }
}

async fn run(
    mut engine: StatsEngine,
    mut peer: Arc<dyn PeerHandle>,
    normalizer: Arc<dyn StatsNormalizer>,
    sink: Arc<dyn StatsSink>,
    interval: Duration,
    mut shutdown_rx: mpsc::Receiver<()>,
    mut rebind_rx: mpsc::UnboundedReceiver<Arc<dyn PeerHandle>>,
) {
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            // A dropped handle closes the channel, which also ends the loop
            _ = shutdown_rx.recv() => break,
            Some(next) = rebind_rx.recv() => {
                debug!("Rebinding stats monitor for {}", engine.target().stream_id);
                peer = next;
                engine.reset();
                continue;
            }
            _ = ticker.tick() => {}
        }

        tick(&mut engine, peer.as_ref(), normalizer.as_ref(), sink.as_ref()).await;
    }

    drop(peer);
    debug!("Stats monitor for {} stopped", engine.target().stream_id);
}

async fn tick(
    engine: &mut StatsEngine,
    peer: &dyn PeerHandle,
    normalizer: &dyn StatsNormalizer,
    sink: &dyn StatsSink,
) {
    let report = match peer.get_stats().await {
        Ok(report) => report,
        Err(e) => {
            warn!("Failed to get stats for {}: {}", engine.target().stream_id, e);
            return;
        }
    };

    let samples = match normalizer.normalize(&report) {
        Ok(samples) => samples,
        Err(e) => {
            // Baselines stay untouched for this tick
            warn!("Skipping stats tick for {}: {}", engine.target().stream_id, e);
            return;
        }
    };

    for record in engine.ingest(samples) {
        if let Err(e) = sink.emit(record).await {
            warn!("Failed to emit stats record: {}", e);
        }
    }
}
