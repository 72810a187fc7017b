//! Counter differencing
//!
//! Holds the previous cumulative sample per (direction, kind) and turns the
//! next one into per-second rates. The first sample after creation, after a
//! counter reset or after an SSRC change only establishes a baseline.

use super::report::{counters, CanonicalSample, Direction, MediaKind, StatsRecord};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct Baseline {
    ssrc: String,
    counters: BTreeMap<String, u64>,
}

/// Identifies the stream records are attributed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsTarget {
    pub stream_id: String,
    pub connection_id: String,
}

/// Pure differencing state for one stream
#[derive(Debug)]
pub struct StatsEngine {
    target: StatsTarget,
    interval: Duration,
    baselines: HashMap<(Direction, MediaKind), Baseline>,
}

impl StatsEngine {
    pub fn new(target: StatsTarget, interval: Duration) -> Self {
        Self {
            target,
            interval,
            baselines: HashMap::new(),
        }
    }

    pub fn target(&self) -> &StatsTarget {
        &self.target
    }

    /// Forget every baseline; the next sample per key is absorbed silently
    pub fn reset(&mut self) {
        self.baselines.clear();
    }

    pub fn has_baseline(&self, direction: Direction, kind: MediaKind) -> bool {
        self.baselines.contains_key(&(direction, kind))
    }

    /// Difference `samples` against the stored baselines.
    ///
    /// Rates are computed over the configured interval, not the measured
    /// wall-clock gap between polls.
    pub fn ingest(&mut self, samples: Vec<CanonicalSample>) -> Vec<StatsRecord> {
        let interval_secs = self.interval.as_secs_f64();
        let timestamp = Utc::now();
        let mut records = Vec::new();

        for sample in samples {
            let key = (sample.direction, sample.kind);

            let Some(previous) = self.baselines.get(&key) else {
                debug!(
                    "Baseline for {} {} of {}",
                    sample.direction, sample.kind, self.target.stream_id
                );
                self.rebind(key, sample);
                continue;
            };

            if previous.ssrc != sample.ssrc {
                debug!(
                    "SSRC changed for {} {} of {} ({} -> {}), rebinding",
                    sample.direction, sample.kind, self.target.stream_id, previous.ssrc, sample.ssrc
                );
                self.rebind(key, sample);
                continue;
            }

            // Lost-packet counts shrink when late or duplicate packets arrive
            let went_backwards = sample
                .counters
                .iter()
                .filter(|(name, _)| name.as_str() != counters::PACKETS_LOST)
                .any(|(name, value)| {
                    previous
                        .counters
                        .get(name)
                        .is_some_and(|before| value < before)
                });
            if went_backwards {
                warn!(
                    "Counters of {} {} for {} went backwards, rebinding baseline",
                    sample.direction, sample.kind, self.target.stream_id
                );
                self.rebind(key, sample);
                continue;
            }

            let rates = sample
                .counters
                .iter()
                .filter_map(|(name, value)| {
                    previous.counters.get(name).map(|before| {
                        let rate = if interval_secs > 0.0 {
                            value.saturating_sub(*before) as f64 / interval_secs
                        } else {
                            0.0
                        };
                        (name.clone(), rate)
                    })
                })
                .collect();

            records.push(StatsRecord {
                stream_id: self.target.stream_id.clone(),
                connection_id: self.target.connection_id.clone(),
                direction: sample.direction,
                kind: sample.kind,
                ssrc: sample.ssrc.clone(),
                timestamp,
                interval_secs,
                rates,
                jitter_ms: sample.jitter_ms,
            });

            self.rebind(key, sample);
        }

        records
    }

    fn rebind(&mut self, key: (Direction, MediaKind), sample: CanonicalSample) {
        self.baselines.insert(
            key,
            Baseline {
                ssrc: sample.ssrc,
                counters: sample.counters,
            },
        );
    }
}
