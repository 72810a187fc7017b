//! Vendor report normalization
//!
//! Two report shapes exist in the wild. The shape is chosen once per client
//! from the platform identifier; the hot path never re-inspects the platform.

use super::report::{counters, CanonicalSample, Direction, MediaKind, RawStatsReport};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Known report shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportShape {
    /// `inbound-rtp` / `outbound-rtp` entries, jitter in seconds
    Standard,
    /// `ssrc` entries with `goog*` fields, values often stringly typed
    Legacy,
}

impl ReportShape {
    /// Pick the shape a platform produces
    pub fn probe(platform_name: &str) -> Self {
        if platform_name.contains("Chrome") || platform_name.contains("Opera") {
            ReportShape::Legacy
        } else {
            ReportShape::Standard
        }
    }

    pub fn normalizer(self) -> Arc<dyn StatsNormalizer> {
        match self {
            ReportShape::Standard => Arc::new(StandardNormalizer),
            ReportShape::Legacy => Arc::new(LegacyNormalizer),
        }
    }
}

/// Converts a vendor report into canonical samples.
///
/// Either every RTP entry is understood or the whole report is rejected;
/// a partial result is never returned.
pub trait StatsNormalizer: Send + Sync {
    fn shape(&self) -> ReportShape;
    fn normalize(&self, report: &RawStatsReport) -> Result<Vec<CanonicalSample>>;
}

/// Read a counter that may be a JSON number or a numeric string
fn number(entry: &Map<String, Value>, key: &str) -> Option<f64> {
    match entry.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn counter(entry: &Map<String, Value>, key: &str) -> Option<u64> {
    number(entry, key).map(|v| if v <= 0.0 { 0 } else { v.round() as u64 })
}

fn required(entry: &Map<String, Value>, key: &str, canonical: &str, into: &mut BTreeMap<String, u64>) -> Result<()> {
    let value = counter(entry, key).ok_or_else(|| {
        Error::StatsNormalization(format!(
            "entry {} lacks counter {}",
            entry.get("id").and_then(Value::as_str).unwrap_or("?"),
            key
        ))
    })?;
    into.insert(canonical.to_string(), value);
    Ok(())
}

fn optional(entry: &Map<String, Value>, key: &str, canonical: &str, into: &mut BTreeMap<String, u64>) {
    if let Some(value) = counter(entry, key) {
        into.insert(canonical.to_string(), value);
    }
}

fn media_kind(entry: &Map<String, Value>) -> Result<MediaKind> {
    entry
        .get("mediaType")
        .or_else(|| entry.get("kind"))
        .and_then(Value::as_str)
        .and_then(MediaKind::parse)
        .ok_or_else(|| Error::StatsNormalization("RTP entry without media kind".to_string()))
}

fn ssrc(entry: &Map<String, Value>) -> String {
    match entry.get("ssrc") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "0".to_string(),
    }
}

fn entry_type(entry: &Map<String, Value>) -> Result<&str> {
    entry
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::StatsNormalization("stats entry without type".to_string()))
}

fn push_unique(samples: &mut Vec<CanonicalSample>, sample: CanonicalSample) {
    if samples
        .iter()
        .any(|s| s.direction == sample.direction && s.kind == sample.kind)
    {
        debug!(
            "Ignoring additional {} {} entry (ssrc {})",
            sample.direction, sample.kind, sample.ssrc
        );
        return;
    }
    samples.push(sample);
}

fn finish(shape: ReportShape, report: &RawStatsReport, samples: Vec<CanonicalSample>) -> Result<Vec<CanonicalSample>> {
    if samples.is_empty() && !report.is_empty() {
        return Err(Error::StatsNormalization(format!(
            "no entry of the {:?} shape among {} entries",
            shape,
            report.entries.len()
        )));
    }
    Ok(samples)
}

/// Standards-track `getStats()` shape
#[derive(Debug, Default)]
pub struct StandardNormalizer;

impl StatsNormalizer for StandardNormalizer {
    fn shape(&self) -> ReportShape {
        ReportShape::Standard
    }

    fn normalize(&self, report: &RawStatsReport) -> Result<Vec<CanonicalSample>> {
        let mut samples = Vec::new();

        for entry in &report.entries {
            let direction = match entry_type(entry)? {
                "inbound-rtp" => Direction::Inbound,
                "outbound-rtp" => Direction::Outbound,
                _ => continue,
            };
            if entry.get("isRemote").and_then(Value::as_bool) == Some(true) {
                continue;
            }

            let kind = media_kind(entry)?;
            let mut values = BTreeMap::new();
            let mut jitter_ms = None;

            match direction {
                Direction::Inbound => {
                    required(entry, "bytesReceived", counters::BYTES_RECEIVED, &mut values)?;
                    required(entry, "packetsReceived", counters::PACKETS_RECEIVED, &mut values)?;
                    optional(entry, "packetsLost", counters::PACKETS_LOST, &mut values);
                    if kind == MediaKind::Video {
                        optional(entry, "framesDecoded", counters::FRAMES_DECODED, &mut values);
                        optional(entry, "nackCount", counters::NACK_COUNT, &mut values);
                    }
                    jitter_ms = number(entry, "jitter").map(|s| s * 1000.0);
                }
                Direction::Outbound => {
                    required(entry, "bytesSent", counters::BYTES_SENT, &mut values)?;
                    required(entry, "packetsSent", counters::PACKETS_SENT, &mut values)?;
                    if kind == MediaKind::Video {
                        optional(entry, "framesEncoded", counters::FRAMES_ENCODED, &mut values);
                    }
                }
            }

            push_unique(
                &mut samples,
                CanonicalSample {
                    direction,
                    kind,
                    ssrc: ssrc(entry),
                    counters: values,
                    jitter_ms,
                },
            );
        }

        finish(self.shape(), report, samples)
    }
}

/// Callback-style `ssrc` report shape
#[derive(Debug, Default)]
pub struct LegacyNormalizer;

impl StatsNormalizer for LegacyNormalizer {
    fn shape(&self) -> ReportShape {
        ReportShape::Legacy
    }

    fn normalize(&self, report: &RawStatsReport) -> Result<Vec<CanonicalSample>> {
        let mut samples = Vec::new();

        for entry in &report.entries {
            if entry_type(entry)? != "ssrc" {
                continue;
            }

            let kind = media_kind(entry)?;
            let inbound = entry.contains_key("bytesReceived")
                && match kind {
                    MediaKind::Audio => entry.contains_key("audioOutputLevel"),
                    MediaKind::Video => entry.contains_key("qpSum"),
                };

            let mut values = BTreeMap::new();
            let mut jitter_ms = None;

            let direction = if inbound {
                required(entry, "bytesReceived", counters::BYTES_RECEIVED, &mut values)?;
                required(entry, "packetsReceived", counters::PACKETS_RECEIVED, &mut values)?;
                optional(entry, "packetsLost", counters::PACKETS_LOST, &mut values);
                if kind == MediaKind::Video {
                    optional(entry, "framesDecoded", counters::FRAMES_DECODED, &mut values);
                    optional(entry, "googNacksSent", counters::NACK_COUNT, &mut values);
                }
                jitter_ms = number(entry, "googJitterBufferMs");
                Direction::Inbound
            } else if entry.contains_key("bytesSent") {
                required(entry, "bytesSent", counters::BYTES_SENT, &mut values)?;
                required(entry, "packetsSent", counters::PACKETS_SENT, &mut values)?;
                if kind == MediaKind::Video {
                    optional(entry, "framesEncoded", counters::FRAMES_ENCODED, &mut values);
                }
                Direction::Outbound
            } else {
                continue;
            };

            push_unique(
                &mut samples,
                CanonicalSample {
                    direction,
                    kind,
                    ssrc: ssrc(entry),
                    counters: values,
                    jitter_ms,
                },
            );
        }

        finish(self.shape(), report, samples)
    }
}
