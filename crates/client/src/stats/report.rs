//! Raw and canonical stats records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Cumulative-counter report as returned by a native peer connection.
///
/// Each entry is one stats object (`id`, `type`, `timestamp` and
/// shape-specific fields). Legacy callback-style reports are flattened into
/// the same list of objects before they get here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawStatsReport {
    pub entries: Vec<Map<String, Value>>,
}

impl RawStatsReport {
    /// Accept either an array of stats objects or an object keyed by stat id
    pub fn from_json(value: Value) -> crate::Result<Self> {
        let entries = match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(map) => Ok(map),
                    other => Err(crate::Error::StatsNormalization(format!(
                        "stats entry is not an object: {}",
                        other
                    ))),
                })
                .collect::<crate::Result<Vec<_>>>()?,
            Value::Object(by_id) => by_id
                .into_iter()
                .filter_map(|(_, item)| match item {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect(),
            other => {
                return Err(crate::Error::StatsNormalization(format!(
                    "stats report is neither array nor object: {}",
                    other
                )))
            }
        };
        Ok(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// RTP direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// RTP media kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => write!(f, "inbound"),
            Direction::Outbound => write!(f, "outbound"),
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

impl MediaKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "audio" => Some(MediaKind::Audio),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }
}

/// Counter names shared by both report shapes
pub mod counters {
    pub const BYTES_RECEIVED: &str = "bytesReceived";
    pub const PACKETS_RECEIVED: &str = "packetsReceived";
    pub const PACKETS_LOST: &str = "packetsLost";
    pub const FRAMES_DECODED: &str = "framesDecoded";
    pub const NACK_COUNT: &str = "nackCount";
    pub const BYTES_SENT: &str = "bytesSent";
    pub const PACKETS_SENT: &str = "packetsSent";
    pub const FRAMES_ENCODED: &str = "framesEncoded";

    /// Unit label used in composed metrics
    pub fn unit(name: &str) -> &'static str {
        match name {
            BYTES_RECEIVED | BYTES_SENT => "bytes",
            FRAMES_DECODED | FRAMES_ENCODED => "frames",
            _ => "packets",
        }
    }
}

/// One (direction, kind) observation after vendor normalization
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalSample {
    pub direction: Direction,
    pub kind: MediaKind,
    pub ssrc: String,
    /// Cumulative counters keyed by canonical name
    pub counters: BTreeMap<String, u64>,
    /// Jitter gauge in milliseconds (inbound only)
    pub jitter_ms: Option<f64>,
}

/// Per-interval rates for one (direction, kind) of one stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsRecord {
    pub stream_id: String,
    pub connection_id: String,
    pub direction: Direction,
    pub kind: MediaKind,
    pub ssrc: String,
    pub timestamp: DateTime<Utc>,
    pub interval_secs: f64,
    /// Counter name → units per second, never negative
    pub rates: BTreeMap<String, f64>,
    pub jitter_ms: Option<f64>,
}

impl StatsRecord {
    /// `webrtc_<direction>_<kind>_<ssrc>`
    pub fn metric_id(&self) -> String {
        format!("webrtc_{}_{}_{}", self.direction, self.kind, self.ssrc)
    }

    /// Composed-metrics document for HTTP collectors
    pub fn to_composed_metrics(&self, exec: &str, component: &str) -> Value {
        let metric_id = self.metric_id();

        let mut metrics = Map::new();
        let mut units = Map::new();
        for (name, rate) in &self.rates {
            metrics.insert(name.clone(), json!(rate));
            units.insert(name.clone(), json!(counters::unit(name)));
        }
        if let Some(jitter) = self.jitter_ms {
            metrics.insert("jitter".to_string(), json!(jitter));
            units.insert("jitter".to_string(), json!("ms"));
        }

        let mut doc = Map::new();
        doc.insert(
            "@timestamp".to_string(),
            json!(self.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
        );
        doc.insert("exec".to_string(), json!(exec));
        doc.insert("component".to_string(), json!(component));
        doc.insert("stream".to_string(), json!("webRtc"));
        doc.insert("type".to_string(), json!(metric_id));
        doc.insert("stream_type".to_string(), json!("composed_metrics"));
        doc.insert("units".to_string(), Value::Object(units));
        doc.insert(metric_id, Value::Object(metrics));
        Value::Object(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_report_from_keyed_object() {
        let report = RawStatsReport::from_json(json!({
            "a": {"id": "a", "type": "ssrc"},
            "b": {"id": "b", "type": "ssrc"},
        }))
        .unwrap();
        assert_eq!(report.entries.len(), 2);
    }

    #[test]
    fn test_report_rejects_scalars() {
        assert!(RawStatsReport::from_json(json!(42)).is_err());
        assert!(RawStatsReport::from_json(json!([1, 2])).is_err());
    }

    #[test]
    fn test_composed_metrics_document() {
        let record = StatsRecord {
            stream_id: "str_CAM_1".to_string(),
            connection_id: "con_1".to_string(),
            direction: Direction::Inbound,
            kind: MediaKind::Video,
            ssrc: "1234".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            interval_secs: 1.0,
            rates: BTreeMap::from([
                (counters::BYTES_RECEIVED.to_string(), 150.0),
                (counters::FRAMES_DECODED.to_string(), 30.0),
            ]),
            jitter_ms: Some(12.5),
        };

        let doc = record.to_composed_metrics("exec-1", "browser");
        assert_eq!(doc["type"], "webrtc_inbound_video_1234");
        assert_eq!(doc["stream_type"], "composed_metrics");
        assert_eq!(doc["@timestamp"], "2024-05-01T12:00:00.000Z");
        assert_eq!(doc["units"]["bytesReceived"], "bytes");
        assert_eq!(doc["units"]["framesDecoded"], "frames");
        assert_eq!(doc["units"]["jitter"], "ms");
        assert_eq!(doc["webrtc_inbound_video_1234"]["bytesReceived"], 150.0);
    }
}
