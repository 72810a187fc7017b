//! WebRTC statistics
//!
//! Converts cumulative peer-connection counters into per-interval rates:
//! - [`normalize`]: vendor report shapes to canonical samples
//! - [`engine`]: baseline bookkeeping and differencing
//! - [`monitor`]: the per-stream polling task
//! - [`sink`]: where records go (session events or an HTTP collector)

pub mod engine;
pub mod monitor;
pub mod normalize;
pub mod report;
pub mod sink;

pub use engine::{StatsEngine, StatsTarget};
pub use monitor::StatsMonitor;
pub use normalize::{LegacyNormalizer, ReportShape, StandardNormalizer, StatsNormalizer};
pub use report::{counters, CanonicalSample, Direction, MediaKind, RawStatsReport, StatsRecord};
pub use sink::{ChannelStatsSink, HttpStatsSink, StatsSink};
