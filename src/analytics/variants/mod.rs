//! Historical variant generation
//!
//! A variant is a derived view over a trend's history:
//!
//! - **snapshot**: the observation closest to `now - interval`
//! - **aggregated**: summary statistics over `[now - timeframe, now]`
//! - **projected**: a linear projection of the score some hours ahead
//! - **comparative**: the trend against category peers, or across platforms
//!
//! Generation is a pure function of the series, the peers and `now`, so
//! regenerating with the same inputs yields identical variants.

mod aggregate;
mod comparative;
mod projection;
mod snapshot;

pub use aggregate::{AggregatedPayload, MetricSummary, TrendAnalysis, TrendDirection};
pub use comparative::{
    PeerPerformance, PerformanceComparison, PlatformComparison, PlatformStats, TrendPerformance,
};
pub use projection::{ProjectionFlag, ProjectionPayload, ProjectionWarning};
pub use snapshot::SnapshotPayload;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::Result;
use crate::models::{ScorePoint, TrendSeries};
use crate::utils::{parse_time_interval, round2};

/// Kind of historical variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantType {
    Snapshot,
    Aggregated,
    Projected,
    Comparative,
}

impl VariantType {
    pub const ALL: [VariantType; 4] = [
        Self::Snapshot,
        Self::Aggregated,
        Self::Projected,
        Self::Comparative,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::Aggregated => "aggregated",
            Self::Projected => "projected",
            Self::Comparative => "comparative",
        }
    }
}

impl std::str::FromStr for VariantType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "snapshot" => Ok(Self::Snapshot),
            "aggregated" => Ok(Self::Aggregated),
            "projected" => Ok(Self::Projected),
            "comparative" => Ok(Self::Comparative),
            other => Err(format!("unknown variant type: {other}")),
        }
    }
}

/// Variant body, tagged by what it describes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VariantPayload {
    Snapshot(SnapshotPayload),
    Aggregated(AggregatedPayload),
    Projected(ProjectionPayload),
    Performance(PerformanceComparison),
    Platform(PlatformComparison),
}

/// Provenance and quality information common to all variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantMetadata {
    /// The `now` the variant was generated for
    pub generated_at: DateTime<Utc>,
    /// Number of observations the variant was derived from
    pub source_points: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_quality: Option<f64>,
}

/// A derived view, keyed by `(trend_id, variant_type, variant_name)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub trend_id: String,
    pub variant_type: VariantType,
    pub variant_name: String,
    pub time_range_start: DateTime<Utc>,
    pub time_range_end: DateTime<Utc>,
    pub payload: VariantPayload,
    pub metadata: VariantMetadata,
}

impl Variant {
    /// Upsert key
    #[must_use]
    pub fn key(&self) -> (String, VariantType, String) {
        (
            self.trend_id.clone(),
            self.variant_type,
            self.variant_name.clone(),
        )
    }
}

/// Per-call inputs for variant generation
#[derive(Debug, Clone)]
pub struct VariantOptions {
    /// Reference time for every relative window
    pub now: DateTime<Utc>,
    /// Candidate peer series for the performance comparison
    pub peers: Vec<TrendSeries>,
    /// Which variant types to produce
    pub include: BTreeSet<VariantType>,
}

impl VariantOptions {
    /// All variant types at `now`, without peers
    #[must_use]
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now,
            peers: Vec::new(),
            include: VariantType::ALL.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn with_peers(mut self, peers: Vec<TrendSeries>) -> Self {
        self.peers = peers;
        self
    }

    /// Restrict generation to the given types
    #[must_use]
    pub fn only(mut self, types: impl IntoIterator<Item = VariantType>) -> Self {
        self.include = types.into_iter().collect();
        self
    }
}

/// Variant generation settings, intervals written as `1h`, `7d`, ...
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariantConfig {
    pub snapshot_intervals: Vec<String>,
    pub aggregate_timeframes: Vec<String>,
    pub projection_horizons: Vec<String>,
    /// How far back peers are compared
    pub peer_window: String,
    /// Maximum peers in a performance comparison
    pub max_peers: usize,
}

impl Default for VariantConfig {
    fn default() -> Self {
        Self {
            snapshot_intervals: ["1h", "6h", "24h", "7d"].map(String::from).to_vec(),
            aggregate_timeframes: ["1h", "6h", "24h", "7d", "30d"].map(String::from).to_vec(),
            projection_horizons: ["6h", "24h", "7d"].map(String::from).to_vec(),
            peer_window: "30d".to_string(),
            max_peers: 10,
        }
    }
}

/// A labelled interval such as `("24h", 24 hours)`
pub(crate) type Interval = (String, Duration);

fn parse_intervals(labels: &[String]) -> Result<Vec<Interval>> {
    labels
        .iter()
        .map(|label| Ok((label.clone(), parse_time_interval(label)?)))
        .collect()
}

/// Produces historical variants for a trend series
#[derive(Debug, Clone)]
pub struct VariantGenerator {
    snapshot_intervals: Vec<Interval>,
    aggregate_timeframes: Vec<Interval>,
    projection_horizons: Vec<Interval>,
    peer_window: Duration,
    max_peers: usize,
}

impl Default for VariantGenerator {
    fn default() -> Self {
        let labelled = |items: &[(&str, Duration)]| -> Vec<Interval> {
            items.iter().map(|(l, d)| ((*l).to_string(), *d)).collect()
        };
        Self {
            snapshot_intervals: labelled(&[
                ("1h", Duration::hours(1)),
                ("6h", Duration::hours(6)),
                ("24h", Duration::hours(24)),
                ("7d", Duration::days(7)),
            ]),
            aggregate_timeframes: labelled(&[
                ("1h", Duration::hours(1)),
                ("6h", Duration::hours(6)),
                ("24h", Duration::hours(24)),
                ("7d", Duration::days(7)),
                ("30d", Duration::days(30)),
            ]),
            projection_horizons: labelled(&[
                ("6h", Duration::hours(6)),
                ("24h", Duration::hours(24)),
                ("7d", Duration::days(7)),
            ]),
            peer_window: Duration::days(30),
            max_peers: 10,
        }
    }
}

impl VariantGenerator {
    /// Build a generator from configuration
    pub fn new(config: &VariantConfig) -> Result<Self> {
        Ok(Self {
            snapshot_intervals: parse_intervals(&config.snapshot_intervals)?,
            aggregate_timeframes: parse_intervals(&config.aggregate_timeframes)?,
            projection_horizons: parse_intervals(&config.projection_horizons)?,
            peer_window: parse_time_interval(&config.peer_window)?,
            max_peers: config.max_peers,
        })
    }

    /// How far back peers are compared
    #[must_use]
    pub fn peer_window(&self) -> Duration {
        self.peer_window
    }

    #[must_use]
    pub fn max_peers(&self) -> usize {
        self.max_peers
    }

    /// Generate every requested variant for `series`
    ///
    /// Empty series produce nothing. Variant types whose preconditions are
    /// not met (no points in a window, a single platform, no peers) are
    /// skipped individually.
    #[must_use]
    pub fn generate(&self, series: &TrendSeries, options: &VariantOptions) -> Vec<Variant> {
        if series.is_empty() {
            return Vec::new();
        }

        let mut variants = Vec::new();
        let wants = |t: VariantType| options.include.contains(&t);

        if wants(VariantType::Snapshot) {
            variants.extend(snapshot::build(series, &self.snapshot_intervals, options.now));
        }
        if wants(VariantType::Aggregated) {
            variants.extend(aggregate::build(
                series,
                &self.aggregate_timeframes,
                options.now,
            ));
        }
        if wants(VariantType::Projected) {
            variants.extend(projection::build(
                series,
                &self.projection_horizons,
                options.now,
            ));
        }
        if wants(VariantType::Comparative) {
            variants.extend(comparative::build_performance(
                series,
                &options.peers,
                options.now,
                self.peer_window,
                self.max_peers,
            ));
            variants.extend(comparative::build_platform(series, options.now));
        }

        variants
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Quality of a single observation relative to `now` (0..=1)
pub(crate) fn point_quality(point: &ScorePoint, now: DateTime<Utc>) -> f64 {
    let mut quality = 1.0;
    if point.raw_metrics.is_empty() {
        quality *= 0.7;
    }
    if point.components.is_none() {
        quality *= 0.8;
    }
    if point.wave_score == 0.0 {
        quality *= 0.9;
    }
    if now - point.timestamp > Duration::hours(24) {
        quality *= 0.9;
    }
    round2(quality)
}

/// Confidence in an aggregate over `points`: more points, better quality
/// and (for sub-week spans) longer coverage all raise it
pub(crate) fn aggregation_confidence(points: &[&ScorePoint], now: DateTime<Utc>) -> f64 {
    if points.is_empty() {
        return 0.0;
    }

    let mut confidence = (points.len() as f64 / 10.0).min(1.0);
    let qualities: Vec<f64> = points.iter().map(|p| point_quality(p, now)).collect();
    confidence *= crate::analytics::baseline::mean(&qualities);

    let span = span_hours(points);
    if span > 0.0 && span < 168.0 {
        confidence *= (span / 24.0).min(1.0);
    }
    round2(confidence)
}

/// Hours between the first and last of chronologically ordered points
pub(crate) fn span_hours(points: &[&ScorePoint]) -> f64 {
    match (points.first(), points.last()) {
        (Some(first), Some(last)) => {
            (last.timestamp - first.timestamp).num_milliseconds() as f64 / 3_600_000.0
        }
        _ => 0.0,
    }
}
