// Core data structures for wavescope: raw observations, score points and trend series

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Accept a metric count as a number, a numeric string, or null.
///
/// Anything that cannot be read as a non-negative count becomes 0.
fn deserialize_lenient_count<'de, D>(d: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<serde_json::Value> = Option::deserialize(d)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f > 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Some(serde_json::Value::String(s)) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite() && *f > 0.0)
                        .map(|f| f as u64)
                })
                .unwrap_or(0)
        }
        _ => 0,
    })
}

/// Content platform an observation was collected from
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Platform {
    Youtube,
    Tiktok,
    Reddit,
    Other(String),
}

impl Platform {
    /// Get string representation
    pub fn as_str(&self) -> &str {
        match self {
            Self::Youtube => "youtube",
            Self::Tiktok => "tiktok",
            Self::Reddit => "reddit",
            Self::Other(name) => name.as_str(),
        }
    }

    /// Confidence multiplier reflecting how complete the platform's API data is
    pub fn data_quality_factor(&self) -> f64 {
        match self {
            Self::Youtube => 1.0,
            Self::Reddit => 0.9,
            Self::Tiktok => 0.8,
            Self::Other(_) => 1.0,
        }
    }
}

impl From<&str> for Platform {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "youtube" => Self::Youtube,
            "tiktok" => Self::Tiktok,
            "reddit" => Self::Reddit,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for Platform {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<Platform> for String {
    fn from(p: Platform) -> Self {
        p.as_str().to_string()
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::Other("unknown".to_string())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw engagement counters for one observation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMetrics {
    #[serde(default, deserialize_with = "deserialize_lenient_count")]
    pub views: u64,
    #[serde(default, deserialize_with = "deserialize_lenient_count")]
    pub likes: u64,
    #[serde(default, deserialize_with = "deserialize_lenient_count")]
    pub comments: u64,
    #[serde(default, deserialize_with = "deserialize_lenient_count")]
    pub shares: u64,
}

impl RawMetrics {
    /// Create metrics from counters
    #[must_use]
    pub fn new(views: u64, likes: u64, comments: u64, shares: u64) -> Self {
        Self {
            views,
            likes,
            comments,
            shares,
        }
    }

    /// True when every counter is zero (nothing was collected)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.views == 0 && self.likes == 0 && self.comments == 0 && self.shares == 0
    }
}

/// One raw observation supplied by the ingestion collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawObservation {
    pub content_id: String,

    /// Explicit trend identifier; derived from platform and content when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend_id: Option<String>,

    #[serde(default)]
    pub platform_source: Platform,

    #[serde(default)]
    pub category: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,

    /// When the counters were read
    pub observed_at: DateTime<Utc>,

    #[serde(default)]
    pub metrics: RawMetrics,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hashtags: Vec<String>,
}

impl RawObservation {
    /// Trend identifier: explicit if given, else `{platform}_{content_id}`
    pub fn trend_id(&self) -> String {
        self.trend_id
            .clone()
            .unwrap_or_else(|| format!("{}_{}", self.platform_source, self.content_id))
    }

    /// Content age in hours at `now`; 0 when the publish time is unknown
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        match self.published_at {
            Some(published) => (now - published).num_milliseconds() as f64 / 3_600_000.0,
            None => 0.0,
        }
    }
}

/// Sub-scores that make up a WaveScore, each in [0, 100]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponents {
    pub views: f64,
    pub engagement: f64,
    pub growth: f64,
    pub sentiment: f64,
    pub recency: f64,
}

/// A scored observation of one trend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorePoint {
    pub timestamp: DateTime<Utc>,
    pub trend_id: String,
    #[serde(default)]
    pub content_id: String,
    pub wave_score: f64,
    pub confidence: f64,
    #[serde(default)]
    pub platform_source: Platform,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub raw_metrics: RawMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<ScoreComponents>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hashtags: Vec<String>,
}

impl ScorePoint {
    /// Create a bare score point; metrics and labels default to empty
    #[must_use]
    pub fn new(trend_id: impl Into<String>, timestamp: DateTime<Utc>, wave_score: f64) -> Self {
        Self {
            timestamp,
            trend_id: trend_id.into(),
            content_id: String::new(),
            wave_score: wave_score.clamp(0.0, 100.0),
            confidence: 1.0,
            platform_source: Platform::default(),
            category: String::new(),
            raw_metrics: RawMetrics::default(),
            components: None,
            published_at: None,
            hashtags: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_platform(mut self, platform: impl Into<Platform>) -> Self {
        self.platform_source = platform.into();
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: RawMetrics) -> Self {
        self.raw_metrics = metrics;
        self
    }

    #[must_use]
    pub fn with_components(mut self, components: ScoreComponents) -> Self {
        self.components = Some(components);
        self
    }

    #[must_use]
    pub fn with_published_at(mut self, published_at: DateTime<Utc>) -> Self {
        self.published_at = Some(published_at);
        self
    }

    #[must_use]
    pub fn with_hashtags<I, S>(mut self, hashtags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hashtags = hashtags.into_iter().map(Into::into).collect();
        self
    }

    /// Content age in hours at this point's timestamp, when the publish time is known
    pub fn age_hours(&self) -> Option<f64> {
        self.published_at
            .map(|published| (self.timestamp - published).num_milliseconds() as f64 / 3_600_000.0)
    }

    /// Reach estimate (view count)
    pub fn reach(&self) -> f64 {
        self.raw_metrics.views as f64
    }

    /// Engagement sub-score, 0 when the point carries no components
    pub fn engagement(&self) -> f64 {
        self.components.map(|c| c.engagement).unwrap_or(0.0)
    }
}

/// Inclusive time range used for store queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    #[must_use]
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The `length` ending at `now`, clamped to the earliest representable instant
    #[must_use]
    pub fn trailing(now: DateTime<Utc>, length: Duration) -> Self {
        Self {
            start: now
                .checked_sub_signed(length)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            end: now,
        }
    }

    #[must_use]
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }
}

/// Ordered, timestamp-deduplicated score history for one trend
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrendSeries {
    pub trend_id: String,
    points: BTreeMap<DateTime<Utc>, ScorePoint>,
}

impl TrendSeries {
    /// Create an empty series
    #[must_use]
    pub fn new(trend_id: impl Into<String>) -> Self {
        Self {
            trend_id: trend_id.into(),
            points: BTreeMap::new(),
        }
    }

    /// Build a series from points, keeping only those that belong to `trend_id`
    pub fn from_points<I>(trend_id: impl Into<String>, points: I) -> Self
    where
        I: IntoIterator<Item = ScorePoint>,
    {
        let mut series = Self::new(trend_id);
        for point in points {
            series.upsert(point);
        }
        series
    }

    /// Group a mixed batch of points into one series per trend
    pub fn group_by_trend<I>(points: I) -> BTreeMap<String, TrendSeries>
    where
        I: IntoIterator<Item = ScorePoint>,
    {
        let mut groups: BTreeMap<String, TrendSeries> = BTreeMap::new();
        for point in points {
            groups
                .entry(point.trend_id.clone())
                .or_insert_with(|| TrendSeries::new(point.trend_id.clone()))
                .upsert(point);
        }
        groups
    }

    /// Insert a point, replacing any point at the same timestamp.
    ///
    /// Returns false (and drops the point) when it belongs to another trend.
    pub fn upsert(&mut self, point: ScorePoint) -> bool {
        if point.trend_id != self.trend_id {
            tracing::debug!(
                series = %self.trend_id,
                point_trend = %point.trend_id,
                "Ignoring point from another trend"
            );
            return false;
        }
        self.points.insert(point.timestamp, point);
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points in chronological order
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &ScorePoint> + ExactSizeIterator {
        self.points.values()
    }

    /// Points in chronological order, collected
    #[must_use]
    pub fn points(&self) -> Vec<&ScorePoint> {
        self.points.values().collect()
    }

    /// WaveScore values in chronological order
    #[must_use]
    pub fn scores(&self) -> Vec<f64> {
        self.points.values().map(|p| p.wave_score).collect()
    }

    #[must_use]
    pub fn first(&self) -> Option<&ScorePoint> {
        self.points.values().next()
    }

    #[must_use]
    pub fn last(&self) -> Option<&ScorePoint> {
        self.points.values().next_back()
    }

    /// Sub-series restricted to `[start, end]`
    #[must_use]
    pub fn range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> TrendSeries {
        if start > end {
            return TrendSeries::new(self.trend_id.clone());
        }
        TrendSeries {
            trend_id: self.trend_id.clone(),
            points: self
                .points
                .range(start..=end)
                .map(|(ts, p)| (*ts, p.clone()))
                .collect(),
        }
    }

    /// Hours between the first and last point
    #[must_use]
    pub fn time_span_hours(&self) -> f64 {
        match (self.first(), self.last()) {
            (Some(first), Some(last)) => {
                (last.timestamp - first.timestamp).num_milliseconds() as f64 / 3_600_000.0
            }
            _ => 0.0,
        }
    }

    /// Category of the trend (taken from its earliest point)
    #[must_use]
    pub fn category(&self) -> Option<&str> {
        self.first()
            .map(|p| p.category.as_str())
            .filter(|c| !c.is_empty())
    }

    /// Distinct platforms the series was observed on
    #[must_use]
    pub fn platforms(&self) -> BTreeSet<&Platform> {
        self.points.values().map(|p| &p.platform_source).collect()
    }
}
