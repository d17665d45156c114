//! Cross-trend normalization and temporal binning
//!
//! Points are grouped by platform and category. Within a group, engagement,
//! reach and growth are standardized against the group's own statistics,
//! blended, and squashed onto 0..=100 with a logistic curve. Normalized
//! points are then bucketed into fixed-width time bins per group.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::baseline::{max_value, mean, min_value, population_std_dev};
use crate::models::{Platform, ScorePoint, TrendSeries};
use crate::utils::round2;

const ENGAGEMENT_WEIGHT: f64 = 0.4;
const REACH_WEIGHT: f64 = 0.35;
const GROWTH_WEIGHT: f64 = 0.25;

/// Lookback used when normalizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollingWindow {
    /// 24 hours
    Short,
    /// 48 hours
    #[default]
    Medium,
    /// 7 days
    Long,
}

impl RollingWindow {
    #[must_use]
    pub fn duration(&self) -> Duration {
        match self {
            Self::Short => Duration::hours(24),
            Self::Medium => Duration::hours(48),
            Self::Long => Duration::days(7),
        }
    }
}

/// Width of a temporal bin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinSize {
    Minute,
    #[default]
    Hourly,
    Daily,
}

impl BinSize {
    #[must_use]
    pub fn duration(&self) -> Duration {
        match self {
            Self::Minute => Duration::minutes(1),
            Self::Hourly => Duration::hours(1),
            Self::Daily => Duration::days(1),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hourly => "hourly",
            Self::Daily => "daily",
        }
    }

    /// Start of the bin containing `ts`
    #[must_use]
    pub fn floor(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let width = self.duration().num_milliseconds();
        let start = ts.timestamp_millis().div_euclid(width) * width;
        DateTime::<Utc>::from_timestamp_millis(start).unwrap_or(ts)
    }
}

impl std::str::FromStr for BinSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "minute" => Ok(Self::Minute),
            "hourly" | "hour" => Ok(Self::Hourly),
            "daily" | "day" => Ok(Self::Daily),
            other => Err(format!("unknown bin size: {other}")),
        }
    }
}

/// Normalization settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    pub window: RollingWindow,
    pub bin_size: BinSize,
}

/// Per-platform weighting of engagement and reach
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlatformFactor {
    pub engagement_weight: f64,
    pub reach_multiplier: f64,
    /// Views at which content on this platform counts as viral
    pub viral_threshold: f64,
}

impl PlatformFactor {
    /// Factors for `platform`; unknown platforms are weighted like YouTube
    #[must_use]
    pub fn for_platform(platform: &Platform) -> Self {
        match platform {
            Platform::Reddit => Self {
                engagement_weight: 0.8,
                reach_multiplier: 10.0,
                viral_threshold: 10_000.0,
            },
            Platform::Tiktok => Self {
                engagement_weight: 1.5,
                reach_multiplier: 0.5,
                viral_threshold: 5_000_000.0,
            },
            Platform::Youtube | Platform::Other(_) => Self {
                engagement_weight: 1.2,
                reach_multiplier: 1.0,
                viral_threshold: 1_000_000.0,
            },
        }
    }
}

/// Location and spread of one metric within a group
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SummaryStatistics {
    pub mean: f64,
    /// Never zero, so it can always divide
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
}

impl SummaryStatistics {
    #[must_use]
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self {
                mean: 0.0,
                std_dev: 1.0,
                min: 0.0,
                max: 0.0,
                median: 0.0,
            };
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        };
        let std_dev = population_std_dev(values);

        Self {
            mean: mean(values),
            std_dev: if std_dev > 0.0 { std_dev } else { 1.0 },
            min: min_value(values).unwrap_or_default(),
            max: max_value(values).unwrap_or_default(),
            median,
        }
    }

    #[must_use]
    pub fn z_score(&self, value: f64) -> f64 {
        (value - self.mean) / self.std_dev
    }

    /// Position of `value` between the group's min and max, 0..=100
    ///
    /// 50 when every value in the group is the same.
    #[must_use]
    pub fn range_percentile(&self, value: f64) -> f64 {
        if self.max == self.min {
            return 50.0;
        }
        ((value - self.min) / (self.max - self.min) * 100.0)
            .clamp(0.0, 100.0)
            .round()
    }
}

/// Statistics of one platform and category group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStatistics {
    pub platform_source: Platform,
    pub category: String,
    pub engagement: SummaryStatistics,
    pub reach: SummaryStatistics,
    pub growth: SummaryStatistics,
    pub count: usize,
}

/// A score point placed on its group's scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub trend_id: String,
    pub timestamp: DateTime<Utc>,
    pub platform_source: Platform,
    pub category: String,
    /// Logistic of `z_score`, 0..=100
    pub normalized_score: f64,
    /// Weighted blend of the metric z-scores
    pub z_score: f64,
    /// Engagement's place in the group's range, 0..=100
    pub percentile_rank: f64,
    pub weighted_engagement: f64,
    pub weighted_reach: f64,
    pub growth: f64,
    pub reach: f64,
    pub group_size: usize,
}

/// Aggregates of the normalized points of one group in one time bin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalBin {
    pub bin_start: DateTime<Utc>,
    pub platform_source: Platform,
    pub category: String,
    pub bin_size: BinSize,
    pub point_count: usize,
    pub avg_normalized_score: f64,
    pub max_normalized_score: f64,
    pub total_reach: f64,
    pub avg_engagement: f64,
    /// Change in normalized score per hour across the bin
    pub trend_momentum: f64,
    /// Standard deviation of the normalized scores
    pub volatility: f64,
}

impl TemporalBin {
    /// Upsert key: `(bin_start, bin_size, platform, category)`
    #[must_use]
    pub fn key(&self) -> (DateTime<Utc>, String, String, String) {
        (
            self.bin_start,
            self.bin_size.as_str().to_string(),
            self.platform_source.as_str().to_string(),
            self.category.clone(),
        )
    }
}

type GroupKey = (Platform, String);

fn group_key(point: &ScorePoint) -> GroupKey {
    (point.platform_source.clone(), point.category.clone())
}

fn growth_of(point: &ScorePoint) -> f64 {
    point.components.map_or(0.0, |c| c.growth)
}

/// Logistic squash of a z-score onto whole points 0..=100
#[must_use]
pub fn sigmoid_score(z: f64) -> f64 {
    (100.0 / (1.0 + (-z).exp())).round()
}

/// Statistics per platform and category
#[must_use]
pub fn group_statistics(points: &[&ScorePoint]) -> BTreeMap<GroupKey, GroupStatistics> {
    let mut groups: BTreeMap<GroupKey, Vec<&ScorePoint>> = BTreeMap::new();
    for point in points.iter().copied() {
        groups.entry(group_key(point)).or_default().push(point);
    }

    groups
        .into_iter()
        .map(|(key, members)| {
            let engagement: Vec<f64> = members.iter().map(|p| p.engagement()).collect();
            let reach: Vec<f64> = members.iter().map(|p| p.reach()).collect();
            let growth: Vec<f64> = members.iter().map(|p| growth_of(p)).collect();
            let stats = GroupStatistics {
                platform_source: key.0.clone(),
                category: key.1.clone(),
                engagement: SummaryStatistics::from_values(&engagement),
                reach: SummaryStatistics::from_values(&reach),
                growth: SummaryStatistics::from_values(&growth),
                count: members.len(),
            };
            (key, stats)
        })
        .collect()
}

/// Normalize every point against its group, keeping input order
#[must_use]
pub fn normalize_points(points: &[&ScorePoint]) -> Vec<NormalizedPoint> {
    let stats = group_statistics(points);

    points
        .iter()
        .filter_map(|point| {
            let group = stats.get(&group_key(point))?;
            let factor = PlatformFactor::for_platform(&point.platform_source);
            let (engagement, reach, growth) = (point.engagement(), point.reach(), growth_of(point));

            let z = ENGAGEMENT_WEIGHT * group.engagement.z_score(engagement)
                + REACH_WEIGHT * group.reach.z_score(reach)
                + GROWTH_WEIGHT * group.growth.z_score(growth);

            Some(NormalizedPoint {
                trend_id: point.trend_id.clone(),
                timestamp: point.timestamp,
                platform_source: point.platform_source.clone(),
                category: point.category.clone(),
                normalized_score: sigmoid_score(z),
                z_score: z,
                percentile_rank: group.engagement.range_percentile(engagement),
                weighted_engagement: engagement * factor.engagement_weight,
                weighted_reach: reach * factor.reach_multiplier,
                growth,
                reach,
                group_size: group.count,
            })
        })
        .collect()
}

/// Bucket normalized points per group into bins of `size`, oldest bin first
#[must_use]
pub fn bin_points(points: &[NormalizedPoint], size: BinSize) -> Vec<TemporalBin> {
    let mut bins: BTreeMap<(DateTime<Utc>, Platform, String), Vec<&NormalizedPoint>> =
        BTreeMap::new();
    for point in points {
        bins.entry((
            size.floor(point.timestamp),
            point.platform_source.clone(),
            point.category.clone(),
        ))
        .or_default()
        .push(point);
    }

    bins.into_iter()
        .map(|((bin_start, platform_source, category), mut members)| {
            members.sort_by_key(|p| p.timestamp);
            let scores: Vec<f64> = members.iter().map(|p| p.normalized_score).collect();
            let engagement: Vec<f64> = members.iter().map(|p| p.weighted_engagement).collect();

            TemporalBin {
                bin_start,
                platform_source,
                category,
                bin_size: size,
                point_count: members.len(),
                avg_normalized_score: mean(&scores),
                max_normalized_score: max_value(&scores).unwrap_or_default(),
                total_reach: members.iter().map(|p| p.reach).sum(),
                avg_engagement: mean(&engagement),
                trend_momentum: momentum(&members),
                volatility: if scores.len() < 2 {
                    0.0
                } else {
                    population_std_dev(&scores)
                },
            }
        })
        .collect()
}

/// Normalized-score change per hour between the first and last point
fn momentum(sorted: &[&NormalizedPoint]) -> f64 {
    let (Some(first), Some(last)) = (sorted.first(), sorted.last()) else {
        return 0.0;
    };
    let span_ms = (last.timestamp - first.timestamp).num_milliseconds();
    if sorted.len() < 2 || span_ms == 0 {
        return 0.0;
    }
    round2((last.normalized_score - first.normalized_score) / (span_ms as f64 / 3_600_000.0))
}

/// Normalize and bin every point of `series`
#[must_use]
pub fn normalize_and_bin(series: &[TrendSeries], size: BinSize) -> Vec<TemporalBin> {
    let points: Vec<&ScorePoint> = series.iter().flat_map(TrendSeries::points).collect();
    bin_points(&normalize_points(&points), size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RawMetrics, ScoreComponents};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap()
    }

    fn point(trend: &str, platform: &str, minutes: i64, engagement: f64, views: u64) -> ScorePoint {
        ScorePoint::new(trend, t0() + Duration::minutes(minutes), 50.0)
            .with_platform(platform)
            .with_category("Music")
            .with_metrics(RawMetrics::new(views, 0, 0, 0))
            .with_components(ScoreComponents {
                engagement,
                growth: engagement / 2.0,
                ..ScoreComponents::default()
            })
    }

    #[test]
    fn test_summary_statistics() {
        let stats = SummaryStatistics::from_values(&[4.0, 1.0, 3.0, 2.0]);
        assert_eq!(stats.mean, 2.5);
        assert_eq!(stats.median, 2.5);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 4.0);
        assert!((stats.std_dev - 1.25f64.sqrt()).abs() < 1e-12);

        assert_eq!(SummaryStatistics::from_values(&[3.0, 1.0, 2.0]).median, 2.0);

        let flat = SummaryStatistics::from_values(&[7.0, 7.0]);
        assert_eq!(flat.std_dev, 1.0);
        assert_eq!(flat.range_percentile(7.0), 50.0);

        let empty = SummaryStatistics::from_values(&[]);
        assert_eq!(empty.std_dev, 1.0);
        assert_eq!(empty.mean, 0.0);
    }

    #[test]
    fn test_range_percentile_is_clamped() {
        let stats = SummaryStatistics::from_values(&[10.0, 20.0]);
        assert_eq!(stats.range_percentile(15.0), 50.0);
        assert_eq!(stats.range_percentile(12.5), 25.0);
        assert_eq!(stats.range_percentile(0.0), 0.0);
        assert_eq!(stats.range_percentile(99.0), 100.0);
    }

    #[test]
    fn test_sigmoid_score() {
        assert_eq!(sigmoid_score(0.0), 50.0);
        assert_eq!(sigmoid_score(1.0), 73.0);
        assert_eq!(sigmoid_score(-1.0), 27.0);
        assert_eq!(sigmoid_score(50.0), 100.0);
        assert_eq!(sigmoid_score(-50.0), 0.0);
    }

    #[test]
    fn test_platform_factors() {
        assert_eq!(PlatformFactor::for_platform(&Platform::Tiktok).engagement_weight, 1.5);
        assert_eq!(PlatformFactor::for_platform(&Platform::Reddit).reach_multiplier, 10.0);
        assert_eq!(
            PlatformFactor::for_platform(&Platform::Other("vimeo".into())),
            PlatformFactor::for_platform(&Platform::Youtube)
        );
    }

    #[test]
    fn test_groups_are_normalized_independently() {
        let points = vec![
            point("a", "youtube", 0, 10.0, 100),
            point("b", "youtube", 10, 30.0, 300),
            point("c", "tiktok", 20, 99.0, 5),
        ];
        let refs: Vec<&ScorePoint> = points.iter().collect();
        let normalized = normalize_points(&refs);

        assert_eq!(normalized.len(), 3);
        assert_eq!(normalized[0].trend_id, "a");
        // symmetric pair around the group mean
        assert!((normalized[0].z_score + 1.0).abs() < 1e-12);
        assert!((normalized[1].z_score - 1.0).abs() < 1e-12);
        assert_eq!(normalized[0].normalized_score, 27.0);
        assert_eq!(normalized[1].normalized_score, 73.0);
        assert_eq!(normalized[0].percentile_rank, 0.0);
        assert_eq!(normalized[1].percentile_rank, 100.0);
        assert!((normalized[1].weighted_engagement - 36.0).abs() < 1e-9);
        assert_eq!(normalized[1].group_size, 2);

        // a lone point sits at its own mean
        assert_eq!(normalized[2].z_score, 0.0);
        assert_eq!(normalized[2].normalized_score, 50.0);
        assert_eq!(normalized[2].percentile_rank, 50.0);
        assert_eq!(normalized[2].weighted_reach, 2.5);
    }

    #[test]
    fn test_bin_floor() {
        let ts = t0() + Duration::minutes(95) + Duration::seconds(30);
        assert_eq!(BinSize::Hourly.floor(ts), t0() + Duration::hours(1));
        assert_eq!(BinSize::Minute.floor(ts), t0() + Duration::minutes(95));
        assert_eq!(BinSize::Daily.floor(ts), t0());
        assert_eq!("Daily".parse::<BinSize>().unwrap(), BinSize::Daily);
        assert!("weekly".parse::<BinSize>().is_err());
    }

    #[test]
    fn test_bins_aggregate_momentum_and_volatility() {
        let normalized = |minutes: i64, score: f64, reach: f64| NormalizedPoint {
            trend_id: "t".into(),
            timestamp: t0() + Duration::minutes(minutes),
            platform_source: Platform::Youtube,
            category: "Music".into(),
            normalized_score: score,
            z_score: 0.0,
            percentile_rank: 50.0,
            weighted_engagement: score / 10.0,
            weighted_reach: reach,
            growth: 0.0,
            reach,
            group_size: 3,
        };
        // out of order on purpose; the second hour holds a single point
        let points = vec![
            normalized(30, 60.0, 200.0),
            normalized(0, 40.0, 100.0),
            normalized(70, 90.0, 50.0),
        ];
        let bins = bin_points(&points, BinSize::Hourly);

        assert_eq!(bins.len(), 2);
        let first = &bins[0];
        assert_eq!(first.bin_start, t0());
        assert_eq!(first.point_count, 2);
        assert_eq!(first.avg_normalized_score, 50.0);
        assert_eq!(first.max_normalized_score, 60.0);
        assert_eq!(first.total_reach, 300.0);
        assert_eq!(first.avg_engagement, 5.0);
        // +20 over half an hour
        assert_eq!(first.trend_momentum, 40.0);
        assert_eq!(first.volatility, 10.0);

        let second = &bins[1];
        assert_eq!(second.bin_start, t0() + Duration::hours(1));
        assert_eq!(second.trend_momentum, 0.0);
        assert_eq!(second.volatility, 0.0);
    }

    #[test]
    fn test_normalize_and_bin_series() {
        let a = TrendSeries::from_points(
            "a",
            vec![point("a", "youtube", 0, 10.0, 100), point("a", "youtube", 5, 20.0, 200)],
        );
        let b = TrendSeries::from_points("b", vec![point("b", "reddit", 3, 5.0, 10)]);
        let bins = normalize_and_bin(&[a, b], BinSize::Hourly);

        assert_eq!(bins.len(), 2);
        // same bin start, ordered by platform
        assert_eq!(bins[0].platform_source, Platform::Youtube);
        assert_eq!(bins[0].point_count, 2);
        assert_eq!(bins[1].platform_source, Platform::Reddit);
        assert!(normalize_and_bin(&[], BinSize::Daily).is_empty());
    }
}
