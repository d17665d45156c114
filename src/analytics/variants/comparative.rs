use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Variant, VariantMetadata, VariantPayload, VariantType};
use crate::analytics::baseline::{diversity_score, max_value, mean, percentile_rank, ranking};
use crate::models::TrendSeries;
use crate::utils::round2;

// ============================================================================
// Performance against category peers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendPerformance {
    pub max_wave_score: f64,
    pub avg_wave_score: f64,
    pub total_reach: f64,
}

impl TrendPerformance {
    fn of(series: &TrendSeries) -> Self {
        let scores = series.scores();
        Self {
            max_wave_score: max_value(&scores).unwrap_or(0.0),
            avg_wave_score: mean(&scores),
            total_reach: series.iter().map(|p| p.reach()).sum(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerPerformance {
    pub trend_id: String,
    pub max_wave_score: f64,
    pub total_reach: f64,
}

/// Where the trend sits among same-category peers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceComparison {
    pub category: String,
    pub current: TrendPerformance,
    pub peers: Vec<PeerPerformance>,
    pub wave_score_percentile: f64,
    pub reach_percentile: f64,
    pub wave_score_ranking: usize,
    pub reach_ranking: usize,
}

pub(super) fn build_performance(
    series: &TrendSeries,
    candidates: &[TrendSeries],
    now: DateTime<Utc>,
    window: Duration,
    max_peers: usize,
) -> Option<Variant> {
    let category = series.category().unwrap_or_default();
    let start = now
        .checked_sub_signed(window)
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    let peers: Vec<PeerPerformance> = candidates
        .iter()
        .filter(|peer| peer.trend_id != series.trend_id)
        .filter(|peer| peer.category().unwrap_or_default() == category)
        .map(|peer| peer.range(start, now))
        .filter(|peer| !peer.is_empty())
        .take(max_peers)
        .map(|peer| {
            let perf = TrendPerformance::of(&peer);
            PeerPerformance {
                trend_id: peer.trend_id.clone(),
                max_wave_score: perf.max_wave_score,
                total_reach: perf.total_reach,
            }
        })
        .collect();

    if peers.is_empty() {
        return None;
    }

    let current = TrendPerformance::of(series);
    let peer_scores: Vec<f64> = peers.iter().map(|p| p.max_wave_score).collect();
    let peer_reach: Vec<f64> = peers.iter().map(|p| p.total_reach).collect();
    let (first, last) = (series.first()?, series.last()?);

    Some(Variant {
        trend_id: series.trend_id.clone(),
        variant_type: VariantType::Comparative,
        variant_name: "performance_comparison".to_string(),
        time_range_start: first.timestamp,
        time_range_end: last.timestamp,
        metadata: VariantMetadata {
            generated_at: now,
            source_points: series.len(),
            confidence_score: None,
            data_quality: None,
        },
        payload: VariantPayload::Performance(PerformanceComparison {
            category: category.to_string(),
            wave_score_percentile: round2(percentile_rank(current.max_wave_score, &peer_scores)),
            reach_percentile: round2(percentile_rank(current.total_reach, &peer_reach)),
            wave_score_ranking: ranking(current.max_wave_score, &peer_scores),
            reach_ranking: ranking(current.total_reach, &peer_reach),
            current,
            peers,
        }),
    })
}

// ============================================================================
// Cross-platform comparison
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlatformStats {
    pub data_points: usize,
    pub avg_wave_score: f64,
    pub max_wave_score: f64,
    pub total_reach: f64,
    pub avg_engagement: f64,
}

/// How the trend performs on each platform it appears on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformComparison {
    pub by_platform: BTreeMap<String, PlatformStats>,
    /// Highest average score; ties go to the alphabetically first platform
    pub best_performing: String,
    pub cross_platform_reach: f64,
    /// Evenness of reach across platforms, 0..=100
    pub platform_diversity_score: f64,
}

pub(super) fn build_platform(series: &TrendSeries, now: DateTime<Utc>) -> Option<Variant> {
    let mut grouped: BTreeMap<String, (Vec<f64>, Vec<f64>, f64)> = BTreeMap::new();
    for point in series.iter() {
        let entry = grouped
            .entry(point.platform_source.to_string())
            .or_default();
        entry.0.push(point.wave_score);
        entry.1.push(point.engagement());
        entry.2 += point.reach();
    }
    if grouped.len() < 2 {
        return None;
    }

    let by_platform: BTreeMap<String, PlatformStats> = grouped
        .into_iter()
        .map(|(platform, (scores, engagement, reach))| {
            let stats = PlatformStats {
                data_points: scores.len(),
                avg_wave_score: mean(&scores),
                max_wave_score: max_value(&scores).unwrap_or(0.0),
                total_reach: reach,
                avg_engagement: mean(&engagement),
            };
            (platform, stats)
        })
        .collect();

    let mut best: Option<(&String, f64)> = None;
    for (platform, stats) in &by_platform {
        if best.map_or(true, |(_, avg)| stats.avg_wave_score > avg) {
            best = Some((platform, stats.avg_wave_score));
        }
    }
    let best_performing = best.map(|(p, _)| p.clone()).unwrap_or_default();

    let reaches: Vec<f64> = by_platform.values().map(|s| s.total_reach).collect();
    let (first, last) = (series.first()?, series.last()?);

    Some(Variant {
        trend_id: series.trend_id.clone(),
        variant_type: VariantType::Comparative,
        variant_name: "platform_comparison".to_string(),
        time_range_start: first.timestamp,
        time_range_end: last.timestamp,
        metadata: VariantMetadata {
            generated_at: now,
            source_points: series.len(),
            confidence_score: None,
            data_quality: None,
        },
        payload: VariantPayload::Platform(PlatformComparison {
            best_performing,
            cross_platform_reach: reaches.iter().sum(),
            platform_diversity_score: diversity_score(&reaches),
            by_platform,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RawMetrics, ScorePoint};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 10, 12, 0, 0).unwrap()
    }

    fn flat(trend: &str, category: &str, max: f64) -> TrendSeries {
        TrendSeries::from_points(
            trend,
            vec![
                ScorePoint::new(trend, now() - Duration::hours(2), max / 2.0)
                    .with_category(category),
                ScorePoint::new(trend, now() - Duration::hours(1), max).with_category(category),
            ],
        )
    }

    #[test]
    fn test_performance_percentile_and_ranking() {
        let series = flat("me", "Music", 60.0);
        let peers = vec![
            flat("a", "Music", 40.0),
            flat("b", "Music", 60.0),
            flat("c", "Music", 80.0),
            flat("other-cat", "News", 99.0),
            flat("me", "Music", 100.0),
        ];
        let variant =
            build_performance(&series, &peers, now(), Duration::days(30), 10).unwrap();
        let VariantPayload::Performance(perf) = &variant.payload else {
            panic!("expected performance payload");
        };

        assert_eq!(perf.peers.len(), 3);
        assert_eq!(perf.wave_score_percentile, 66.67);
        assert_eq!(perf.wave_score_ranking, 2);
    }

    #[test]
    fn test_performance_respects_window_and_limit() {
        let series = flat("me", "Music", 60.0);
        let old = TrendSeries::from_points(
            "old",
            vec![ScorePoint::new("old", now() - Duration::days(45), 90.0).with_category("Music")],
        );
        assert!(build_performance(&series, &[old], now(), Duration::days(30), 10).is_none());

        let many: Vec<_> = (0..15).map(|i| flat(&format!("p{i:02}"), "Music", 50.0)).collect();
        let variant = build_performance(&series, &many, now(), Duration::days(30), 10).unwrap();
        let VariantPayload::Performance(perf) = &variant.payload else {
            panic!("expected performance payload");
        };
        assert_eq!(perf.peers.len(), 10);
    }

    #[test]
    fn test_platform_comparison() {
        let t = now();
        let series = TrendSeries::from_points(
            "x",
            vec![
                ScorePoint::new("x", t - Duration::hours(3), 40.0)
                    .with_platform("youtube")
                    .with_metrics(RawMetrics::new(500, 0, 0, 0)),
                ScorePoint::new("x", t - Duration::hours(2), 70.0)
                    .with_platform("tiktok")
                    .with_metrics(RawMetrics::new(500, 0, 0, 0)),
                ScorePoint::new("x", t - Duration::hours(1), 60.0)
                    .with_platform("youtube")
                    .with_metrics(RawMetrics::new(0, 0, 0, 0)),
            ],
        );
        let variant = build_platform(&series, now()).unwrap();
        let VariantPayload::Platform(cmp) = &variant.payload else {
            panic!("expected platform payload");
        };

        assert_eq!(cmp.by_platform.len(), 2);
        assert_eq!(cmp.best_performing, "tiktok");
        assert_eq!(cmp.cross_platform_reach, 1000.0);
        assert!((cmp.platform_diversity_score - 100.0).abs() < 1e-9);
        assert_eq!(cmp.by_platform["youtube"].data_points, 2);
    }

    #[test]
    fn test_single_platform_skipped() {
        assert!(build_platform(&flat("me", "Music", 10.0), now()).is_none());
    }
}
