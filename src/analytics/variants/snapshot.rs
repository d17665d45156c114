use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{point_quality, Interval, Variant, VariantMetadata, VariantPayload, VariantType};
use crate::models::{Platform, RawMetrics, ScoreComponents, ScorePoint, TimeRange, TrendSeries};

/// The observation nearest to `now - interval`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotPayload {
    pub interval: String,
    pub timestamp: DateTime<Utc>,
    pub wave_score: f64,
    pub confidence: f64,
    pub platform_source: Platform,
    pub metrics: RawMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<ScoreComponents>,
    pub data_quality: f64,
}

/// Point closest in time to `target`; earlier wins a tie
fn closest_point(series: &TrendSeries, target: DateTime<Utc>) -> Option<&ScorePoint> {
    let mut best: Option<(&ScorePoint, i64)> = None;
    for point in series.iter() {
        let diff = (point.timestamp - target).num_milliseconds().abs();
        if best.map_or(true, |(_, d)| diff < d) {
            best = Some((point, diff));
        }
    }
    best.map(|(p, _)| p)
}

pub(super) fn build(series: &TrendSeries, intervals: &[Interval], now: DateTime<Utc>) -> Vec<Variant> {
    intervals
        .iter()
        .filter_map(|(label, offset)| {
            let point = closest_point(series, TimeRange::trailing(now, *offset).start)?;
            let data_quality = point_quality(point, now);

            Some(Variant {
                trend_id: series.trend_id.clone(),
                variant_type: VariantType::Snapshot,
                variant_name: format!("snapshot_{label}_ago"),
                time_range_start: point.timestamp,
                time_range_end: point.timestamp,
                payload: VariantPayload::Snapshot(SnapshotPayload {
                    interval: label.clone(),
                    timestamp: point.timestamp,
                    wave_score: point.wave_score,
                    confidence: point.confidence,
                    platform_source: point.platform_source.clone(),
                    metrics: point.raw_metrics,
                    components: point.components,
                    data_quality,
                }),
                metadata: VariantMetadata {
                    generated_at: now,
                    source_points: 1,
                    confidence_score: None,
                    data_quality: Some(data_quality),
                },
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_snapshot_picks_closest_point() {
        let now = Utc.with_ymd_and_hms(2025, 5, 10, 12, 0, 0).unwrap();
        let series = TrendSeries::from_points(
            "s",
            vec![
                ScorePoint::new("s", now - Duration::hours(8), 10.0),
                ScorePoint::new("s", now - Duration::hours(5), 20.0),
                ScorePoint::new("s", now, 30.0),
            ],
        );
        let intervals = vec![("6h".to_string(), Duration::hours(6))];
        let variants = build(&series, &intervals, now);

        assert_eq!(variants.len(), 1);
        let v = &variants[0];
        assert_eq!(v.variant_name, "snapshot_6h_ago");
        assert_eq!(v.time_range_start, now - Duration::hours(5));
        match &v.payload {
            VariantPayload::Snapshot(s) => {
                assert_eq!(s.wave_score, 20.0);
                // no raw metrics and no components
                assert_eq!(s.data_quality, 0.56);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }
}
