use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    aggregation_confidence, span_hours, Interval, Variant, VariantMetadata, VariantPayload,
    VariantType,
};
use crate::analytics::baseline::{
    index_slope, max_value, mean, min_value, population_std_dev, LinearFit,
};
use crate::models::{ScorePoint, TimeRange, TrendSeries};

/// avg / max / min / stddev / slope / sum of one metric over a window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub avg: f64,
    pub max: f64,
    pub min: f64,
    pub std_dev: f64,
    /// OLS slope against point index
    pub trend: f64,
    pub total: f64,
}

impl MetricSummary {
    fn of(values: &[f64]) -> Self {
        Self {
            avg: mean(values),
            max: max_value(values).unwrap_or(0.0),
            min: min_value(values).unwrap_or(0.0),
            std_dev: population_std_dev(values),
            trend: index_slope(values),
            total: values.iter().sum(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Rising,
    Stable,
    Falling,
}

impl TrendDirection {
    /// Classify an index slope: above 0.1 rising, below -0.1 falling
    #[must_use]
    pub fn from_slope(slope: f64) -> Self {
        if slope > 0.1 {
            Self::Rising
        } else if slope < -0.1 {
            Self::Falling
        } else {
            Self::Stable
        }
    }
}

/// Shape of the score movement within a window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub direction: TrendDirection,
    pub slope: f64,
    pub r_squared: f64,
    /// Score change per hour between first and last point
    pub velocity: f64,
    /// Mean second difference
    pub acceleration: f64,
    pub volatility: f64,
    pub momentum_score: f64,
}

impl TrendAnalysis {
    fn of(points: &[&ScorePoint]) -> Option<Self> {
        let scores: Vec<f64> = points.iter().map(|p| p.wave_score).collect();
        let fit = LinearFit::fit_index(&scores)?;

        let span = span_hours(points);
        let velocity = match (scores.first(), scores.last()) {
            (Some(first), Some(last)) if span > 0.0 => (last - first) / span,
            _ => 0.0,
        };
        let volatility = population_std_dev(&scores);

        Some(Self {
            direction: TrendDirection::from_slope(fit.slope),
            slope: fit.slope,
            r_squared: fit.r_squared,
            velocity,
            acceleration: acceleration(&scores),
            volatility,
            momentum_score: momentum(&scores, fit.slope, volatility),
        })
    }
}

fn acceleration(values: &[f64]) -> f64 {
    if values.len() < 3 {
        return 0.0;
    }
    let second: Vec<f64> = values
        .windows(3)
        .map(|w| (w[2] - w[1]) - (w[1] - w[0]))
        .collect();
    mean(&second)
}

fn momentum(values: &[f64], slope: f64, volatility: f64) -> f64 {
    let Some(last) = values.last() else {
        return 0.0;
    };
    let recent_start = values[values.len().saturating_sub(5)];
    0.4 * slope.abs() + 0.4 * (last - recent_start).abs() + 0.2 * (100.0 - volatility)
}

/// Summary of one aggregation timeframe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedPayload {
    pub timeframe: String,
    pub data_points: usize,
    pub time_span_hours: f64,
    pub wave_score: MetricSummary,
    pub engagement: MetricSummary,
    pub reach: MetricSummary,
    /// Absent for single-point windows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend_analysis: Option<TrendAnalysis>,
}

pub(super) fn build(
    series: &TrendSeries,
    timeframes: &[Interval],
    now: DateTime<Utc>,
) -> Vec<Variant> {
    timeframes
        .iter()
        .filter_map(|(label, period)| {
            let window = series.range(TimeRange::trailing(now, *period).start, now);
            let points = window.points();
            let (first, last) = (points.first()?, points.last()?);

            let scores: Vec<f64> = points.iter().map(|p| p.wave_score).collect();
            let engagement: Vec<f64> = points.iter().map(|p| p.engagement()).collect();
            let reach: Vec<f64> = points.iter().map(|p| p.reach()).collect();

            Some(Variant {
                trend_id: series.trend_id.clone(),
                variant_type: VariantType::Aggregated,
                variant_name: format!("aggregated_{label}"),
                time_range_start: first.timestamp,
                time_range_end: last.timestamp,
                payload: VariantPayload::Aggregated(AggregatedPayload {
                    timeframe: label.clone(),
                    data_points: points.len(),
                    time_span_hours: span_hours(&points),
                    wave_score: MetricSummary::of(&scores),
                    engagement: MetricSummary::of(&engagement),
                    reach: MetricSummary::of(&reach),
                    trend_analysis: TrendAnalysis::of(&points),
                }),
                metadata: VariantMetadata {
                    generated_at: now,
                    source_points: points.len(),
                    confidence_score: Some(aggregation_confidence(&points, now)),
                    data_quality: None,
                },
            })
        })
        .collect()
}
