use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    aggregation_confidence, span_hours, Interval, Variant, VariantMetadata, VariantPayload,
    VariantType,
};
use crate::analytics::baseline::{population_std_dev, LinearFit};
use crate::models::TrendSeries;

/// Caveats about the history a projection was fitted on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionWarning {
    InsufficientData,
    LowCorrelation,
    HighVolatility,
    ShortTimeSpan,
}

/// Caveats about one projected value
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionFlag {
    LowConfidence,
    ExtremeHighScore,
    ExtremeLowScore,
}

/// Linear projection of the score `projection_hours` past the last point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionPayload {
    pub horizon: String,
    pub projection_hours: f64,
    pub projected_wave_score: f64,
    pub confidence_lower: f64,
    pub confidence_upper: f64,
    pub confidence_level: f64,
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub last_value: f64,
    pub based_on_points: usize,
    pub warning_flags: Vec<ProjectionFlag>,
    pub series_warnings: Vec<ProjectionWarning>,
}

pub(super) fn build(series: &TrendSeries, horizons: &[Interval], now: DateTime<Utc>) -> Vec<Variant> {
    let points = series.points();
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return Vec::new();
    };

    let hours: Vec<f64> = points
        .iter()
        .map(|p| (p.timestamp - first.timestamp).num_milliseconds() as f64 / 3_600_000.0)
        .collect();
    let scores = series.scores();
    let Some(fit) = LinearFit::fit(&hours, &scores) else {
        return Vec::new();
    };

    let volatility = population_std_dev(&scores);
    let span = span_hours(&points);

    let mut series_warnings = Vec::new();
    if points.len() < 5 {
        series_warnings.push(ProjectionWarning::InsufficientData);
    }
    if fit.r_squared < 0.5 {
        series_warnings.push(ProjectionWarning::LowCorrelation);
    }
    if volatility > 30.0 {
        series_warnings.push(ProjectionWarning::HighVolatility);
    }
    if span < 6.0 {
        series_warnings.push(ProjectionWarning::ShortTimeSpan);
    }

    let mut confidence = fit.r_squared.max(0.3);
    if fit.slope.abs() > 10.0 {
        confidence *= 0.8;
    }
    let data_quality =
        (aggregation_confidence(&points, now) - (volatility / 100.0).min(0.5)).max(0.1);

    horizons
        .iter()
        .map(|(label, horizon)| {
            let projection_hours = horizon.num_milliseconds() as f64 / 3_600_000.0;
            let projected = (last.wave_score + fit.slope * projection_hours).clamp(0.0, 100.0);
            let margin = (100.0 - projected) * (1.0 - confidence) * 0.5;

            let mut warning_flags = Vec::new();
            if confidence < 0.5 {
                warning_flags.push(ProjectionFlag::LowConfidence);
            }
            if projected > 90.0 {
                warning_flags.push(ProjectionFlag::ExtremeHighScore);
            }
            if projected < 10.0 {
                warning_flags.push(ProjectionFlag::ExtremeLowScore);
            }

            Variant {
                trend_id: series.trend_id.clone(),
                variant_type: VariantType::Projected,
                variant_name: format!("projection_{label}_ahead"),
                time_range_start: last.timestamp,
                time_range_end: last.timestamp + *horizon,
                payload: VariantPayload::Projected(ProjectionPayload {
                    horizon: label.clone(),
                    projection_hours,
                    projected_wave_score: projected,
                    confidence_lower: (projected - margin).clamp(0.0, 100.0),
                    confidence_upper: (projected + margin).clamp(0.0, 100.0),
                    confidence_level: confidence,
                    slope: fit.slope,
                    intercept: fit.intercept,
                    r_squared: fit.r_squared,
                    last_value: last.wave_score,
                    based_on_points: points.len(),
                    warning_flags,
                    series_warnings: series_warnings.clone(),
                }),
                metadata: VariantMetadata {
                    generated_at: now,
                    source_points: points.len(),
                    confidence_score: Some(confidence),
                    data_quality: Some(data_quality),
                },
            }
        })
        .collect()
}
