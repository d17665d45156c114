//! Score forecasting with four models combined into a weighted ensemble
//!
//! # Models
//!
//! - [`LinearRegressionModel`] - OLS of score against hours since the first point
//! - [`ExponentialSmoothingModel`] - smoothed level plus a naive trend
//! - [`SeasonalModel`] - hour-of-day averages with a damped trend
//! - [`PatternModel`] - trailing-window mean and trend scaled by pattern strength
//!
//! [`ForecastEngine`] runs every model and blends them by accuracy.

mod ensemble;
mod models;

pub use ensemble::ForecastEngine;
pub use models::{ExponentialSmoothingModel, LinearRegressionModel, PatternModel, SeasonalModel};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::TrendSeries;

/// Forecasting model identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    LinearRegression,
    ExponentialSmoothing,
    Seasonal,
    PatternBased,
    Ensemble,
}

impl ModelKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LinearRegression => "linear_regression",
            Self::ExponentialSmoothing => "exponential_smoothing",
            Self::Seasonal => "seasonal",
            Self::PatternBased => "pattern_based",
            Self::Ensemble => "ensemble",
        }
    }
}

/// One predicted point on the forecast horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPrediction {
    pub timestamp: DateTime<Utc>,
    pub predicted_value: f64,
    pub confidence_lower: f64,
    pub confidence_upper: f64,
    pub confidence_level: f64,
    pub hours_ahead: u32,
}

impl ForecastPrediction {
    /// Build a prediction `hours_ahead` after `origin` with a symmetric margin.
    ///
    /// The value is clamped to [0, 100] before the margin is applied, so
    /// `lower <= predicted <= upper` always holds within [0, 100].
    #[must_use]
    pub fn bounded(
        origin: DateTime<Utc>,
        hours_ahead: u32,
        predicted: f64,
        margin: f64,
        confidence_level: f64,
    ) -> Self {
        let predicted = clamp_score(predicted);
        let margin = if margin.is_finite() { margin.abs() } else { 0.0 };
        Self {
            timestamp: origin + Duration::hours(i64::from(hours_ahead)),
            predicted_value: predicted,
            confidence_lower: clamp_score(predicted - margin),
            confidence_upper: clamp_score(predicted + margin),
            confidence_level: confidence_level.clamp(0.0, 1.0),
            hours_ahead,
        }
    }
}

pub(crate) fn clamp_score(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Model-specific fitted parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum ModelMetadata {
    LinearRegression {
        slope: f64,
        intercept: f64,
        r_squared: f64,
    },
    ExponentialSmoothing {
        alpha: f64,
        trend: f64,
        last_smoothed: f64,
    },
    Seasonal {
        /// Average score per UTC hour of day that had observations
        hourly_averages: BTreeMap<u32, f64>,
        trend: f64,
    },
    PatternBased {
        window_size: usize,
        window_mean: f64,
        window_trend: f64,
        window_volatility: f64,
        pattern_strength: f64,
    },
}

/// Output of a single model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub model_type: ModelKind,
    /// 0..=1
    pub model_accuracy: f64,
    pub predictions: Vec<ForecastPrediction>,
    pub model_metadata: ModelMetadata,
}

/// Conditions worth surfacing to consumers of an ensemble forecast
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastWarning {
    ExtremeHighPrediction,
    ExtremeLowPrediction,
    LowConfidence,
    HighVolatilityForecast,
}

impl ForecastWarning {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExtremeHighPrediction => "extreme_high_prediction",
            Self::ExtremeLowPrediction => "extreme_low_prediction",
            Self::LowConfidence => "low_confidence",
            Self::HighVolatilityForecast => "high_volatility_forecast",
        }
    }
}

/// Weighted combination of every model's forecast,
/// keyed by `(trend_id, forecast_origin)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleForecast {
    pub trend_id: String,
    /// Timestamp of the last observed point
    pub forecast_origin: DateTime<Utc>,
    pub horizon_hours: u32,
    pub model_type: ModelKind,
    pub model_accuracy: f64,
    pub predictions: Vec<ForecastPrediction>,
    pub component_models: Vec<ModelKind>,
    /// Normalized to sum to 1.0
    pub model_weights: BTreeMap<ModelKind, f64>,
    pub components: Vec<Forecast>,
    pub warning_flags: Vec<ForecastWarning>,
}

impl EnsembleForecast {
    /// Upsert key
    #[must_use]
    pub fn key(&self) -> (String, DateTime<Utc>) {
        (self.trend_id.clone(), self.forecast_origin)
    }

    /// Prediction `hours_ahead` hours after the origin, if within the horizon
    #[must_use]
    pub fn prediction_at(&self, hours_ahead: u32) -> Option<&ForecastPrediction> {
        self.predictions.iter().find(|p| p.hours_ahead == hours_ahead)
    }
}

/// A pluggable forecasting model
pub trait ForecastModel: Send + Sync {
    /// Which model this is
    fn kind(&self) -> ModelKind;

    /// Produce `horizon_hours` hourly predictions anchored at the series' last point.
    ///
    /// Returns `None` when the model cannot be fitted to this series.
    fn forecast(&self, series: &TrendSeries, horizon_hours: u32) -> Option<Forecast>;
}

/// Forecasting settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Default number of hourly predictions
    pub horizon_hours: u32,
    /// Minimum series length for a forecast
    pub min_points: usize,
    /// How much history to load for forecasting
    pub history_window_hours: u32,
    /// Exponential smoothing factor
    pub smoothing_alpha: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon_hours: 24,
            min_points: 10,
            history_window_hours: 168,
            smoothing_alpha: 0.3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_bounded_prediction_keeps_order() {
        let origin = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let p = ForecastPrediction::bounded(origin, 3, 130.0, 12.0, 0.9);
        assert_eq!(p.predicted_value, 100.0);
        assert_eq!(p.confidence_upper, 100.0);
        assert_eq!(p.confidence_lower, 88.0);
        assert_eq!(p.timestamp, origin + Duration::hours(3));

        let low = ForecastPrediction::bounded(origin, 1, -5.0, -3.0, 1.5);
        assert_eq!(low.predicted_value, 0.0);
        assert_eq!(low.confidence_lower, 0.0);
        assert_eq!(low.confidence_upper, 3.0);
        assert_eq!(low.confidence_level, 1.0);
    }

    #[test]
    fn test_model_weights_serialize_by_name() {
        let mut weights = BTreeMap::new();
        weights.insert(ModelKind::Seasonal, 0.5);
        let json = serde_json::to_string(&weights).unwrap();
        assert_eq!(json, r#"{"seasonal":0.5}"#);
        let back: BTreeMap<ModelKind, f64> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, weights);
    }
}
