//! The four forecasting models

use chrono::Timelike;
use std::collections::BTreeMap;

use super::{Forecast, ForecastModel, ForecastPrediction, ModelKind, ModelMetadata};
use crate::analytics::baseline::{mean, population_std_dev, LinearFit};
use crate::models::TrendSeries;

/// `(last - first) / n`; 0 for fewer than two values
fn naive_trend(values: &[f64]) -> f64 {
    match (values.first(), values.last()) {
        (Some(first), Some(last)) if values.len() >= 2 => (last - first) / values.len() as f64,
        _ => 0.0,
    }
}

// ============================================================================
// Linear regression
// ============================================================================

/// OLS fit of score against hours since the first point
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearRegressionModel;

impl ForecastModel for LinearRegressionModel {
    fn kind(&self) -> ModelKind {
        ModelKind::LinearRegression
    }

    fn forecast(&self, series: &TrendSeries, horizon_hours: u32) -> Option<Forecast> {
        let first = series.first()?;
        let last = series.last()?;

        let hours: Vec<f64> = series
            .iter()
            .map(|p| (p.timestamp - first.timestamp).num_milliseconds() as f64 / 3_600_000.0)
            .collect();
        let fit = LinearFit::fit(&hours, &series.scores())?;

        let last_x = hours.last().copied().unwrap_or(0.0);
        let confidence = fit.r_squared.max(0.3);

        let predictions = (1..=horizon_hours)
            .map(|h| {
                let raw = fit.predict(last_x + f64::from(h));
                let predicted = raw.clamp(0.0, 100.0);
                let margin = (100.0 - predicted) * (1.0 - confidence) * 0.3;
                ForecastPrediction::bounded(last.timestamp, h, raw, margin, confidence)
            })
            .collect();

        Some(Forecast {
            model_type: ModelKind::LinearRegression,
            model_accuracy: fit.r_squared,
            predictions,
            model_metadata: ModelMetadata::LinearRegression {
                slope: fit.slope,
                intercept: fit.intercept,
                r_squared: fit.r_squared,
            },
        })
    }
}

// ============================================================================
// Exponential smoothing
// ============================================================================

/// Simple exponential smoothing with a naive trend over the smoothed values
#[derive(Debug, Clone, Copy)]
pub struct ExponentialSmoothingModel {
    alpha: f64,
}

impl ExponentialSmoothingModel {
    /// Create with smoothing factor `alpha` (clamped to (0, 1])
    #[must_use]
    pub fn new(alpha: f64) -> Self {
        let alpha = if alpha.is_finite() && alpha > 0.0 {
            alpha.min(1.0)
        } else {
            0.3
        };
        Self { alpha }
    }

    fn smooth(&self, values: &[f64]) -> Vec<f64> {
        let mut smoothed = Vec::with_capacity(values.len());
        for (i, v) in values.iter().enumerate() {
            let next = if i == 0 {
                *v
            } else {
                self.alpha * v + (1.0 - self.alpha) * smoothed[i - 1]
            };
            smoothed.push(next);
        }
        smoothed
    }
}

impl Default for ExponentialSmoothingModel {
    fn default() -> Self {
        Self::new(0.3)
    }
}

impl ForecastModel for ExponentialSmoothingModel {
    fn kind(&self) -> ModelKind {
        ModelKind::ExponentialSmoothing
    }

    fn forecast(&self, series: &TrendSeries, horizon_hours: u32) -> Option<Forecast> {
        let last = series.last()?;
        let smoothed = self.smooth(&series.scores());
        let last_smoothed = *smoothed.last()?;
        let trend = naive_trend(&smoothed);

        let predictions = (1..=horizon_hours)
            .map(|h| {
                let h_f64 = f64::from(h);
                ForecastPrediction::bounded(
                    last.timestamp,
                    h,
                    last_smoothed + trend * h_f64,
                    trend.abs() * h_f64 * 0.5,
                    0.6,
                )
            })
            .collect();

        Some(Forecast {
            model_type: ModelKind::ExponentialSmoothing,
            model_accuracy: 0.6,
            predictions,
            model_metadata: ModelMetadata::ExponentialSmoothing {
                alpha: self.alpha,
                trend,
                last_smoothed,
            },
        })
    }
}

// ============================================================================
// Seasonal
// ============================================================================

/// Hour-of-day (UTC) averages plus a damped naive trend
#[derive(Debug, Clone, Copy, Default)]
pub struct SeasonalModel;

impl SeasonalModel {
    fn hourly_averages(series: &TrendSeries) -> BTreeMap<u32, f64> {
        let mut buckets: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
        for point in series.iter() {
            buckets
                .entry(point.timestamp.hour())
                .or_default()
                .push(point.wave_score);
        }
        buckets
            .into_iter()
            .map(|(hour, scores)| (hour, mean(&scores)))
            .collect()
    }
}

impl ForecastModel for SeasonalModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Seasonal
    }

    fn forecast(&self, series: &TrendSeries, horizon_hours: u32) -> Option<Forecast> {
        let last = series.last()?;
        let scores = series.scores();
        let series_mean = mean(&scores);
        let trend = naive_trend(&scores);
        let hourly_averages = Self::hourly_averages(series);

        let predictions = (1..=horizon_hours)
            .map(|h| {
                let at = last.timestamp + chrono::Duration::hours(i64::from(h));
                let seasonal = hourly_averages
                    .get(&at.hour())
                    .copied()
                    .unwrap_or(series_mean);
                ForecastPrediction::bounded(
                    last.timestamp,
                    h,
                    seasonal + trend * f64::from(h) * 0.1,
                    10.0,
                    0.5,
                )
            })
            .collect();

        Some(Forecast {
            model_type: ModelKind::Seasonal,
            model_accuracy: 0.5,
            predictions,
            model_metadata: ModelMetadata::Seasonal {
                hourly_averages,
                trend,
            },
        })
    }
}

// ============================================================================
// Pattern based
// ============================================================================

/// Trailing-window features projected forward, trusted in proportion to
/// how calm the whole series is
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternModel;

impl ForecastModel for PatternModel {
    fn kind(&self) -> ModelKind {
        ModelKind::PatternBased
    }

    fn forecast(&self, series: &TrendSeries, horizon_hours: u32) -> Option<Forecast> {
        let last = series.last()?;
        let scores = series.scores();
        let window_size = (scores.len() / 3).min(10).max(1);
        let window = &scores[scores.len() - window_size..];

        let window_mean = mean(window);
        let window_trend = naive_trend(window);
        let window_volatility = population_std_dev(window);
        let pattern_strength = (1.0 - population_std_dev(&scores) / 100.0).max(0.3);
        let confidence = pattern_strength.max(0.4);

        let predictions = (1..=horizon_hours)
            .map(|h| {
                let raw = window_mean + window_trend * f64::from(h);
                let predicted = raw.clamp(0.0, 100.0);
                let margin = (100.0 - predicted) * (1.0 - confidence) * 0.4;
                ForecastPrediction::bounded(last.timestamp, h, raw, margin, confidence)
            })
            .collect();

        Some(Forecast {
            model_type: ModelKind::PatternBased,
            model_accuracy: pattern_strength,
            predictions,
            model_metadata: ModelMetadata::PatternBased {
                window_size,
                window_mean,
                window_trend,
                window_volatility,
                pattern_strength,
            },
        })
    }
}
