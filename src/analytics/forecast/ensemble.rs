//! Accuracy-weighted ensemble over the individual forecasting models

use std::collections::{BTreeMap, BTreeSet};

use super::{
    EnsembleForecast, ExponentialSmoothingModel, Forecast, ForecastConfig, ForecastModel,
    ForecastPrediction, ForecastWarning, LinearRegressionModel, ModelKind, PatternModel,
    SeasonalModel,
};
use crate::analytics::baseline::population_std_dev;
use crate::error::{Error, Result};
use crate::models::TrendSeries;
use crate::utils::round2;

/// Weight given to a model that reports zero accuracy
const ZERO_ACCURACY_WEIGHT: f64 = 0.5;

/// Runs a set of forecasting models and blends their predictions
pub struct ForecastEngine {
    models: Vec<Box<dyn ForecastModel>>,
    min_points: usize,
}

impl std::fmt::Debug for ForecastEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForecastEngine")
            .field(
                "models",
                &self.models.iter().map(|m| m.kind()).collect::<Vec<_>>(),
            )
            .field("min_points", &self.min_points)
            .finish()
    }
}

impl ForecastEngine {
    /// Create an engine with the four standard models
    #[must_use]
    pub fn new(config: &ForecastConfig) -> Self {
        Self {
            models: vec![
                Box::new(LinearRegressionModel),
                Box::new(ExponentialSmoothingModel::new(config.smoothing_alpha)),
                Box::new(SeasonalModel),
                Box::new(PatternModel),
            ],
            min_points: config.min_points,
        }
    }

    /// Create an engine with a custom model set
    ///
    /// # Errors
    /// Returns a config error when two models share a [`ModelKind`], since
    /// the published weights are keyed by kind.
    pub fn with_models(models: Vec<Box<dyn ForecastModel>>, min_points: usize) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for model in &models {
            if !seen.insert(model.kind()) {
                return Err(Error::config(format!(
                    "duplicate forecast model: {}",
                    model.kind().as_str()
                )));
            }
        }
        Ok(Self { models, min_points })
    }

    /// Minimum number of points a series needs to be forecast
    #[must_use]
    pub fn min_points(&self) -> usize {
        self.min_points
    }

    /// Forecast `horizon_hours` hourly values for a series
    ///
    /// # Returns
    /// `None` when the series has fewer than `min_points` points, the
    /// horizon is zero, or no model could be fitted.
    pub fn forecast(&self, series: &TrendSeries, horizon_hours: u32) -> Option<EnsembleForecast> {
        if series.len() < self.min_points || horizon_hours == 0 {
            tracing::debug!(
                trend_id = %series.trend_id,
                points = series.len(),
                needed = self.min_points,
                horizon_hours,
                "Skipping forecast"
            );
            return None;
        }
        let origin = series.last()?.timestamp;

        let components: Vec<Forecast> = self
            .models
            .iter()
            .filter_map(|model| model.forecast(series, horizon_hours))
            .collect();
        if components.is_empty() {
            return None;
        }

        let raw = raw_weights(&components);
        let total: f64 = raw.iter().sum();
        let weights: Vec<f64> = raw.iter().map(|w| w / total).collect();
        let predictions: Vec<ForecastPrediction> = (1..=horizon_hours)
            .map(|h| combine_hour(&components, &weights, h, origin))
            .collect();

        let mut model_weights = BTreeMap::new();
        for (component, weight) in components.iter().zip(&weights) {
            *model_weights.entry(component.model_type).or_insert(0.0) += weight;
        }

        Some(EnsembleForecast {
            trend_id: series.trend_id.clone(),
            forecast_origin: origin,
            horizon_hours,
            model_type: ModelKind::Ensemble,
            model_accuracy: total / components.len() as f64,
            warning_flags: assess_warnings(&predictions),
            predictions,
            component_models: components.iter().map(|c| c.model_type).collect(),
            model_weights,
            components,
        })
    }
}

/// Per-component accuracy with the zero-accuracy fallback applied
fn raw_weights(components: &[Forecast]) -> Vec<f64> {
    components
        .iter()
        .map(|c| {
            if c.model_accuracy > 0.0 {
                c.model_accuracy
            } else {
                ZERO_ACCURACY_WEIGHT
            }
        })
        .collect()
}

fn combine_hour(
    components: &[Forecast],
    weights: &[f64],
    hours_ahead: u32,
    origin: chrono::DateTime<chrono::Utc>,
) -> ForecastPrediction {
    let (mut value, mut lower, mut upper, mut level) = (0.0, 0.0, 0.0, 0.0);
    for (component, weight) in components.iter().zip(weights) {
        if let Some(p) = component
            .predictions
            .iter()
            .find(|p| p.hours_ahead == hours_ahead)
        {
            value += p.predicted_value * weight;
            lower += p.confidence_lower * weight;
            upper += p.confidence_upper * weight;
            level += p.confidence_level * weight;
        }
    }

    ForecastPrediction {
        timestamp: origin + chrono::Duration::hours(i64::from(hours_ahead)),
        predicted_value: round2(value).clamp(0.0, 100.0),
        confidence_lower: round2(lower).clamp(0.0, 100.0),
        confidence_upper: round2(upper).clamp(0.0, 100.0),
        confidence_level: round2(level).clamp(0.0, 1.0),
        hours_ahead,
    }
}

fn assess_warnings(predictions: &[ForecastPrediction]) -> Vec<ForecastWarning> {
    let mut flags = BTreeSet::new();
    for p in predictions {
        if p.predicted_value > 95.0 {
            flags.insert(ForecastWarning::ExtremeHighPrediction);
        }
        if p.predicted_value < 5.0 {
            flags.insert(ForecastWarning::ExtremeLowPrediction);
        }
        if p.confidence_level < 0.4 {
            flags.insert(ForecastWarning::LowConfidence);
        }
    }

    let values: Vec<f64> = predictions.iter().map(|p| p.predicted_value).collect();
    if population_std_dev(&values) > 20.0 {
        flags.insert(ForecastWarning::HighVolatilityForecast);
    }

    flags.into_iter().collect()
}
