//! Trend signal analytics: baseline statistics, anomaly detection,
//! ensemble forecasting, historical variants, viral growth scoring and
//! cross-trend normalization
//!
//! Every component here is synchronous and pure over a [`TrendSeries`]
//! snapshot; persistence and scheduling live in `storage` and `pipeline`.
//!
//! [`TrendSeries`]: crate::models::TrendSeries

pub mod anomaly;
pub mod baseline;
pub mod forecast;
pub mod normalize;
pub mod variants;
pub mod viral;

use chrono::{DateTime, Utc};
use thiserror::Error;

pub use anomaly::{
    Anomaly, AnomalyDetector, AnomalyMetadata, AnomalyThresholds, AnomalyType, Severity,
};
pub use baseline::{BaselineStatistics, LinearFit};
pub use forecast::{
    EnsembleForecast, Forecast, ForecastConfig, ForecastEngine, ForecastModel, ForecastPrediction,
    ForecastWarning, ModelKind,
};
pub use normalize::{
    BinSize, NormalizeConfig, NormalizedPoint, PlatformFactor, RollingWindow, TemporalBin,
};
pub use variants::{
    Variant, VariantConfig, VariantGenerator, VariantMetadata, VariantOptions, VariantPayload,
    VariantType,
};
pub use viral::{
    GrowthMetrics, RiskFactor, TrendDirection, TrendPrediction, ViralAlert, ViralAnalysis,
    ViralAnalyzer, ViralReport, ViralThresholds,
};

/// Errors raised inside the analytics components
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("Insufficient data points: need at least {needed}, got {actual}")]
    InsufficientData { needed: usize, actual: usize },

    #[error("Invalid time range: start {0} is after end {1}")]
    InvalidTimeRange(DateTime<Utc>, DateTime<Utc>),

    #[error("Invalid forecast horizon: {0} hours")]
    InvalidHorizon(u32),

    #[error("Series belongs to trend '{actual}', expected '{expected}'")]
    TrendMismatch { expected: String, actual: String },
}

/// Result type for analytics operations
pub type AnalyticsResult<T> = Result<T, AnalyticsError>;
