//! wavescope - Trend signal analytics core
//!
//! Turns raw engagement observations (views, likes, comments, shares) of
//! content items into a scored time series per trend, and derives three
//! analytical artifacts from it: anomalies, ensemble forecasts and
//! historical variants. Trends can also be ranked by viral potential and
//! normalized across platforms into time bins.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`models`] - Observations, score points and trend series
//! - [`scoring`] - WaveScore computation from raw metrics
//! - [`analytics`] - Baselines, anomaly detection, forecasting, variants,
//!   viral scoring and normalization
//! - [`storage`] - Trend store trait with SQLite and in-memory backends
//! - [`pipeline`] - Service operations and the parallel batch runner
//! - [`metrics`] - Prometheus counters and histograms
//! - [`utils`] - Interval parsing, rounding and retry helpers
//!
//! # Example
//!
//! ```no_run
//! use chrono::{Duration, Utc};
//! use wavescope::config::Config;
//! use wavescope::models::TimeRange;
//! use wavescope::pipeline::{BatchOptions, TrendAnalyticsService};
//! use wavescope::storage::open_store;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let store = open_store(&config.storage)?;
//!     let service = TrendAnalyticsService::new(store, &config)?;
//!
//!     let now = Utc::now();
//!     let window = TimeRange::trailing(now, Duration::hours(24));
//!     let report = service.run_batch(window, &BatchOptions::at(now)).await?;
//!     println!("{} trends processed", report.trends_processed);
//!     Ok(())
//! }
//! ```

pub mod analytics;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod scoring;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::analytics::{
        Anomaly, AnomalyDetector, AnomalyType, BinSize, EnsembleForecast, ForecastEngine,
        Severity, TemporalBin, Variant, VariantGenerator, VariantOptions, VariantType,
        ViralAnalyzer, ViralReport,
    };
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, Result, WaveErrorTrait};
    pub use crate::models::{RawMetrics, RawObservation, ScorePoint, TimeRange, TrendSeries};
    pub use crate::pipeline::{BatchOptions, BatchReport, TrendAnalyticsService};
    pub use crate::scoring::WaveScoreCalculator;
    pub use crate::storage::{SharedTrendStore, TrendStore};
}

// Direct re-exports for convenience
pub use models::{RawObservation, ScorePoint, TrendSeries};
