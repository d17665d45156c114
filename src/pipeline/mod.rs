//! Trend analytics service and batch runner
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────────────────────────────────┐     ┌─────────────┐
//! │  Raw        │     │            per-trend task                │     │             │
//! │ observations│──▶  │  ┌──────────┐ ┌──────────┐ ┌──────────┐  │ ──▶ │ TrendStore  │
//! │  (ingest)   │     │  │ anomaly  │ │ forecast │ │ variants │  │     │  (upserts)  │
//! └─────────────┘     │  └──────────┘ └──────────┘ └──────────┘  │     └─────────────┘
//!                     │          joined with try_join!           │
//!                     └──────────────────────────────────────────┘
//!                        JoinSet, bounded by a Semaphore
//! ```
//!
//! Viral ranking and cross-trend normalization read a whole window at once
//! and are exposed as separate operations.
//!
//! Trends are independent: each runs in its own task over a read-only
//! snapshot of its series. Every store call carries the configured
//! deadline, and a whole trend is retried with backoff when it fails
//! with a recoverable error. Upserts are keyed, so retries are harmless.

use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::analytics::normalize::normalize_and_bin;
use crate::analytics::{
    AnalyticsError, Anomaly, AnomalyDetector, BinSize, EnsembleForecast, ForecastConfig,
    ForecastEngine, NormalizeConfig, TemporalBin, Variant, VariantGenerator, VariantOptions,
    VariantType, ViralAnalyzer, ViralReport,
};
use crate::config::Config;
use crate::error::{Error, Result, WaveErrorTrait};
use crate::metrics;
use crate::models::{RawObservation, TimeRange, TrendSeries};
use crate::scoring::WaveScoreCalculator;
use crate::storage::SharedTrendStore;
use crate::utils::retry::{with_retry, RetryConfig};

// ============================================================================
// Reports
// ============================================================================

/// Result of scoring and storing a batch of observations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub observations: usize,
    pub points_upserted: usize,
    pub trends: usize,
}

/// What was derived for one trend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    pub trend_id: String,
    pub anomalies: usize,
    pub forecast_generated: bool,
    pub variants: usize,
}

/// A trend that failed after retries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendFailure {
    pub trend_id: String,
    pub error: String,
}

/// Summary of a batch run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub trends_processed: usize,
    pub trends_failed: usize,
    pub anomalies_detected: usize,
    pub forecasts_generated: usize,
    pub forecasts_skipped: usize,
    pub variants_generated: usize,
    pub failures: Vec<TrendFailure>,
    pub duration_ms: u64,
}

impl BatchReport {
    fn absorb(&mut self, report: &TrendReport) {
        self.trends_processed += 1;
        self.anomalies_detected += report.anomalies;
        if report.forecast_generated {
            self.forecasts_generated += 1;
        } else {
            self.forecasts_skipped += 1;
        }
        self.variants_generated += report.variants;
    }

    fn fail(&mut self, trend_id: String, error: String) {
        self.trends_failed += 1;
        self.failures.push(TrendFailure { trend_id, error });
    }
}

/// Per-run inputs for a batch
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Reference time for forecasting history and variant windows
    pub now: DateTime<Utc>,
    /// Forecast horizon; the configured default when `None`
    pub horizon_hours: Option<u32>,
    /// Variant types to derive
    pub variant_types: BTreeSet<VariantType>,
}

impl BatchOptions {
    #[must_use]
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now,
            horizon_hours: None,
            variant_types: VariantType::ALL.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn with_horizon(mut self, horizon_hours: u32) -> Self {
        self.horizon_hours = Some(horizon_hours);
        self
    }
}

// ============================================================================
// Service
// ============================================================================

/// Entry point for ingestion, derivation and batch runs over a [`TrendStore`]
///
/// Cheap to clone; clones share the store and the forecasting engine.
///
/// [`TrendStore`]: crate::storage::TrendStore
#[derive(Clone)]
pub struct TrendAnalyticsService {
    store: SharedTrendStore,
    calculator: WaveScoreCalculator,
    detector: AnomalyDetector,
    engine: Arc<ForecastEngine>,
    generator: VariantGenerator,
    viral: ViralAnalyzer,
    normalize: NormalizeConfig,
    forecast: ForecastConfig,
    retry: RetryConfig,
    io_timeout: std::time::Duration,
    max_concurrent_trends: usize,
}

impl std::fmt::Debug for TrendAnalyticsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrendAnalyticsService")
            .field("engine", &self.engine)
            .field("io_timeout", &self.io_timeout)
            .field("max_concurrent_trends", &self.max_concurrent_trends)
            .finish_non_exhaustive()
    }
}

impl TrendAnalyticsService {
    /// Build a service from validated configuration
    pub fn new(store: SharedTrendStore, config: &Config) -> Result<Self> {
        Ok(Self {
            store,
            calculator: WaveScoreCalculator::new(),
            detector: AnomalyDetector::new(config.analytics.anomaly.clone()),
            engine: Arc::new(ForecastEngine::new(&config.analytics.forecast)),
            generator: VariantGenerator::new(&config.analytics.variants)?,
            viral: ViralAnalyzer::new(config.analytics.viral.clone()),
            normalize: config.analytics.normalize.clone(),
            forecast: config.analytics.forecast.clone(),
            retry: config.retry(),
            io_timeout: config.io_timeout(),
            max_concurrent_trends: config.runner.max_concurrent_trends.max(1),
        })
    }

    /// Replace the score calculator (e.g. to inject a sentiment source)
    #[must_use]
    pub fn with_calculator(mut self, calculator: WaveScoreCalculator) -> Self {
        self.calculator = calculator;
        self
    }

    #[must_use]
    pub fn with_engine(mut self, engine: ForecastEngine) -> Self {
        self.engine = Arc::new(engine);
        self
    }

    #[must_use]
    pub fn store(&self) -> &SharedTrendStore {
        &self.store
    }

    /// Run a store call under the I/O deadline
    async fn timed<T, F>(&self, operation: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let result = match tokio::time::timeout(self.io_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(operation, self.io_timeout)),
        };
        if let Err(e) = &result {
            metrics::record_store_error(operation, e.category().as_str());
        }
        result
    }

    // ------------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------------

    /// Score observations at `now` and store the resulting points
    pub async fn ingest(
        &self,
        observations: &[RawObservation],
        now: DateTime<Utc>,
    ) -> Result<IngestReport> {
        let points = self.calculator.score_batch(observations, now);
        let trends = points
            .iter()
            .map(|p| p.trend_id.as_str())
            .collect::<BTreeSet<_>>()
            .len();

        let upserted = self
            .timed("upsert_score_points", self.store.upsert_score_points(&points))
            .await?;

        info!(
            observations = observations.len(),
            points = upserted,
            trends = trends,
            "Ingested observations"
        );

        Ok(IngestReport {
            observations: observations.len(),
            points_upserted: upserted,
            trends,
        })
    }

    // ------------------------------------------------------------------------
    // Exposed operations
    // ------------------------------------------------------------------------

    /// Detect and store anomalies for every trend active in `time_window`
    pub async fn detect_anomalies(&self, time_window: TimeRange) -> Result<Vec<Anomaly>> {
        if time_window.start > time_window.end {
            return Err(AnalyticsError::InvalidTimeRange(time_window.start, time_window.end).into());
        }

        let window = self
            .timed("query_window", self.store.query_window(time_window))
            .await?;

        let per_trend: Vec<Vec<Anomaly>> = stream::iter(&window)
            .map(|series| self.persist_anomalies(series))
            .buffered(self.max_concurrent_trends)
            .try_collect()
            .await?;
        let anomalies: Vec<Anomaly> = per_trend.into_iter().flatten().collect();

        info!(
            trends = window.len(),
            anomalies = anomalies.len(),
            "Anomaly detection complete"
        );
        Ok(anomalies)
    }

    /// Forecast one trend `horizon_hours` ahead from the history before `now`
    ///
    /// Returns `Ok(None)` (and stores nothing) when the trend has too little
    /// history.
    pub async fn generate_forecast(
        &self,
        trend_id: &str,
        horizon_hours: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<EnsembleForecast>> {
        if horizon_hours == 0 {
            return Err(AnalyticsError::InvalidHorizon(horizon_hours).into());
        }

        let history = TimeRange::trailing(now, self.history_window());
        let series = self
            .timed("query_series", self.store.query_series(trend_id, history))
            .await?;
        self.persist_forecast(&series, horizon_hours).await
    }

    /// Generate and store variants of `series`
    ///
    /// Peers for the performance comparison are loaded from the store when
    /// `options.peers` is empty.
    pub async fn generate_variants(
        &self,
        trend_id: &str,
        series: &TrendSeries,
        options: &VariantOptions,
    ) -> Result<Vec<Variant>> {
        if series.trend_id != trend_id {
            return Err(AnalyticsError::TrendMismatch {
                expected: trend_id.to_string(),
                actual: series.trend_id.clone(),
            }
            .into());
        }
        self.persist_variants(series, options).await
    }

    /// Rank every trend active in `time_window` by viral potential
    ///
    /// Alerts are raised for the top candidates; nothing is stored.
    pub async fn analyze_viral(
        &self,
        time_window: TimeRange,
        now: DateTime<Utc>,
    ) -> Result<ViralReport> {
        if time_window.start > time_window.end {
            return Err(AnalyticsError::InvalidTimeRange(time_window.start, time_window.end).into());
        }

        let window = self
            .timed("query_window", self.store.query_window(time_window))
            .await?;
        let report = self.viral.rank(&window, now);

        for alert in &report.alerts {
            metrics::record_viral_alert(alert.severity.as_str());
        }
        info!(
            trends = report.total_analyzed,
            candidates = report.viral_candidates,
            alerts = report.alerts.len(),
            "Viral analysis complete"
        );
        Ok(report)
    }

    /// The configured rolling normalization window ending at `now`
    #[must_use]
    pub fn normalization_window(&self, now: DateTime<Utc>) -> TimeRange {
        TimeRange::trailing(now, self.normalize.window.duration())
    }

    /// Normalize every point in `time_window` against its platform and
    /// category group, bin the results and store the bins
    ///
    /// Uses the configured bin size when `bin_size` is `None`.
    pub async fn normalize_window(
        &self,
        time_window: TimeRange,
        bin_size: Option<BinSize>,
    ) -> Result<Vec<TemporalBin>> {
        if time_window.start > time_window.end {
            return Err(AnalyticsError::InvalidTimeRange(time_window.start, time_window.end).into());
        }
        let bin_size = bin_size.unwrap_or(self.normalize.bin_size);

        let window = self
            .timed("query_window", self.store.query_window(time_window))
            .await?;
        if window.is_empty() {
            debug!("No points to normalize");
            metrics::record_insufficient_data("normalize");
            return Ok(Vec::new());
        }

        let bins = normalize_and_bin(&window, bin_size);
        let stored = self
            .timed("upsert_bins", self.store.upsert_bins(&bins))
            .await?;
        metrics::record_bins(bin_size.as_str(), stored);

        info!(
            trends = window.len(),
            bins = bins.len(),
            bin_size = bin_size.as_str(),
            "Normalization complete"
        );
        Ok(bins)
    }

    // ------------------------------------------------------------------------
    // Batch runner
    // ------------------------------------------------------------------------

    /// Derive anomalies, forecasts and variants for every trend active in
    /// `time_window`
    ///
    /// Trends run in parallel up to `max_concurrent_trends`. A failing trend
    /// is retried while its error is recoverable, then reported in
    /// [`BatchReport::failures`] without aborting the rest of the batch.
    pub async fn run_batch(
        &self,
        time_window: TimeRange,
        options: &BatchOptions,
    ) -> Result<BatchReport> {
        let started = Instant::now();
        if time_window.start > time_window.end {
            return Err(AnalyticsError::InvalidTimeRange(time_window.start, time_window.end).into());
        }

        let trend_ids: Vec<String> = self
            .timed("query_window", self.store.query_window(time_window))
            .await?
            .into_iter()
            .map(|series| series.trend_id)
            .collect();

        info!(
            trends = trend_ids.len(),
            max_concurrent = self.max_concurrent_trends,
            "Starting batch run"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_trends));
        let mut tasks = JoinSet::new();

        for trend_id in trend_ids {
            let service = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let options = options.clone();

            tasks.spawn(async move {
                let task_start = Instant::now();
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        with_retry(&service.retry, || {
                            service.derive_trend(&trend_id, time_window, &options)
                        })
                        .await
                    }
                    Err(_) => Err(Error::other("Batch semaphore closed")),
                };
                (trend_id, result, task_start.elapsed().as_secs_f64())
            });
        }

        let mut report = BatchReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(trend), elapsed)) => {
                    metrics::record_trend_result(true, elapsed);
                    report.absorb(&trend);
                }
                Ok((trend_id, Err(e), elapsed)) => {
                    metrics::record_trend_result(false, elapsed);
                    warn!(trend_id = %trend_id, error = %e, "Trend derivation failed");
                    report.fail(trend_id, e.to_string());
                }
                Err(e) => {
                    warn!(error = %e, "Trend task aborted");
                    report.fail(String::from("<unknown>"), e.to_string());
                }
            }
        }
        report.failures.sort_by(|a, b| a.trend_id.cmp(&b.trend_id));
        report.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            processed = report.trends_processed,
            failed = report.trends_failed,
            anomalies = report.anomalies_detected,
            forecasts = report.forecasts_generated,
            variants = report.variants_generated,
            duration_ms = report.duration_ms,
            "Batch run complete"
        );
        Ok(report)
    }

    /// All three derivations for one trend over a single snapshot
    async fn derive_trend(
        &self,
        trend_id: &str,
        time_window: TimeRange,
        options: &BatchOptions,
    ) -> Result<TrendReport> {
        let now = options.now;
        let history_start = time_window.start.min(now - self.history_window());
        let snapshot = self
            .timed(
                "query_series",
                self.store
                    .query_series(trend_id, TimeRange::new(history_start, time_window.end.max(now))),
            )
            .await?;

        let detection = snapshot.range(time_window.start, time_window.end);
        let history = snapshot.range(now - self.history_window(), now);
        let horizon = options.horizon_hours.unwrap_or(self.forecast.horizon_hours);
        let variant_options = VariantOptions::at(now).only(options.variant_types.iter().copied());

        let (anomalies, forecast, variants) = tokio::try_join!(
            self.persist_anomalies(&detection),
            self.persist_forecast(&history, horizon),
            self.persist_variants(&snapshot, &variant_options),
        )?;

        debug!(
            trend_id = %trend_id,
            anomalies = anomalies.len(),
            forecast = forecast.is_some(),
            variants = variants.len(),
            "Trend derived"
        );

        Ok(TrendReport {
            trend_id: trend_id.to_string(),
            anomalies: anomalies.len(),
            forecast_generated: forecast.is_some(),
            variants: variants.len(),
        })
    }

    // ------------------------------------------------------------------------
    // Derive + persist
    // ------------------------------------------------------------------------

    fn history_window(&self) -> Duration {
        Duration::hours(i64::from(self.forecast.history_window_hours))
    }

    async fn persist_anomalies(&self, series: &TrendSeries) -> Result<Vec<Anomaly>> {
        let anomalies = match self.detector.detect(series) {
            Ok(anomalies) => anomalies,
            Err(AnalyticsError::InsufficientData { needed, actual }) => {
                debug!(
                    trend_id = %series.trend_id,
                    needed = needed,
                    actual = actual,
                    "Skipping anomaly detection: insufficient data"
                );
                metrics::record_insufficient_data("anomaly");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        if !anomalies.is_empty() {
            self.timed("upsert_anomalies", self.store.upsert_anomalies(&anomalies))
                .await?;
            for anomaly in &anomalies {
                metrics::record_anomaly(anomaly.anomaly_type.as_str(), anomaly.severity.as_str());
            }
        }
        Ok(anomalies)
    }

    async fn persist_forecast(
        &self,
        series: &TrendSeries,
        horizon_hours: u32,
    ) -> Result<Option<EnsembleForecast>> {
        let Some(forecast) = self.engine.forecast(series, horizon_hours) else {
            metrics::record_forecast(false);
            if series.len() < self.engine.min_points() {
                metrics::record_insufficient_data("forecast");
            }
            return Ok(None);
        };

        self.timed("upsert_forecast", self.store.upsert_forecast(&forecast))
            .await?;
        metrics::record_forecast(true);
        Ok(Some(forecast))
    }

    async fn persist_variants(
        &self,
        series: &TrendSeries,
        options: &VariantOptions,
    ) -> Result<Vec<Variant>> {
        if series.is_empty() {
            metrics::record_insufficient_data("variants");
            return Ok(Vec::new());
        }

        let wants_peers = options.include.contains(&VariantType::Comparative)
            && options.peers.is_empty();
        let variants = match series.category().filter(|_| wants_peers) {
            Some(category) => {
                let window = TimeRange::trailing(options.now, self.generator.peer_window());
                let peers = self
                    .timed(
                        "query_peers",
                        self.store.query_peers(
                            category,
                            &series.trend_id,
                            window,
                            self.generator.max_peers(),
                        ),
                    )
                    .await?;
                let options = options.clone().with_peers(peers);
                self.generator.generate(series, &options)
            }
            None => self.generator.generate(series, options),
        };

        if !variants.is_empty() {
            self.timed("upsert_variants", self.store.upsert_variants(&variants))
                .await?;
            for variant_type in VariantType::ALL {
                let count = variants
                    .iter()
                    .filter(|v| v.variant_type == variant_type)
                    .count();
                metrics::record_variants(variant_type.as_str(), count);
            }
        }
        Ok(variants)
    }
}
