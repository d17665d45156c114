//! Error scenario integration tests
//!
//! Tests various failure modes and error handling:
//! 1. Store deadlines
//! 2. Transient store failures and retry logic
//! 3. Exhausted retries isolated to one trend
//! 4. Invalid inputs

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::Duration;
use wavescope::analytics::{Anomaly, AnalyticsError, EnsembleForecast, TemporalBin, Variant};
use wavescope::error::{Error, ErrorCategory, Result, WaveErrorTrait};
use wavescope::models::{Platform, RawObservation, ScorePoint, TimeRange, TrendSeries};
use wavescope::pipeline::{BatchOptions, TrendAnalyticsService};
use wavescope::storage::{create_memory_store, MemoryTrendStore, SharedTrendStore, TrendStore};

use super::fixtures::{oscillating_scores, rising_scores};
use crate::common::{fast_config, hourly_points, last_hour};

// ============================================================================
// Slow store
// ============================================================================

/// Delegating store that stalls selected reads
struct SlowStore {
    inner: SharedTrendStore,
    slow_window: bool,
    slow_series: bool,
    delay: StdDuration,
}

impl SlowStore {
    fn new(inner: SharedTrendStore, delay: StdDuration) -> Self {
        Self {
            inner,
            slow_window: false,
            slow_series: false,
            delay,
        }
    }

    async fn stall(&self, enabled: bool) {
        if enabled {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl TrendStore for SlowStore {
    async fn upsert_score_points(&self, points: &[ScorePoint]) -> Result<usize> {
        self.inner.upsert_score_points(points).await
    }

    async fn query_series(&self, trend_id: &str, range: TimeRange) -> Result<TrendSeries> {
        self.stall(self.slow_series).await;
        self.inner.query_series(trend_id, range).await
    }

    async fn query_window(&self, range: TimeRange) -> Result<Vec<TrendSeries>> {
        self.stall(self.slow_window).await;
        self.inner.query_window(range).await
    }

    async fn query_peers(
        &self,
        category: &str,
        exclude_trend_id: &str,
        range: TimeRange,
        limit: usize,
    ) -> Result<Vec<TrendSeries>> {
        self.inner
            .query_peers(category, exclude_trend_id, range, limit)
            .await
    }

    async fn upsert_anomalies(&self, anomalies: &[Anomaly]) -> Result<usize> {
        self.inner.upsert_anomalies(anomalies).await
    }

    async fn upsert_forecast(&self, forecast: &EnsembleForecast) -> Result<()> {
        self.inner.upsert_forecast(forecast).await
    }

    async fn upsert_variants(&self, variants: &[Variant]) -> Result<usize> {
        self.inner.upsert_variants(variants).await
    }

    async fn anomalies_for(&self, trend_id: &str) -> Result<Vec<Anomaly>> {
        self.inner.anomalies_for(trend_id).await
    }

    async fn forecasts_for(&self, trend_id: &str) -> Result<Vec<EnsembleForecast>> {
        self.inner.forecasts_for(trend_id).await
    }

    async fn variants_for(&self, trend_id: &str) -> Result<Vec<Variant>> {
        self.inner.variants_for(trend_id).await
    }

    async fn upsert_bins(&self, bins: &[TemporalBin]) -> Result<usize> {
        self.inner.upsert_bins(bins).await
    }

    async fn query_bins(
        &self,
        range: TimeRange,
        platform: Option<&Platform>,
        category: Option<&str>,
    ) -> Result<Vec<TemporalBin>> {
        self.inner.query_bins(range, platform, category).await
    }
}

async fn seeded_memory() -> Arc<MemoryTrendStore> {
    let store = Arc::new(MemoryTrendStore::new());
    store
        .upsert_score_points(&hourly_points("osc", "Music", "youtube", &oscillating_scores(12)))
        .await
        .unwrap();
    store
        .upsert_score_points(&hourly_points("rise", "Music", "tiktok", &rising_scores(12)))
        .await
        .unwrap();
    store
}

fn window() -> TimeRange {
    TimeRange::trailing(last_hour(12), Duration::hours(24))
}

// ============================================================================
// Deadline Tests
// ============================================================================

#[tokio::test]
async fn test_slow_window_query_times_out() {
    let inner: SharedTrendStore = seeded_memory().await;
    let mut slow = SlowStore::new(inner, StdDuration::from_millis(500));
    slow.slow_window = true;

    let mut config = fast_config();
    config.runner.io_timeout_ms = 20;
    let service = TrendAnalyticsService::new(Arc::new(slow), &config).unwrap();

    let err = service.detect_anomalies(window()).await.unwrap_err();
    assert!(matches!(err, Error::Timeout { ref operation, timeout_ms: 20 } if operation == "query_window"));
    assert!(err.is_recoverable());
    assert_eq!(err.category(), ErrorCategory::Timeout);
}

#[tokio::test]
async fn test_batch_reports_trends_whose_reads_time_out() {
    let inner: SharedTrendStore = seeded_memory().await;
    let mut slow = SlowStore::new(inner.clone(), StdDuration::from_millis(300));
    slow.slow_series = true;

    let mut config = fast_config();
    config.runner.io_timeout_ms = 20;
    config.runner.max_retries = 1;
    let service = TrendAnalyticsService::new(Arc::new(slow), &config).unwrap();

    let report = service
        .run_batch(window(), &BatchOptions::at(last_hour(12)))
        .await
        .unwrap();

    assert_eq!(report.trends_processed, 0);
    assert_eq!(report.trends_failed, 2);
    let failed: Vec<&str> = report.failures.iter().map(|f| f.trend_id.as_str()).collect();
    assert_eq!(failed, vec!["osc", "rise"]);
    assert!(report.failures.iter().all(|f| f.error.contains("timed out")));

    // nothing was derived from a snapshot that never loaded
    assert!(inner.anomalies_for("osc").await.unwrap().is_empty());
    assert!(inner.forecasts_for("rise").await.unwrap().is_empty());
}

// ============================================================================
// Transient Failure Tests
// ============================================================================

#[tokio::test]
async fn test_transient_write_failures_are_retried() {
    let store = seeded_memory().await;
    let service = TrendAnalyticsService::new(store.clone(), &fast_config()).unwrap();

    store.inject_failures("upsert_forecast", 2);
    let report = service
        .run_batch(window(), &BatchOptions::at(last_hour(12)))
        .await
        .unwrap();

    assert_eq!(report.trends_processed, 2);
    assert_eq!(report.trends_failed, 0);
    assert_eq!(report.forecasts_generated, 2);
    assert_eq!(store.forecasts_for("osc").await.unwrap().len(), 1);
    assert_eq!(store.forecasts_for("rise").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_exhausted_retries_fail_only_that_trend() {
    let store = seeded_memory().await;
    let mut config = fast_config();
    config.runner.max_retries = 2;
    let service = TrendAnalyticsService::new(store.clone(), &config).unwrap();

    // "osc" is the only trend with anomalies to write
    store.inject_failures("upsert_anomalies", 10);
    let report = service
        .run_batch(window(), &BatchOptions::at(last_hour(12)))
        .await
        .unwrap();

    assert_eq!(report.trends_processed, 1);
    assert_eq!(report.trends_failed, 1);
    assert_eq!(report.failures[0].trend_id, "osc");
    assert!(report.failures[0].error.contains("injected failure in upsert_anomalies"));
    assert_eq!(store.forecasts_for("rise").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_direct_operations_surface_store_errors() {
    let store = seeded_memory().await;
    let service = TrendAnalyticsService::new(store.clone(), &fast_config()).unwrap();

    store.inject_failures("query_window", 1);
    let err = service.detect_anomalies(window()).await.unwrap_err();
    assert!(err.is_recoverable());
    assert_eq!(err.category(), ErrorCategory::Storage);

    // the failure is consumed; the next call succeeds
    assert!(!service.detect_anomalies(window()).await.unwrap().is_empty());
}

// ============================================================================
// Invalid Input Tests
// ============================================================================

#[tokio::test]
async fn test_invalid_inputs_are_rejected() {
    let service = TrendAnalyticsService::new(create_memory_store(), &fast_config()).unwrap();
    let now = last_hour(12);

    let inverted = TimeRange::new(now, now - Duration::hours(1));
    let err = service.detect_anomalies(inverted).await.unwrap_err();
    assert!(matches!(err, Error::Analytics(AnalyticsError::InvalidTimeRange(..))));
    assert!(!err.is_recoverable());

    let err = service.generate_forecast("osc", 0, now).await.unwrap_err();
    assert!(matches!(err, Error::Analytics(AnalyticsError::InvalidHorizon(0))));
    assert_eq!(err.category(), ErrorCategory::Analytics);
}

#[test]
fn test_observation_without_timestamp_is_rejected() {
    let json = r#"[{"content_id": "x", "platform_source": "youtube", "metrics": {"views": 1}}]"#;
    let err = serde_json::from_str::<Vec<RawObservation>>(json).unwrap_err();
    assert!(err.to_string().contains("observed_at"));
}
