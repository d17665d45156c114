//! Common test utilities

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use wavescope::config::{Config, StorageBackend};
use wavescope::models::{RawMetrics, RawObservation, ScorePoint, TrendSeries};
use wavescope::storage::{create_memory_store, create_sqlite_store, SharedTrendStore};

/// Fixed reference time shared by the fixtures
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
}

/// Hourly points starting at `base_time()`
pub fn hourly_points(trend: &str, category: &str, platform: &str, scores: &[f64]) -> Vec<ScorePoint> {
    scores
        .iter()
        .enumerate()
        .map(|(i, score)| {
            ScorePoint::new(trend, base_time() + Duration::hours(i as i64), *score)
                .with_category(category)
                .with_platform(platform)
                .with_metrics(RawMetrics::new(1_000 * (i as u64 + 1), 50, 5, 2))
        })
        .collect()
}

/// Hourly series starting at `base_time()`
pub fn hourly_series(trend: &str, scores: &[f64]) -> TrendSeries {
    TrendSeries::from_points(trend, hourly_points(trend, "Music", "youtube", scores))
}

/// Time of the last point of an hourly fixture with `n` points
pub fn last_hour(n: usize) -> DateTime<Utc> {
    base_time() + Duration::hours(n as i64 - 1)
}

/// An observation published `age_hours` before `observed_at`
pub fn observation(
    content_id: &str,
    category: &str,
    metrics: RawMetrics,
    observed_at: DateTime<Utc>,
    age_hours: i64,
) -> RawObservation {
    RawObservation {
        content_id: content_id.to_string(),
        trend_id: None,
        platform_source: "youtube".into(),
        category: category.to_string(),
        published_at: Some(observed_at - Duration::hours(age_hours)),
        observed_at,
        metrics,
        hashtags: Vec::new(),
    }
}

/// Config with near-zero retry delays and an in-memory backend
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.storage.backend = StorageBackend::Memory;
    config.runner.retry_base_delay_ms = 1;
    config.runner.retry_max_delay_ms = 2;
    config
}

/// One store of each backend; keep the returned directory alive while testing
pub fn test_stores() -> (tempfile::TempDir, Vec<(&'static str, SharedTrendStore)>) {
    let dir = tempfile::tempdir().unwrap();
    let sqlite = create_sqlite_store(dir.path().join("trends.db")).unwrap();
    (
        dir,
        vec![("memory", create_memory_store()), ("sqlite", sqlite)],
    )
}
