//! End-to-end pipeline integration tests
//!
//! Tests the complete workflow against every store backend:
//! 1. Observation ingestion and scoring
//! 2. Anomaly detection, forecasting and variant generation
//! 3. Artifact storage and idempotent re-runs
//! 4. Viral ranking and normalized bins

use chrono::{DateTime, Duration, TimeZone, Utc};
use wavescope::analytics::{
    AnomalyType, BinSize, RiskFactor, Severity, TrendDirection, VariantOptions, VariantType,
};
use wavescope::models::{Platform, RawObservation, TimeRange};
use wavescope::pipeline::{BatchOptions, TrendAnalyticsService};
use wavescope::storage::SharedTrendStore;

use super::fixtures::{oscillating_scores, rising_scores, SAMPLE_OBSERVATIONS_JSON};
use crate::common::{fast_config, hourly_points, last_hour, test_stores};

async fn seed(store: &SharedTrendStore) {
    store
        .upsert_score_points(&hourly_points("osc", "Music", "youtube", &oscillating_scores(12)))
        .await
        .unwrap();
    store
        .upsert_score_points(&hourly_points("rise", "Music", "tiktok", &rising_scores(12)))
        .await
        .unwrap();
    store
        .upsert_score_points(&hourly_points("tiny", "Music", "youtube", &[30.0, 31.0, 32.0]))
        .await
        .unwrap();
}

fn service(store: SharedTrendStore) -> TrendAnalyticsService {
    TrendAnalyticsService::new(store, &fast_config()).unwrap()
}

// ============================================================================
// Ingestion
// ============================================================================

#[tokio::test]
async fn test_ingest_sample_observations() {
    let observations: Vec<RawObservation> = serde_json::from_str(SAMPLE_OBSERVATIONS_JSON).unwrap();
    assert_eq!(observations.len(), 4);
    assert_eq!(observations[0].platform_source, Platform::Youtube);
    assert_eq!(observations[1].metrics.views, 18_000);
    assert_eq!(observations[1].metrics.comments, 0);
    assert_eq!(observations[2].metrics.comments, 0);
    assert_eq!(observations[3].trend_id(), "reddit_post-9");

    let now: DateTime<Utc> = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
    let (_dir, stores) = test_stores();
    for (backend, store) in stores {
        let report = service(store.clone()).ingest(&observations, now).await.unwrap();
        assert_eq!(report.observations, 4, "{backend}");
        assert_eq!(report.points_upserted, 4, "{backend}");
        assert_eq!(report.trends, 2, "{backend}");

        let series = store
            .query_series("dance-challenge", TimeRange::trailing(now, Duration::hours(24)))
            .await
            .unwrap();
        assert_eq!(series.len(), 3, "{backend}");
        for point in series.iter() {
            assert!((0.0..=100.0).contains(&point.wave_score), "{backend}");
            assert!((0.3..=1.0).contains(&point.confidence), "{backend}");
            assert!(point.components.is_some(), "{backend}");
        }
    }
}

// ============================================================================
// Batch runs
// ============================================================================

#[tokio::test]
async fn test_run_batch_end_to_end() {
    let now = last_hour(12);
    let window = TimeRange::trailing(now, Duration::hours(24));
    let (_dir, stores) = test_stores();

    for (backend, store) in stores {
        seed(&store).await;
        let report = service(store.clone())
            .run_batch(window, &BatchOptions::at(now).with_horizon(6))
            .await
            .unwrap();

        assert_eq!(report.trends_processed, 3, "{backend}");
        assert_eq!(report.trends_failed, 0, "{backend}");
        assert_eq!(report.forecasts_generated, 2, "{backend}");
        assert_eq!(report.forecasts_skipped, 1, "{backend}");
        assert!(report.anomalies_detected > 0, "{backend}");

        let osc = store.anomalies_for("osc").await.unwrap();
        assert!(osc.iter().any(|a| a.anomaly_type == AnomalyType::UnusualPattern), "{backend}");
        assert!(store.anomalies_for("rise").await.unwrap().is_empty(), "{backend}");

        // too short for a baseline or a forecast
        assert!(store.anomalies_for("tiny").await.unwrap().is_empty(), "{backend}");
        assert!(store.forecasts_for("tiny").await.unwrap().is_empty(), "{backend}");
        assert!(!store.variants_for("tiny").await.unwrap().is_empty(), "{backend}");

        let forecasts = store.forecasts_for("rise").await.unwrap();
        assert_eq!(forecasts.len(), 1, "{backend}");
        assert_eq!(forecasts[0].horizon_hours, 6, "{backend}");
        assert_eq!(forecasts[0].forecast_origin, now, "{backend}");

        let variants = store.variants_for("osc").await.unwrap();
        assert!(
            variants.iter().any(|v| v.variant_name == "performance_comparison"),
            "{backend}"
        );
    }
}

#[tokio::test]
async fn test_batch_rerun_is_idempotent() {
    let now = last_hour(12);
    let window = TimeRange::trailing(now, Duration::hours(24));
    let (_dir, stores) = test_stores();

    for (backend, store) in stores {
        seed(&store).await;
        let service = service(store.clone());

        let first = service.run_batch(window, &BatchOptions::at(now)).await.unwrap();
        let anomalies = store.anomalies_for("osc").await.unwrap();
        let variants = store.variants_for("osc").await.unwrap();

        let second = service.run_batch(window, &BatchOptions::at(now)).await.unwrap();
        assert_eq!(first.anomalies_detected, second.anomalies_detected, "{backend}");
        assert_eq!(store.anomalies_for("osc").await.unwrap(), anomalies, "{backend}");
        assert_eq!(store.variants_for("osc").await.unwrap().len(), variants.len(), "{backend}");
        assert_eq!(store.forecasts_for("osc").await.unwrap().len(), 1, "{backend}");
    }
}

// ============================================================================
// Individual operations
// ============================================================================

#[tokio::test]
async fn test_generate_forecast_operation() {
    let now = last_hour(12);
    let (_dir, stores) = test_stores();

    for (backend, store) in stores {
        seed(&store).await;
        let service = service(store.clone());

        let forecast = service.generate_forecast("rise", 12, now).await.unwrap().unwrap();
        assert_eq!(forecast.predictions.len(), 12, "{backend}");
        for p in &forecast.predictions {
            assert!(p.confidence_lower <= p.predicted_value, "{backend}");
            assert!(p.predicted_value <= p.confidence_upper, "{backend}");
        }
        assert_eq!(store.forecasts_for("rise").await.unwrap().len(), 1, "{backend}");

        assert!(service.generate_forecast("tiny", 12, now).await.unwrap().is_none());
        assert!(store.forecasts_for("tiny").await.unwrap().is_empty(), "{backend}");
    }
}

#[tokio::test]
async fn test_generate_variants_loads_peers() {
    let now = last_hour(12);
    let (_dir, stores) = test_stores();

    for (backend, store) in stores {
        seed(&store).await;
        let service = service(store.clone());
        let series = store
            .query_series("rise", TimeRange::trailing(now, Duration::days(30)))
            .await
            .unwrap();

        let options = VariantOptions::at(now).only([VariantType::Comparative]);
        let variants = service.generate_variants("rise", &series, &options).await.unwrap();
        assert_eq!(variants.len(), 1, "{backend}");
        assert_eq!(variants[0].variant_name, "performance_comparison", "{backend}");

        let stored: Vec<_> = store
            .variants_for("rise")
            .await
            .unwrap()
            .iter()
            .map(|v| v.key())
            .collect();
        assert_eq!(stored, vec![variants[0].key()], "{backend}");
    }
}

#[tokio::test]
async fn test_detect_anomalies_operation() {
    let now = last_hour(12);
    let (_dir, stores) = test_stores();

    for (backend, store) in stores {
        seed(&store).await;
        let anomalies = service(store.clone())
            .detect_anomalies(TimeRange::trailing(now, Duration::hours(24)))
            .await
            .unwrap();

        assert!(!anomalies.is_empty(), "{backend}");
        assert!(anomalies.iter().all(|a| a.trend_id == "osc"), "{backend}");
        for a in &anomalies {
            assert!((0.0..=100.0).contains(&a.anomaly_score), "{backend}");
            assert!((0.0..=1.0).contains(&a.confidence), "{backend}");
        }
        assert_eq!(store.anomalies_for("osc").await.unwrap().len(), anomalies.len());
    }
}

// ============================================================================
// Viral ranking and normalization
// ============================================================================

#[tokio::test]
async fn test_analyze_viral_after_ingest() {
    let observations: Vec<RawObservation> = serde_json::from_str(SAMPLE_OBSERVATIONS_JSON).unwrap();
    let now: DateTime<Utc> = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
    let (_dir, stores) = test_stores();

    for (backend, store) in stores {
        let service = service(store.clone());
        service.ingest(&observations, now).await.unwrap();
        let report = service
            .analyze_viral(TimeRange::trailing(now, Duration::hours(24)), now)
            .await
            .unwrap();

        assert_eq!(report.total_analyzed, 2, "{backend}");
        assert_eq!(report.viral_candidates, 0, "{backend}");
        assert!(report.alerts.is_empty(), "{backend}");

        // clip-77 measured against the 07:00 reading of vid-001
        let dance = &report.trends[0];
        assert_eq!(dance.trend_id, "dance-challenge", "{backend}");
        assert_eq!(dance.observed_at, now - Duration::hours(1), "{backend}");
        assert_eq!(dance.growth.view_velocity, 32_000.0, "{backend}");
        assert_eq!(dance.growth.age_hours, Some(3.0), "{backend}");
        assert_eq!(dance.viral_score, 59.0, "{backend}");
        assert_eq!(dance.prediction.direction, TrendDirection::Rising, "{backend}");
        assert_eq!(dance.prediction.predicted_peak_hours, 21.0, "{backend}");
        assert!(dance.prediction.risk_factors.contains(&RiskFactor::SaturatedHashtags));
        assert!(dance.prediction.risk_factors.contains(&RiskFactor::SuspiciousEngagement));

        let post = &report.trends[1];
        assert_eq!(post.trend_id, "reddit_post-9", "{backend}");
        assert_eq!(post.viral_score, 0.0, "{backend}");
        assert_eq!(post.growth.recency_multiplier, 1.0, "{backend}");
    }
}

#[tokio::test]
async fn test_viral_alerts_with_lowered_threshold() {
    let observations: Vec<RawObservation> = serde_json::from_str(SAMPLE_OBSERVATIONS_JSON).unwrap();
    let now: DateTime<Utc> = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
    let mut config = fast_config();
    config.analytics.viral.alert_score = 50.0;
    let service = TrendAnalyticsService::new(
        wavescope::storage::create_memory_store(),
        &config,
    )
    .unwrap();
    service.ingest(&observations, now).await.unwrap();

    let report = service
        .analyze_viral(TimeRange::trailing(now, Duration::hours(24)), now)
        .await
        .unwrap();
    assert_eq!(report.viral_candidates, 1);
    assert_eq!(report.alerts.len(), 1);
    assert_eq!(report.alerts[0].trend_id, "dance-challenge");
    // severity follows the score, not the configured threshold
    assert_eq!(report.alerts[0].severity, Severity::Low);
}

#[tokio::test]
async fn test_normalize_window_across_backends() {
    let now = last_hour(12);
    let window = TimeRange::trailing(now, Duration::hours(24));
    let (_dir, stores) = test_stores();

    for (backend, store) in stores {
        seed(&store).await;
        let service = service(store.clone());

        let bins = service.normalize_window(window, Some(BinSize::Hourly)).await.unwrap();
        // youtube holds osc and tiny for the first three hours, tiktok holds rise
        assert_eq!(bins.len(), 24, "{backend}");
        let first_youtube = bins
            .iter()
            .find(|b| b.platform_source == Platform::Youtube)
            .unwrap();
        assert_eq!(first_youtube.point_count, 2, "{backend}");
        for bin in &bins {
            assert!((0.0..=100.0).contains(&bin.avg_normalized_score), "{backend}");
            assert!(bin.max_normalized_score >= bin.avg_normalized_score, "{backend}");
        }

        let stored = store
            .query_bins(window, Some(&Platform::Tiktok), Some("Music"))
            .await
            .unwrap();
        assert_eq!(stored.len(), 12, "{backend}");

        service.normalize_window(window, Some(BinSize::Hourly)).await.unwrap();
        assert_eq!(store.query_bins(window, None, None).await.unwrap().len(), 24, "{backend}");
    }
}
