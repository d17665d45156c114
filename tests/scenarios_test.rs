//! End-to-end reference scenarios over the public analytics API

mod common;

use chrono::Duration;
use wavescope::analytics::baseline::{percentile_rank, ranking, BaselineStatistics};
use wavescope::analytics::forecast::LinearRegressionModel;
use wavescope::analytics::{
    AnalyticsError, AnomalyDetector, AnomalyType, ForecastConfig, ForecastEngine, ForecastModel,
    RiskFactor, Severity, VariantGenerator, VariantOptions, VariantPayload, VariantType,
    ViralAnalyzer,
};
use wavescope::models::{RawMetrics, ScorePoint, TrendSeries};
use wavescope::utils::round2;

use common::{base_time, hourly_points, hourly_series, last_hour};

#[test]
fn test_scenario_a_single_spike() {
    let series = hourly_series("a", &[50.0, 50.0, 50.0, 95.0, 50.0]);

    let stats = BaselineStatistics::from_series(&series).unwrap();
    assert!((stats.mean - 59.0).abs() < 1e-9);
    assert!((stats.stddev - 18.0).abs() < 1e-9);

    let anomalies = AnomalyDetector::default().detect(&series).unwrap();
    assert_eq!(anomalies.len(), 1);

    let spike = &anomalies[0];
    assert_eq!(spike.anomaly_type, AnomalyType::Spike);
    assert_eq!(spike.detection_timestamp, base_time() + Duration::hours(3));
    assert!(spike.severity >= Severity::Medium);
    assert_eq!(spike.baseline_value, 50.0);
    assert_eq!(spike.anomaly_value, 95.0);
    assert_eq!(spike.duration_minutes, 60);
}

#[test]
fn test_scenario_b_linear_growth() {
    let scores: Vec<f64> = (0..10).map(|i| 50.0 + 2.0 * f64::from(i)).collect();
    let series = hourly_series("b", &scores);

    let linear = LinearRegressionModel.forecast(&series, 5).unwrap();
    let fifth = &linear.predictions[4];
    assert_eq!(fifth.hours_ahead, 5);
    assert!((fifth.predicted_value - 78.0).abs() < 1e-6);
    assert!((fifth.confidence_upper - fifth.confidence_lower).abs() < 1e-6);
    assert!((linear.model_accuracy - 1.0).abs() < 1e-9);

    let ensemble = ForecastEngine::new(&ForecastConfig::default())
        .forecast(&series, 5)
        .unwrap();
    assert_eq!(ensemble.forecast_origin, last_hour(10));
    assert_eq!(ensemble.predictions.len(), 5);
    let weights: f64 = ensemble.model_weights.values().sum();
    assert!((weights - 1.0).abs() < 1e-6);
    assert_eq!(
        ensemble.prediction_at(5).unwrap().timestamp,
        last_hour(10) + Duration::hours(5)
    );
}

#[test]
fn test_scenario_c_insufficient_data() {
    let series = hourly_series("c", &[40.0, 41.0, 42.0]);

    let err = BaselineStatistics::from_series(&series).unwrap_err();
    assert!(matches!(
        err,
        AnalyticsError::InsufficientData {
            needed: 5,
            actual: 3
        }
    ));
    assert!(AnomalyDetector::default().detect(&series).is_err());
    assert!(ForecastEngine::new(&ForecastConfig::default())
        .forecast(&series, 24)
        .is_none());
}

#[test]
fn test_scenario_d_peer_comparison() {
    assert_eq!(round2(percentile_rank(60.0, &[40.0, 60.0, 80.0])), 66.67);
    assert_eq!(ranking(60.0, &[40.0, 60.0, 80.0]), 2);

    let series = TrendSeries::from_points("me", hourly_points("me", "Music", "youtube", &[30.0, 60.0]));
    let peers: Vec<TrendSeries> = [("p1", 40.0), ("p2", 60.0), ("p3", 80.0)]
        .into_iter()
        .map(|(id, max)| TrendSeries::from_points(id, hourly_points(id, "Music", "youtube", &[max])))
        .collect();

    let options = VariantOptions::at(last_hour(2))
        .with_peers(peers)
        .only([VariantType::Comparative]);
    let variants = VariantGenerator::default().generate(&series, &options);
    assert_eq!(variants.len(), 1);

    let VariantPayload::Performance(perf) = &variants[0].payload else {
        panic!("expected a performance comparison");
    };
    assert_eq!(perf.wave_score_percentile, 66.67);
    assert_eq!(perf.wave_score_ranking, 2);
    assert_eq!(perf.category, "Music");
}

#[test]
fn test_percentile_against_only_itself() {
    assert_eq!(percentile_rank(42.0, &[42.0]), 100.0);
    assert_eq!(ranking(42.0, &[42.0]), 1);
}

fn published(trend: &str, age_hours: i64, hashtags: &[&str]) -> TrendSeries {
    let observed = base_time();
    let point = ScorePoint::new(trend, observed, 50.0)
        .with_metrics(RawMetrics::new(100_000, 10_000, 20, 10))
        .with_published_at(observed - Duration::hours(age_hours))
        .with_hashtags(hashtags.iter().copied());
    TrendSeries::from_points(trend, vec![point])
}

#[test]
fn test_scenario_e_viral_ranking() {
    let many: Vec<String> = (0..11).map(|i| format!("#tag{i}")).collect();
    let many: Vec<&str> = many.iter().map(String::as_str).collect();
    let series = vec![
        published("stale", 100, &[]),
        published("fresh", 1, &many),
    ];

    let report = ViralAnalyzer::default().rank(&series, base_time());
    assert_eq!(report.total_analyzed, 2);

    // every component saturates, less one hour of decay
    let fresh = &report.trends[0];
    assert_eq!(fresh.trend_id, "fresh");
    assert_eq!(fresh.viral_score, 98.0);
    assert!(fresh.prediction.risk_factors.contains(&RiskFactor::OverHashtagged));

    // rates spread over 100 hours and recency floored
    let stale = &report.trends[1];
    assert_eq!(stale.growth.recency_multiplier, 0.1);
    assert_eq!(stale.viral_score, 2.0);

    assert_eq!(report.viral_candidates, 1);
    assert_eq!(report.alerts.len(), 1);
    assert_eq!(report.alerts[0].severity, Severity::Critical);
    assert_eq!(
        report.alerts[0].id,
        format!("viral_fresh_{}", base_time().timestamp_millis())
    );
}
