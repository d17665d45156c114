//! Statistical anomaly detection over a trend's WaveScore series
//!
//! Each adjacent pair of points is checked for spikes and drops using
//! the series baseline (z-score) and the step growth rate. The whole
//! series is additionally checked for unusual volatility or oscillation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::baseline::{oscillation_ratio, BaselineStatistics};
use super::AnalyticsResult;
use crate::models::{Platform, ScorePoint, TrendSeries};

/// Guard for growth-rate division when the previous score is (near) zero
const RATE_EPSILON: f64 = 1e-9;

/// Kind of anomaly
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    Spike,
    Drop,
    UnusualPattern,
}

impl AnomalyType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spike => "spike",
            Self::Drop => "drop",
            Self::UnusualPattern => "unusual_pattern",
        }
    }
}

impl std::str::FromStr for AnomalyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spike" => Ok(Self::Spike),
            "drop" => Ok(Self::Drop),
            "unusual_pattern" => Ok(Self::UnusualPattern),
            other => Err(format!("unknown anomaly type: {other}")),
        }
    }
}

/// Anomaly severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Detection details, tagged by the kind of anomaly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnomalyMetadata {
    Spike {
        /// `None` when the baseline had no spread
        z_score: Option<f64>,
        growth_rate: f64,
        statistical_spike: bool,
        rapid_growth: bool,
        baseline_mean: f64,
        baseline_std: f64,
    },
    Drop {
        z_score: Option<f64>,
        decline_rate: f64,
        statistical_drop: bool,
        rapid_decline: bool,
        baseline_mean: f64,
        baseline_std: f64,
    },
    Pattern {
        volatility: Option<f64>,
        oscillation_ratio: Option<f64>,
        data_points: usize,
    },
}

/// A detected anomaly, keyed by `(trend_id, detection_timestamp, anomaly_type)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub trend_id: String,
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    /// 0..=100
    pub anomaly_score: f64,
    pub baseline_value: f64,
    pub anomaly_value: f64,
    pub threshold_exceeded: f64,
    /// 0..=1
    pub confidence: f64,
    pub probable_causes: Vec<String>,
    pub detection_timestamp: DateTime<Utc>,
    pub duration_minutes: i64,
    pub detection_method: String,
    pub metadata: AnomalyMetadata,
}

impl Anomaly {
    /// Upsert key
    #[must_use]
    pub fn key(&self) -> (String, DateTime<Utc>, AnomalyType) {
        (
            self.trend_id.clone(),
            self.detection_timestamp,
            self.anomaly_type,
        )
    }
}

/// Tunable detection thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyThresholds {
    /// z-score above which a point is a statistical spike
    pub spike_z_score: f64,
    /// Growth rate that counts as rapid growth
    pub spike_growth_rate: f64,
    /// Rapid growth only counts as a spike above this score
    pub spike_min_score: f64,
    /// z-score below which a point is a statistical drop (negative)
    pub drop_z_score: f64,
    /// Decline rate that counts as rapid decline (negative)
    pub drop_decline_rate: f64,
    /// Rapid decline only counts from above this previous score...
    pub drop_prev_min: f64,
    /// ...to below this current score
    pub drop_curr_max: f64,
    /// Series stddev above which the series is unusually volatile
    pub volatility: f64,
    /// Direction-change ratio above which the series oscillates
    pub oscillation: f64,
    /// Minimum points for pattern analysis
    pub min_pattern_points: usize,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            spike_z_score: 2.5,
            spike_growth_rate: 0.5,
            spike_min_score: 80.0,
            drop_z_score: -2.0,
            drop_decline_rate: -0.4,
            drop_prev_min: 60.0,
            drop_curr_max: 40.0,
            volatility: 30.0,
            oscillation: 0.7,
            min_pattern_points: 10,
        }
    }
}

/// Spike / drop / pattern detector
#[derive(Debug, Clone, Default)]
pub struct AnomalyDetector {
    thresholds: AnomalyThresholds,
}

impl AnomalyDetector {
    /// Create a detector with the given thresholds
    #[must_use]
    pub fn new(thresholds: AnomalyThresholds) -> Self {
        Self { thresholds }
    }

    #[must_use]
    pub fn thresholds(&self) -> &AnomalyThresholds {
        &self.thresholds
    }

    /// Detect every anomaly in a series
    ///
    /// # Returns
    /// Anomalies in chronological order (spikes before drops at the same
    /// timestamp, pattern last), or `InsufficientData` when the series is
    /// too short for a baseline.
    pub fn detect(&self, series: &TrendSeries) -> AnalyticsResult<Vec<Anomaly>> {
        let baseline = BaselineStatistics::from_series(series)?;
        let points = series.points();

        let mut anomalies = Vec::new();
        for pair in points.windows(2) {
            let (prev, curr) = (pair[0], pair[1]);
            if let Some(spike) = self.check_spike(prev, curr, &baseline) {
                anomalies.push(spike);
            }
            if let Some(drop) = self.check_drop(prev, curr, &baseline) {
                anomalies.push(drop);
            }
        }

        if let Some(pattern) = self.check_unusual_pattern(series, &baseline) {
            anomalies.push(pattern);
        }

        Ok(anomalies)
    }

    fn check_spike(
        &self,
        prev: &ScorePoint,
        curr: &ScorePoint,
        baseline: &BaselineStatistics,
    ) -> Option<Anomaly> {
        let t = &self.thresholds;
        let z = baseline.z_score(curr.wave_score);
        let rate = growth_rate(prev.wave_score, curr.wave_score);

        let statistical_spike = z.is_some_and(|z| z > t.spike_z_score);
        let rapid_growth = rate > t.spike_growth_rate;
        if !(statistical_spike || (rapid_growth && curr.wave_score > t.spike_min_score)) {
            return None;
        }

        let z_val = z.unwrap_or(0.0);
        let mut causes = Vec::new();
        if rate > 0.8 {
            causes.push("viral_acceleration");
        }
        if z_val > 3.0 {
            causes.push("statistical_outlier");
        }
        match curr.platform_source {
            Platform::Tiktok => causes.push("tiktok_algorithm_boost"),
            Platform::Youtube => causes.push("youtube_trending"),
            _ => {}
        }
        causes.extend(["possible_external_event", "influencer_mention", "news_coverage"]);

        Some(Anomaly {
            trend_id: curr.trend_id.clone(),
            anomaly_type: AnomalyType::Spike,
            severity: spike_severity(z_val, rate, curr.wave_score),
            anomaly_score: anomaly_score(z_val, rate),
            baseline_value: prev.wave_score,
            anomaly_value: curr.wave_score,
            threshold_exceeded: z_val,
            confidence: pair_confidence(z_val, rate),
            probable_causes: causes.into_iter().map(String::from).collect(),
            detection_timestamp: curr.timestamp,
            duration_minutes: (curr.timestamp - prev.timestamp).num_minutes(),
            detection_method: "statistical".to_string(),
            metadata: AnomalyMetadata::Spike {
                z_score: z,
                growth_rate: rate,
                statistical_spike,
                rapid_growth,
                baseline_mean: baseline.mean,
                baseline_std: baseline.stddev,
            },
        })
    }

    fn check_drop(
        &self,
        prev: &ScorePoint,
        curr: &ScorePoint,
        baseline: &BaselineStatistics,
    ) -> Option<Anomaly> {
        let t = &self.thresholds;
        let z = baseline.z_score(curr.wave_score);
        let rate = growth_rate(prev.wave_score, curr.wave_score);

        let statistical_drop = z.is_some_and(|z| z < t.drop_z_score);
        let rapid_decline = rate < t.drop_decline_rate;
        let significant = prev.wave_score > t.drop_prev_min && curr.wave_score < t.drop_curr_max;
        if !(statistical_drop || (rapid_decline && significant)) {
            return None;
        }

        let z_val = z.unwrap_or(0.0);
        let mut causes = Vec::new();
        if rate.abs() > 0.6 {
            causes.push("rapid_decline");
        }
        if z_val.abs() > 2.5 {
            causes.push("statistical_drop");
        }
        causes.extend([
            "user_fatigue",
            "algorithm_change",
            "competing_content",
            "trend_saturation",
        ]);

        Some(Anomaly {
            trend_id: curr.trend_id.clone(),
            anomaly_type: AnomalyType::Drop,
            severity: drop_severity(z_val, rate, curr.wave_score),
            anomaly_score: anomaly_score(z_val, rate),
            baseline_value: prev.wave_score,
            anomaly_value: curr.wave_score,
            threshold_exceeded: z_val.abs(),
            confidence: pair_confidence(z_val, rate),
            probable_causes: causes.into_iter().map(String::from).collect(),
            detection_timestamp: curr.timestamp,
            duration_minutes: (curr.timestamp - prev.timestamp).num_minutes(),
            detection_method: "statistical".to_string(),
            metadata: AnomalyMetadata::Drop {
                z_score: z,
                decline_rate: rate,
                statistical_drop,
                rapid_decline,
                baseline_mean: baseline.mean,
                baseline_std: baseline.stddev,
            },
        })
    }

    /// Volatility and oscillation share one key, so they produce at most one record
    fn check_unusual_pattern(
        &self,
        series: &TrendSeries,
        baseline: &BaselineStatistics,
    ) -> Option<Anomaly> {
        let t = &self.thresholds;
        if series.len() < t.min_pattern_points {
            return None;
        }
        let last = series.last()?;

        let volatility = baseline.stddev;
        let ratio = oscillation_ratio(&series.scores());
        let volatile = volatility > t.volatility;
        let oscillating = ratio > t.oscillation;
        if !volatile && !oscillating {
            return None;
        }

        let mut causes: Vec<&str> = Vec::new();
        let (mut severity, mut score, mut confidence) = (Severity::Low, 0.0_f64, 0.0_f64);
        let (mut anomaly_value, mut threshold_exceeded) = (0.0, 0.0);

        if oscillating {
            severity = Severity::Low;
            score = (100.0 * ratio).min(100.0);
            confidence = 0.65;
            anomaly_value = ratio;
            threshold_exceeded = ratio - t.oscillation;
            causes.extend(["oscillating_behavior", "competing_trends", "user_fatigue"]);
        }
        if volatile {
            severity = severity.max(Severity::Medium);
            score = score.max((2.0 * volatility).min(100.0));
            confidence = confidence.max(0.75);
            anomaly_value = volatility;
            threshold_exceeded = volatility - t.volatility;
            for cause in ["high_volatility", "irregular_pattern", "external_factors"] {
                if !causes.contains(&cause) {
                    causes.push(cause);
                }
            }
        }

        Some(Anomaly {
            trend_id: series.trend_id.clone(),
            anomaly_type: AnomalyType::UnusualPattern,
            severity,
            anomaly_score: score.clamp(0.0, 100.0),
            baseline_value: baseline.mean,
            anomaly_value,
            threshold_exceeded,
            confidence,
            probable_causes: causes.into_iter().map(String::from).collect(),
            detection_timestamp: last.timestamp,
            duration_minutes: (series.time_span_hours() * 60.0).round() as i64,
            detection_method: "statistical".to_string(),
            metadata: AnomalyMetadata::Pattern {
                volatility: volatile.then_some(volatility),
                oscillation_ratio: oscillating.then_some(ratio),
                data_points: series.len(),
            },
        })
    }
}

/// Relative change from `prev` to `curr`; 0 when `prev` is (near) zero
fn growth_rate(prev: f64, curr: f64) -> f64 {
    if prev <= RATE_EPSILON {
        0.0
    } else {
        (curr - prev) / prev
    }
}

fn anomaly_score(z: f64, rate: f64) -> f64 {
    (z.abs() * 10.0 + rate.abs() * 50.0).clamp(0.0, 100.0)
}

fn pair_confidence(z: f64, rate: f64) -> f64 {
    ((z.abs() / 4.0).min(1.0) + rate.abs().min(1.0)) / 2.0
}

fn spike_severity(z: f64, rate: f64, score: f64) -> Severity {
    if z > 3.5 || rate > 1.0 || score > 90.0 {
        Severity::Critical
    } else if z > 3.0 || rate > 0.7 || score > 85.0 {
        Severity::High
    } else if z > 2.5 || rate > 0.5 || score > 75.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

fn drop_severity(z: f64, rate: f64, score: f64) -> Severity {
    if z.abs() > 3.0 || rate.abs() > 0.8 || score < 10.0 {
        Severity::High
    } else if z.abs() > 2.5 || rate.abs() > 0.6 || score < 20.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}
