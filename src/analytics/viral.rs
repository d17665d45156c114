//! Viral growth scoring over consecutive observations of a trend
//!
//! Growth is measured between each point and the one before it. A trend's
//! first point has no predecessor, so its rates are estimated from the
//! content's age instead. The viral score blends view, share, engagement
//! and comment rates and decays as the content ages past two days.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::anomaly::Severity;
use crate::models::{Platform, ScorePoint, TrendSeries};
use crate::utils::round2;

/// Age in hours after which the recency multiplier bottoms out
const RECENCY_HORIZON_HOURS: f64 = 48.0;

/// Floor of the recency multiplier
const MIN_RECENCY: f64 = 0.1;

/// Hashtags that signal a saturated market
const GENERIC_HASHTAGS: [&str; 3] = ["fyp", "viral", "trending"];

/// More hashtags than this risks algorithm penalties
const MAX_HASHTAGS: usize = 10;

/// Prior scores inspected for a consistent growth pattern
const HISTORY_POINTS: usize = 3;

/// Thresholds for candidate selection, direction and risk checks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViralThresholds {
    /// Viral score at or above which a trend is a viral candidate
    pub alert_score: f64,
    /// Views per hour above which a trend is rising
    pub rising_view_velocity: f64,
    /// Views per hour below which a trend is declining
    pub declining_view_velocity: f64,
    pub high_engagement_rate: f64,
    pub low_engagement_rate: f64,
    /// Engagement rate that suggests artificial inflation
    pub suspicious_engagement_rate: f64,
    /// Views per hour that may trigger platform review
    pub review_view_velocity: f64,
    /// Most alerts raised per analysis
    pub max_alerts: usize,
}

impl Default for ViralThresholds {
    fn default() -> Self {
        Self {
            alert_score: 70.0,
            rising_view_velocity: 5_000.0,
            declining_view_velocity: 100.0,
            high_engagement_rate: 0.05,
            low_engagement_rate: 0.01,
            suspicious_engagement_rate: 0.15,
            review_view_velocity: 50_000.0,
            max_alerts: 10,
        }
    }
}

/// Per-hour growth rates of one observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrowthMetrics {
    pub view_velocity: f64,
    pub share_acceleration: f64,
    pub comment_velocity: f64,
    pub like_velocity: f64,
    /// (likes + comments + shares) / views
    pub engagement_rate: f64,
    /// 0.1..=1, higher for newer content
    pub recency_multiplier: f64,
    /// `None` when the publish time is unknown
    pub age_hours: Option<f64>,
    /// Hours covered by the rates
    pub elapsed_hours: f64,
}

impl GrowthMetrics {
    /// Rates of `current` since `previous`, or since publication when there
    /// is no usable previous observation
    #[must_use]
    pub fn measure(current: &ScorePoint, previous: Option<&ScorePoint>) -> Self {
        let now = &current.raw_metrics;
        let age_hours = current.age_hours();
        let since_previous = previous
            .map(|prev| {
                let hours = (current.timestamp - prev.timestamp).num_milliseconds() as f64
                    / 3_600_000.0;
                (prev, hours)
            })
            .filter(|(_, hours)| *hours > 0.0);

        let (rates, elapsed_hours) = match since_previous {
            Some((prev, hours)) => {
                let then = &prev.raw_metrics;
                let rate = |curr: u64, before: u64| (curr as f64 - before as f64) / hours;
                (
                    [
                        rate(now.views, then.views),
                        rate(now.shares, then.shares),
                        rate(now.comments, then.comments),
                        rate(now.likes, then.likes),
                    ],
                    hours,
                )
            }
            None => {
                let age = age_hours.unwrap_or(0.0);
                let rates = if age > 0.0 {
                    [
                        now.views as f64 / age,
                        now.shares as f64 / age,
                        now.comments as f64 / age,
                        now.likes as f64 / age,
                    ]
                } else {
                    [0.0; 4]
                };
                (rates, age.max(1.0))
            }
        };

        let engagement = (now.likes + now.comments + now.shares) as f64;
        let engagement_rate = if now.views > 0 {
            engagement / now.views as f64
        } else {
            0.0
        };

        Self {
            view_velocity: rates[0].max(0.0),
            share_acceleration: rates[1].max(0.0),
            comment_velocity: rates[2].max(0.0),
            like_velocity: rates[3].max(0.0),
            engagement_rate,
            recency_multiplier: age_hours.map_or(1.0, recency_multiplier),
            age_hours,
            elapsed_hours,
        }
    }
}

/// Linear decay over the first two days, floored at 0.1
#[must_use]
pub fn recency_multiplier(age_hours: f64) -> f64 {
    ((RECENCY_HORIZON_HOURS - age_hours) / RECENCY_HORIZON_HOURS).clamp(MIN_RECENCY, 1.0)
}

/// Viral score in whole points, 0..=100
///
/// Each rate is scaled so that 100 000 views/h, 10 shares/h, a 10%
/// engagement rate and 20 comments/h each saturate at 100.
#[must_use]
pub fn viral_score(metrics: &GrowthMetrics) -> f64 {
    let views = (metrics.view_velocity / 1_000.0).min(100.0);
    let shares = (metrics.share_acceleration * 10.0).min(100.0);
    let engagement = (metrics.engagement_rate * 1_000.0).min(100.0);
    let comments = (metrics.comment_velocity * 5.0).min(100.0);

    let base = 0.4 * views + 0.3 * shares + 0.2 * engagement + 0.1 * comments;
    (base * metrics.recency_multiplier).round().clamp(0.0, 100.0)
}

/// Alert severity for a viral score
#[must_use]
pub fn alert_severity(score: f64) -> Severity {
    if score >= 90.0 {
        Severity::Critical
    } else if score >= 80.0 {
        Severity::High
    } else if score >= 70.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Hours until the trend is expected to peak
#[must_use]
pub fn estimate_peak_hours(metrics: &GrowthMetrics) -> f64 {
    let age = metrics.age_hours.unwrap_or(0.0);
    if metrics.view_velocity > 10_000.0 {
        (24.0 - age).max(6.0)
    } else if metrics.view_velocity > 1_000.0 {
        (72.0 - age).max(12.0)
    } else {
        (168.0 - age).max(24.0)
    }
}

/// Predicted direction of a trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Rising,
    Stable,
    Declining,
}

impl TrendDirection {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rising => "rising",
            Self::Stable => "stable",
            Self::Declining => "declining",
        }
    }
}

/// Something that may hold a trend back
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFactor {
    OverHashtagged,
    SuspiciousEngagement,
    SaturatedHashtags,
    RapidGrowth,
}

impl RiskFactor {
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::OverHashtagged => "Over-hashtagged content may face algorithm penalties",
            Self::SuspiciousEngagement => {
                "Unusually high engagement rate, possible artificial inflation"
            }
            Self::SaturatedHashtags => "Generic trending hashtags may indicate a saturated market",
            Self::RapidGrowth => "Extremely rapid growth may trigger platform review",
        }
    }
}

/// Direction, confidence and outlook of one trend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPrediction {
    pub direction: TrendDirection,
    /// 0..=100
    pub confidence: f64,
    pub reasoning: Vec<String>,
    pub predicted_peak_hours: f64,
    pub risk_factors: Vec<RiskFactor>,
}

/// Viral analysis of a trend's latest observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViralAnalysis {
    pub trend_id: String,
    pub platform_source: Platform,
    pub category: String,
    /// Timestamp of the analyzed observation
    pub observed_at: DateTime<Utc>,
    pub viral_score: f64,
    pub growth: GrowthMetrics,
    pub prediction: TrendPrediction,
}

/// Alert raised for a viral candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViralAlert {
    pub id: String,
    pub trend_id: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub title: String,
    pub message: String,
    pub viral_score: f64,
    pub view_velocity: f64,
    pub engagement_rate: f64,
    pub platform_source: Platform,
    pub category: String,
    pub direction: TrendDirection,
}

/// Ranked viral analyses of a set of trends
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViralReport {
    pub total_analyzed: usize,
    pub viral_candidates: usize,
    /// Highest viral score first
    pub trends: Vec<ViralAnalysis>,
    pub alerts: Vec<ViralAlert>,
}

/// Scores, ranks and raises alerts for trends
#[derive(Debug, Clone, Default)]
pub struct ViralAnalyzer {
    thresholds: ViralThresholds,
}

impl ViralAnalyzer {
    #[must_use]
    pub fn new(thresholds: ViralThresholds) -> Self {
        Self { thresholds }
    }

    #[must_use]
    pub fn thresholds(&self) -> &ViralThresholds {
        &self.thresholds
    }

    /// Analyze the latest point of `series`
    ///
    /// Earlier points are scored against their own predecessors to give the
    /// score history used for the growth-pattern check. Returns `None` for an
    /// empty series.
    #[must_use]
    pub fn analyze(&self, series: &TrendSeries) -> Option<ViralAnalysis> {
        let points = series.points();
        let latest = *points.last()?;

        let mut history = Vec::with_capacity(points.len());
        let mut previous: Option<&ScorePoint> = None;
        for point in points.iter().copied() {
            history.push(viral_score(&GrowthMetrics::measure(point, previous)));
            previous = Some(point);
        }
        let viral_score = history.pop().unwrap_or_default();

        let growth = GrowthMetrics::measure(latest, points.len().checked_sub(2).map(|i| points[i]));
        let prediction = self.predict(&growth, &history, &latest.hashtags);

        Some(ViralAnalysis {
            trend_id: series.trend_id.clone(),
            platform_source: latest.platform_source.clone(),
            category: latest.category.clone(),
            observed_at: latest.timestamp,
            viral_score,
            growth,
            prediction,
        })
    }

    /// Predict where a trend is heading from its growth and prior viral scores
    #[must_use]
    pub fn predict(
        &self,
        growth: &GrowthMetrics,
        history: &[f64],
        hashtags: &[String],
    ) -> TrendPrediction {
        let t = &self.thresholds;
        let mut direction = TrendDirection::Stable;
        let mut confidence: f64 = 50.0;
        let mut reasoning = Vec::new();

        if growth.view_velocity > t.rising_view_velocity {
            direction = TrendDirection::Rising;
            confidence += 20.0;
            reasoning.push("High view velocity");
        } else if growth.view_velocity < t.declining_view_velocity {
            direction = TrendDirection::Declining;
            confidence -= 15.0;
            reasoning.push("Low view velocity");
        }

        if growth.engagement_rate > t.high_engagement_rate {
            if direction == TrendDirection::Rising {
                confidence += 15.0;
            }
            reasoning.push("High engagement rate");
        } else if growth.engagement_rate < t.low_engagement_rate {
            direction = TrendDirection::Declining;
            confidence -= 10.0;
            reasoning.push("Low engagement rate");
        }

        match growth.age_hours {
            Some(age) if age < 6.0 && direction == TrendDirection::Rising => {
                confidence += 10.0;
                reasoning.push("Fresh content with momentum");
            }
            Some(age) if age > 72.0 && direction != TrendDirection::Rising => {
                confidence += 5.0;
                reasoning.push("Mature content past peak");
            }
            _ => {}
        }

        if history.len() >= HISTORY_POINTS {
            let recent = &history[history.len() - HISTORY_POINTS..];
            let accelerating = recent.windows(2).all(|w| w[1] >= w[0]);
            if accelerating && direction == TrendDirection::Rising {
                confidence += 15.0;
                reasoning.push("Consistent growth pattern");
            } else if !accelerating && direction == TrendDirection::Declining {
                confidence += 10.0;
                reasoning.push("Declining trend confirmed");
            }
        }

        TrendPrediction {
            direction,
            confidence: confidence.clamp(0.0, 100.0),
            reasoning: reasoning.into_iter().map(String::from).collect(),
            predicted_peak_hours: round2(estimate_peak_hours(growth)),
            risk_factors: self.risk_factors(growth, hashtags),
        }
    }

    /// Risks visible in the growth rates and hashtags
    #[must_use]
    pub fn risk_factors(&self, growth: &GrowthMetrics, hashtags: &[String]) -> Vec<RiskFactor> {
        let t = &self.thresholds;
        let mut risks = Vec::new();
        if hashtags.len() > MAX_HASHTAGS {
            risks.push(RiskFactor::OverHashtagged);
        }
        if growth.engagement_rate > t.suspicious_engagement_rate {
            risks.push(RiskFactor::SuspiciousEngagement);
        }
        if hashtags.iter().any(|tag| {
            let tag = tag.trim_start_matches('#').to_lowercase();
            GENERIC_HASHTAGS.contains(&tag.as_str())
        }) {
            risks.push(RiskFactor::SaturatedHashtags);
        }
        if growth.view_velocity > t.review_view_velocity {
            risks.push(RiskFactor::RapidGrowth);
        }
        risks
    }

    /// Analyze every series, rank by viral score and alert on the top candidates
    #[must_use]
    pub fn rank(&self, series: &[TrendSeries], now: DateTime<Utc>) -> ViralReport {
        let mut trends: Vec<ViralAnalysis> = series.iter().filter_map(|s| self.analyze(s)).collect();
        trends.sort_by(|a, b| {
            b.viral_score
                .total_cmp(&a.viral_score)
                .then_with(|| a.trend_id.cmp(&b.trend_id))
        });

        let candidates: Vec<&ViralAnalysis> = trends
            .iter()
            .filter(|t| t.viral_score >= self.thresholds.alert_score)
            .collect();
        let alerts = candidates
            .iter()
            .take(self.thresholds.max_alerts)
            .map(|analysis| alert_for(analysis, now))
            .collect();

        ViralReport {
            total_analyzed: trends.len(),
            viral_candidates: candidates.len(),
            alerts,
            trends,
        }
    }
}

fn alert_for(analysis: &ViralAnalysis, now: DateTime<Utc>) -> ViralAlert {
    let score = analysis.viral_score;
    let direction = analysis.prediction.direction;
    let category = if analysis.category.is_empty() {
        "general"
    } else {
        analysis.category.as_str()
    };

    ViralAlert {
        id: format!("viral_{}_{}", analysis.trend_id, now.timestamp_millis()),
        trend_id: analysis.trend_id.clone(),
        severity: alert_severity(score),
        timestamp: now,
        title: format!("Viral prediction alert: {score:.0}% confidence"),
        message: format!(
            "{} content showing {score:.0}% viral potential with {:.0} views/hour. \
             Trend direction: {}. Category: {category}.",
            analysis.platform_source,
            analysis.growth.view_velocity,
            direction.as_str(),
        ),
        viral_score: score,
        view_velocity: round2(analysis.growth.view_velocity),
        engagement_rate: analysis.growth.engagement_rate,
        platform_source: analysis.platform_source.clone(),
        category: analysis.category.clone(),
        direction,
    }
}
