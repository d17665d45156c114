//! WaveScore computation
//!
//! Converts a raw engagement observation into a [`ScorePoint`] carrying a
//! 0-100 composite score and a 0-1 confidence. The score blends five
//! sub-scores:
//!
//! | component  | weight | source                                        |
//! |------------|--------|-----------------------------------------------|
//! | views      | 0.25   | z-score of views within the category          |
//! | engagement | 0.30   | weighted interactions per view                |
//! | growth     | 0.25   | log-scaled views per hour since publishing    |
//! | sentiment  | 0.15   | injected [`SentimentSource`]                  |
//! | recency    | 0.05   | step decay on content age                     |

use chrono::{DateTime, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::analytics::baseline::{mean, population_std_dev};
use crate::models::{RawObservation, ScoreComponents, ScorePoint};
use crate::utils::round2;

const VIEWS_WEIGHT: f64 = 0.25;
const ENGAGEMENT_WEIGHT: f64 = 0.30;
const GROWTH_WEIGHT: f64 = 0.25;
const SENTIMENT_WEIGHT: f64 = 0.15;
const RECENCY_WEIGHT: f64 = 0.05;

/// Views per hour that saturates the growth component
const GROWTH_REFERENCE_RATE: f64 = 1_000_000.0;

/// Minimum observations in a category for its baseline to count
const MIN_CATEGORY_SAMPLES: usize = 2;

/// Recency weight (0-100) for content of the given age
///
/// Step decay: up to 1h 95, 6h 85, 24h 70, a week 50, 30 days 25, then 10.
#[must_use]
pub fn recency_weight(age_hours: f64) -> f64 {
    match age_hours {
        a if a <= 0.0 => 100.0,
        a if a <= 1.0 => 95.0,
        a if a <= 6.0 => 85.0,
        a if a <= 24.0 => 70.0,
        a if a <= 168.0 => 50.0,
        a if a <= 720.0 => 25.0,
        _ => 10.0,
    }
}

/// Weighted interactions per view, scaled to 0-100
#[must_use]
pub fn engagement_component(likes: u64, comments: u64, shares: u64, views: u64) -> f64 {
    let weighted = likes as f64 + 2.0 * comments as f64 + 5.0 * shares as f64;
    let rate = weighted / views.max(1) as f64;
    (rate * 1000.0).clamp(0.0, 100.0)
}

/// Log-scaled views per hour, adjusted for content age
#[must_use]
pub fn growth_component(views: u64, age_hours: f64) -> f64 {
    let rate = views as f64 / age_hours.max(1.0);
    let scaled = (rate + 1.0).log10() / GROWTH_REFERENCE_RATE.log10() * 100.0;
    let age_factor = if age_hours < 1.0 {
        0.7
    } else if age_hours < 6.0 {
        0.9
    } else if age_hours > 168.0 {
        1.2
    } else {
        1.0
    };
    (scaled.clamp(0.0, 100.0) * age_factor).clamp(0.0, 100.0)
}

// ============================================================================
// Sentiment
// ============================================================================

/// Produces the 0-100 sentiment sub-score for an observation
pub trait SentimentSource: Send + Sync {
    fn sentiment(&self, observation: &RawObservation) -> f64;
}

/// Like share of all reactions; 50 when nobody reacted
fn like_ratio(observation: &RawObservation) -> f64 {
    let likes = observation.metrics.likes as f64;
    let reactions = likes + observation.metrics.comments as f64;
    if reactions <= 0.0 {
        50.0
    } else {
        likes / reactions * 100.0
    }
}

/// Deterministic like-ratio proxy (no text analysis)
#[derive(Debug, Clone, Copy, Default)]
pub struct LikeRatioSentiment;

impl SentimentSource for LikeRatioSentiment {
    fn sentiment(&self, observation: &RawObservation) -> f64 {
        like_ratio(observation)
    }
}

/// Placeholder sentiment: the like ratio plus a reproducible per-content jitter
///
/// The jitter is drawn from a ChaCha RNG seeded by the configured seed and
/// the SHA-256 of the content id, so the same content always gets the same value.
#[derive(Debug, Clone, Copy)]
pub struct SeededSentiment {
    seed: u64,
    amplitude: f64,
}

impl SeededSentiment {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            amplitude: 10.0,
        }
    }

    /// Maximum absolute jitter in score points
    #[must_use]
    pub fn with_amplitude(mut self, amplitude: f64) -> Self {
        self.amplitude = amplitude.abs();
        self
    }

    fn rng_for(&self, content_id: &str) -> ChaCha8Rng {
        let digest = Sha256::digest(content_id.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        ChaCha8Rng::seed_from_u64(self.seed ^ u64::from_le_bytes(prefix))
    }
}

impl SentimentSource for SeededSentiment {
    fn sentiment(&self, observation: &RawObservation) -> f64 {
        let jitter = if self.amplitude > 0.0 {
            self.rng_for(&observation.content_id)
                .gen_range(-self.amplitude..=self.amplitude)
        } else {
            0.0
        };
        (like_ratio(observation) + jitter).clamp(0.0, 100.0)
    }
}

// ============================================================================
// Category baselines
// ============================================================================

/// View-count population statistics for one category
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoryBaseline {
    pub mean_views: f64,
    pub stddev_views: f64,
    pub samples: usize,
}

/// Per-category view baselines used for the views component
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryBaselines {
    by_category: BTreeMap<String, CategoryBaseline>,
}

impl CategoryBaselines {
    /// Build baselines from a batch of observations
    #[must_use]
    pub fn from_observations(observations: &[RawObservation]) -> Self {
        let mut views: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for obs in observations {
            views
                .entry(obs.category.as_str())
                .or_default()
                .push(obs.metrics.views as f64);
        }

        let by_category = views
            .into_iter()
            .filter(|(_, v)| v.len() >= MIN_CATEGORY_SAMPLES)
            .map(|(category, v)| {
                (
                    category.to_string(),
                    CategoryBaseline {
                        mean_views: mean(&v),
                        stddev_views: population_std_dev(&v),
                        samples: v.len(),
                    },
                )
            })
            .collect();

        Self { by_category }
    }

    #[must_use]
    pub fn get(&self, category: &str) -> Option<&CategoryBaseline> {
        self.by_category.get(category)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_category.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_category.is_empty()
    }
}

// ============================================================================
// Calculator
// ============================================================================

/// Computes WaveScores for raw observations
#[derive(Clone)]
pub struct WaveScoreCalculator {
    sentiment: Arc<dyn SentimentSource>,
    baselines: CategoryBaselines,
}

impl std::fmt::Debug for WaveScoreCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaveScoreCalculator")
            .field("baselines", &self.baselines.len())
            .finish_non_exhaustive()
    }
}

impl Default for WaveScoreCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl WaveScoreCalculator {
    /// Calculator with the like-ratio sentiment and no category baselines
    #[must_use]
    pub fn new() -> Self {
        Self {
            sentiment: Arc::new(LikeRatioSentiment),
            baselines: CategoryBaselines::default(),
        }
    }

    #[must_use]
    pub fn with_sentiment(mut self, sentiment: Arc<dyn SentimentSource>) -> Self {
        self.sentiment = sentiment;
        self
    }

    #[must_use]
    pub fn with_baselines(mut self, baselines: CategoryBaselines) -> Self {
        self.baselines = baselines;
        self
    }

    #[must_use]
    pub fn baselines(&self) -> &CategoryBaselines {
        &self.baselines
    }

    /// Sub-scores for one observation at `now`
    #[must_use]
    pub fn components(&self, obs: &RawObservation, now: DateTime<Utc>) -> ScoreComponents {
        let m = &obs.metrics;
        let age_hours = obs.age_hours(now);

        let z = self
            .baselines
            .get(&obs.category)
            .filter(|b| b.stddev_views > f64::EPSILON)
            .map(|b| (m.views as f64 - b.mean_views) / b.stddev_views)
            .unwrap_or(0.0);

        ScoreComponents {
            views: (50.0 + 15.0 * z).clamp(0.0, 100.0),
            engagement: engagement_component(m.likes, m.comments, m.shares, m.views),
            growth: growth_component(m.views, age_hours),
            sentiment: self.sentiment.sentiment(obs).clamp(0.0, 100.0),
            recency: recency_weight(age_hours),
        }
    }

    /// Confidence in a score given how much signal the observation carries
    #[must_use]
    pub fn confidence(&self, obs: &RawObservation, now: DateTime<Utc>) -> f64 {
        let mut confidence = 0.8;
        if obs.metrics.likes == 0 && obs.metrics.comments == 0 {
            confidence *= 0.7;
        }
        if obs.age_hours(now) < 1.0 {
            confidence *= 0.6;
        }
        if self.baselines.get(&obs.category).is_some() {
            confidence *= 1.1;
        }
        confidence *= obs.platform_source.data_quality_factor();
        round2(confidence.clamp(0.3, 1.0))
    }

    /// Score one observation at `now`
    #[must_use]
    pub fn score(&self, obs: &RawObservation, now: DateTime<Utc>) -> ScorePoint {
        let c = self.components(obs, now);
        let weighted = VIEWS_WEIGHT * c.views
            + ENGAGEMENT_WEIGHT * c.engagement
            + GROWTH_WEIGHT * c.growth
            + SENTIMENT_WEIGHT * c.sentiment
            + RECENCY_WEIGHT * c.recency;

        ScorePoint {
            timestamp: obs.observed_at,
            trend_id: obs.trend_id(),
            content_id: obs.content_id.clone(),
            wave_score: round2(weighted).clamp(0.0, 100.0),
            confidence: self.confidence(obs, now),
            platform_source: obs.platform_source.clone(),
            category: obs.category.clone(),
            raw_metrics: obs.metrics,
            components: Some(c),
            published_at: obs.published_at,
            hashtags: obs.hashtags.clone(),
        }
    }

    /// Score a batch, using category baselines built from the batch itself
    #[must_use]
    pub fn score_batch(&self, observations: &[RawObservation], now: DateTime<Utc>) -> Vec<ScorePoint> {
        let calculator = self
            .clone()
            .with_baselines(CategoryBaselines::from_observations(observations));
        observations
            .iter()
            .map(|obs| calculator.score(obs, now))
            .collect()
    }
}
