//! Baseline statistics and shared numeric helpers
//!
//! This module provides:
//! - Per-series baseline (mean, population stddev, min, max)
//! - Ordinary least squares fits with R²
//! - Oscillation, percentile rank, ranking and diversity measures

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use super::{AnalyticsError, AnalyticsResult};
use crate::models::TrendSeries;

/// Minimum number of points for a baseline to be meaningful
pub const MIN_BASELINE_POINTS: usize = 5;

/// Arithmetic mean; 0 for an empty slice
#[must_use]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().mean()
}

/// Population standard deviation; 0 for fewer than two values
#[must_use]
pub fn population_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let sd = values.iter().population_std_dev();
    if sd.is_finite() {
        sd.max(0.0)
    } else {
        0.0
    }
}

/// Smallest value, or `None` when empty
#[must_use]
pub fn min_value(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}

/// Largest value, or `None` when empty
#[must_use]
pub fn max_value(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

/// Summary statistics over the wave_score values of a window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineStatistics {
    pub mean: f64,
    pub stddev: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

impl BaselineStatistics {
    /// Compute a baseline from raw scores
    ///
    /// # Returns
    /// `AnalyticsError::InsufficientData` when fewer than
    /// [`MIN_BASELINE_POINTS`] values are given.
    pub fn from_scores(scores: &[f64]) -> AnalyticsResult<Self> {
        if scores.len() < MIN_BASELINE_POINTS {
            return Err(AnalyticsError::InsufficientData {
                needed: MIN_BASELINE_POINTS,
                actual: scores.len(),
            });
        }

        // Length was checked above, so min/max exist.
        let min = min_value(scores).unwrap_or(0.0);
        let max = max_value(scores).unwrap_or(0.0);

        Ok(Self {
            mean: mean(scores),
            stddev: population_std_dev(scores),
            min,
            max,
            count: scores.len(),
        })
    }

    /// Compute a baseline over every point of a series
    pub fn from_series(series: &TrendSeries) -> AnalyticsResult<Self> {
        Self::from_scores(&series.scores())
    }

    /// Z-score of `value`, or `None` when the baseline has no spread
    #[must_use]
    pub fn z_score(&self, value: f64) -> Option<f64> {
        if self.stddev > f64::EPSILON {
            Some((value - self.mean) / self.stddev)
        } else {
            None
        }
    }
}

/// Result of an ordinary least squares fit `y = slope·x + intercept`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

impl LinearFit {
    /// Fit `ys` against `xs`
    ///
    /// Returns `None` with fewer than two points, mismatched lengths, or
    /// when every x is identical. A perfectly flat series fits with R² = 1.
    #[must_use]
    pub fn fit(xs: &[f64], ys: &[f64]) -> Option<Self> {
        let n = xs.len();
        if n < 2 || n != ys.len() {
            return None;
        }

        let n_f64 = n as f64;
        let sum_x: f64 = xs.iter().sum();
        let sum_y: f64 = ys.iter().sum();
        let sum_xy: f64 = xs.iter().zip(ys).map(|(x, y)| x * y).sum();
        let sum_xx: f64 = xs.iter().map(|x| x * x).sum();

        let denominator = n_f64 * sum_xx - sum_x * sum_x;
        if denominator.abs() < f64::EPSILON {
            return None;
        }

        let slope = (n_f64 * sum_xy - sum_x * sum_y) / denominator;
        let intercept = (sum_y - slope * sum_x) / n_f64;

        let y_mean = sum_y / n_f64;
        let ss_tot: f64 = ys.iter().map(|y| (y - y_mean).powi(2)).sum();
        let ss_res: f64 = xs
            .iter()
            .zip(ys)
            .map(|(x, y)| (y - (slope * x + intercept)).powi(2))
            .sum();

        let r_squared = if ss_tot < 1e-12 {
            if ss_res < 1e-9 {
                1.0
            } else {
                0.0
            }
        } else {
            (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
        };

        Some(Self {
            slope,
            intercept,
            r_squared,
        })
    }

    /// Fit `ys` against their positions `0, 1, 2, ...`
    #[must_use]
    pub fn fit_index(ys: &[f64]) -> Option<Self> {
        let xs: Vec<f64> = (0..ys.len()).map(|i| i as f64).collect();
        Self::fit(&xs, ys)
    }

    /// Evaluate the fitted line at `x`
    #[must_use]
    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Slope of `values` against their index; 0 when it cannot be fitted
#[must_use]
pub fn index_slope(values: &[f64]) -> f64 {
    LinearFit::fit_index(values).map(|f| f.slope).unwrap_or(0.0)
}

/// Fraction of steps where the direction of change flips.
///
/// Flat steps are ignored when tracking direction. A monotonic series
/// yields 0 and a strictly alternating one approaches 1.
#[must_use]
pub fn oscillation_ratio(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }

    let mut changes = 0usize;
    let mut last_direction = 0.0_f64;
    for pair in values.windows(2) {
        let delta = pair[1] - pair[0];
        let direction = if delta > 0.0 {
            1.0
        } else if delta < 0.0 {
            -1.0
        } else {
            0.0
        };
        if direction != 0.0 {
            if last_direction != 0.0 && direction != last_direction {
                changes += 1;
            }
            last_direction = direction;
        }
    }

    changes as f64 / (values.len() - 1) as f64
}

/// Percentage of `dataset` that is less than or equal to `value`
///
/// Returns 100 for an empty dataset.
#[must_use]
pub fn percentile_rank(value: f64, dataset: &[f64]) -> f64 {
    if dataset.is_empty() {
        return 100.0;
    }
    let at_or_below = dataset.iter().filter(|v| **v <= value).count();
    at_or_below as f64 / dataset.len() as f64 * 100.0
}

/// 1-based rank of `value` among `dataset` (ties share the better rank)
#[must_use]
pub fn ranking(value: f64, dataset: &[f64]) -> usize {
    1 + dataset.iter().filter(|v| **v > value).count()
}

/// Normalized Shannon entropy of the shares in `amounts`, scaled to 0..=100
///
/// Returns 0 when there are fewer than two buckets or nothing to share.
#[must_use]
pub fn diversity_score(amounts: &[f64]) -> f64 {
    let total: f64 = amounts.iter().sum();
    if amounts.len() < 2 || total <= 0.0 {
        return 0.0;
    }

    let entropy: f64 = amounts
        .iter()
        .map(|a| a / total)
        .filter(|p| *p > 0.0)
        .map(|p| -p * p.log2())
        .sum();

    let max_entropy = (amounts.len() as f64).log2();
    (entropy / max_entropy * 100.0).clamp(0.0, 100.0)
}
