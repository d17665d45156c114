//! Configuration management for wavescope
//!
//! This module handles loading and validating configuration from environment variables,
//! TOML files, and command-line arguments.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::analytics::{
    AnomalyThresholds, ForecastConfig, NormalizeConfig, VariantConfig, VariantGenerator,
    ViralThresholds,
};
use crate::utils::retry::RetryConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Detector, ensemble and variant settings
    pub analytics: AnalyticsConfig,

    /// Persistence configuration
    pub storage: StorageConfig,

    /// Batch runner configuration
    pub runner: RunnerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Analytics component settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub anomaly: AnomalyThresholds,
    pub forecast: ForecastConfig,
    pub variants: VariantConfig,
    pub viral: ViralThresholds,
    pub normalize: NormalizeConfig,
}

/// Which store implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// SQLite database path
    pub sqlite_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            sqlite_path: PathBuf::from("data/wavescope.db"),
        }
    }
}

/// Batch runner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Maximum number of trends derived in parallel
    pub max_concurrent_trends: usize,

    /// Deadline for a single store call in milliseconds
    pub io_timeout_ms: u64,

    /// Retries of a whole trend derivation after a recoverable failure
    pub max_retries: u32,

    /// Base delay for exponential backoff in milliseconds
    pub retry_base_delay_ms: u64,

    /// Backoff cap in milliseconds
    pub retry_max_delay_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_trends: 8,
            io_timeout_ms: 5_000,
            max_retries: 3,
            retry_base_delay_ms: 200,
            retry_max_delay_ms: 5_000,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Unset or unparsable variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    /// Overlay `WAVESCOPE_*` environment variables onto this configuration
    pub fn apply_env(&mut self) {
        if let Ok(path) = std::env::var("WAVESCOPE_SQLITE_PATH") {
            self.storage.sqlite_path = path.into();
        }
        if let Ok(backend) = std::env::var("WAVESCOPE_STORAGE_BACKEND") {
            match backend.trim().to_ascii_lowercase().as_str() {
                "sqlite" => self.storage.backend = StorageBackend::Sqlite,
                "memory" => self.storage.backend = StorageBackend::Memory,
                other => tracing::warn!(backend = other, "Ignoring unknown storage backend"),
            }
        }
        if let Some(n) = env_parse("WAVESCOPE_MAX_CONCURRENT_TRENDS") {
            self.runner.max_concurrent_trends = n;
        }
        if let Some(ms) = env_parse("WAVESCOPE_IO_TIMEOUT") {
            self.runner.io_timeout_ms = ms;
        }
        if let Some(n) = env_parse("WAVESCOPE_MAX_RETRIES") {
            self.runner.max_retries = n;
        }
        if let Some(h) = env_parse("WAVESCOPE_FORECAST_HORIZON") {
            self.analytics.forecast.horizon_hours = h;
        }
        if let Some(h) = env_parse("WAVESCOPE_HISTORY_WINDOW") {
            self.analytics.forecast.history_window_hours = h;
        }
        if let Ok(level) = std::env::var("WAVESCOPE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("WAVESCOPE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.runner.max_concurrent_trends == 0 {
            anyhow::bail!("max_concurrent_trends must be greater than 0");
        }

        if self.runner.io_timeout_ms == 0 {
            anyhow::bail!("io_timeout_ms must be greater than 0");
        }

        let forecast = &self.analytics.forecast;
        if forecast.horizon_hours == 0 {
            anyhow::bail!("forecast horizon_hours must be greater than 0");
        }
        if forecast.history_window_hours == 0 {
            anyhow::bail!("forecast history_window_hours must be greater than 0");
        }
        if forecast.min_points < 2 {
            anyhow::bail!("forecast min_points must be at least 2");
        }
        if !(forecast.smoothing_alpha > 0.0 && forecast.smoothing_alpha <= 1.0) {
            anyhow::bail!("smoothing_alpha must be in (0, 1]");
        }

        let anomaly = &self.analytics.anomaly;
        if anomaly.spike_z_score <= 0.0 || anomaly.spike_growth_rate <= 0.0 {
            anyhow::bail!("spike thresholds must be positive");
        }
        if anomaly.drop_z_score >= 0.0 || anomaly.drop_decline_rate >= 0.0 {
            anyhow::bail!("drop thresholds must be negative");
        }
        if anomaly.drop_curr_max >= anomaly.drop_prev_min {
            anyhow::bail!("drop_curr_max must be below drop_prev_min");
        }
        if anomaly.volatility <= 0.0 {
            anyhow::bail!("volatility threshold must be positive");
        }
        if !(anomaly.oscillation > 0.0 && anomaly.oscillation <= 1.0) {
            anyhow::bail!("oscillation threshold must be in (0, 1]");
        }
        if anomaly.min_pattern_points < 3 {
            anyhow::bail!("min_pattern_points must be at least 3");
        }

        VariantGenerator::new(&self.analytics.variants)
            .context("Invalid variant intervals")?;

        let viral = &self.analytics.viral;
        if !(0.0..=100.0).contains(&viral.alert_score) {
            anyhow::bail!("viral alert_score must be in [0, 100]");
        }
        if viral.declining_view_velocity > viral.rising_view_velocity {
            anyhow::bail!("declining_view_velocity must not exceed rising_view_velocity");
        }
        if viral.low_engagement_rate > viral.high_engagement_rate {
            anyhow::bail!("low_engagement_rate must not exceed high_engagement_rate");
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!("log format must be 'text' or 'json', got '{}'", self.logging.format);
        }

        Ok(())
    }

    /// Get store call deadline as Duration
    #[must_use]
    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.runner.io_timeout_ms)
    }

    /// Retry policy for whole-trend derivations
    #[must_use]
    pub fn retry(&self) -> RetryConfig {
        RetryConfig::with_delays(
            self.runner.max_retries,
            self.runner.retry_base_delay_ms,
            self.runner.retry_max_delay_ms,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_concurrency() {
        let mut config = Config::default();
        config.runner.max_concurrent_trends = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_horizon() {
        let mut config = Config::default();
        config.analytics.forecast.horizon_hours = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_threshold_ordering() {
        let mut config = Config::default();
        config.analytics.anomaly.drop_curr_max = 70.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.analytics.anomaly.drop_z_score = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_viral_threshold_ordering() {
        let mut config = Config::default();
        config.analytics.viral.alert_score = 120.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.analytics.viral.declining_view_velocity = 10_000.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_variant_interval() {
        let mut config = Config::default();
        config.analytics.variants.aggregate_timeframes = vec!["soon".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [runner]
            max_concurrent_trends = 2

            [analytics.anomaly]
            spike_z_score = 3.0
            "#,
        )
        .unwrap();
        assert_eq!(config.runner.max_concurrent_trends, 2);
        assert_eq!(config.runner.io_timeout_ms, 5_000);
        assert_eq!(config.analytics.anomaly.spike_z_score, 3.0);
        assert_eq!(config.analytics.anomaly.drop_z_score, -2.0);
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
    }

    #[test]
    fn test_timeout_and_retry_conversion() {
        let config = Config::default();
        assert_eq!(config.io_timeout(), Duration::from_secs(5));
        let retry = config.retry();
        assert_eq!(retry.max_retries, 3);
        assert_eq!(retry.base_delay_ms, 200);
    }
}
