//! Prometheus metrics for trend derivation
//!
//! This module provides metrics tracking for:
//! - Derived artifacts: anomalies by type/severity, forecasts, variants by type
//! - Viral alerts by severity and normalized bins by bin size
//! - Skips: trends that did not have enough data for a component
//! - Failures: store errors by operation, trends that failed a batch
//! - Latency: per-trend derivation duration
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all analytics metrics
struct AnalyticsMetrics {
    anomalies_detected: CounterVec,
    forecasts: CounterVec,
    variants_upserted: CounterVec,
    viral_alerts: CounterVec,
    bins_upserted: CounterVec,
    insufficient_data: CounterVec,
    store_errors: CounterVec,
    trend_results: CounterVec,
    derivation_duration: HistogramVec,
}

/// Global storage for analytics metrics
static ANALYTICS_METRICS: OnceLock<AnalyticsMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// This function should be called once at application startup.
/// If metric registration fails, errors are logged and subsequent
/// metric operations become no-ops.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = wavescope::metrics::init_metrics() {
///     eprintln!("Warning: Metrics initialization failed: {}", e);
///     // Application can continue without metrics
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    // Prevent double initialization
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = AnalyticsMetrics {
        anomalies_detected: register_counter_vec!(
            "wavescope_anomalies_detected_total",
            "Total anomalies detected by type and severity",
            &["anomaly_type", "severity"]
        )?,
        forecasts: register_counter_vec!(
            "wavescope_forecasts_total",
            "Total forecast attempts by outcome (generated, skipped)",
            &["outcome"]
        )?,
        variants_upserted: register_counter_vec!(
            "wavescope_variants_upserted_total",
            "Total variants upserted by type",
            &["variant_type"]
        )?,
        viral_alerts: register_counter_vec!(
            "wavescope_viral_alerts_total",
            "Total viral alerts raised by severity",
            &["severity"]
        )?,
        bins_upserted: register_counter_vec!(
            "wavescope_normalized_bins_upserted_total",
            "Total normalized time bins upserted by bin size",
            &["bin_size"]
        )?,
        insufficient_data: register_counter_vec!(
            "wavescope_insufficient_data_total",
            "Trends skipped for lack of data, by component",
            &["component"]
        )?,
        store_errors: register_counter_vec!(
            "wavescope_store_errors_total",
            "Store errors by operation and error category",
            &["operation", "category"]
        )?,
        trend_results: register_counter_vec!(
            "wavescope_batch_trends_total",
            "Trends processed by batch runs, by status",
            &["status"]
        )?,
        derivation_duration: register_histogram_vec!(
            "wavescope_trend_derivation_duration_seconds",
            "Time spent deriving artifacts for one trend",
            &["status"],
            vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
        )?,
    };

    ANALYTICS_METRICS
        .set(metrics)
        .map_err(|_| "Analytics metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    ANALYTICS_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record one detected anomaly
pub fn record_anomaly(anomaly_type: &str, severity: &str) {
    if let Some(m) = ANALYTICS_METRICS.get() {
        m.anomalies_detected
            .with_label_values(&[anomaly_type, severity])
            .inc();
    }
}

/// Record a forecast outcome
pub fn record_forecast(generated: bool) {
    if let Some(m) = ANALYTICS_METRICS.get() {
        let outcome = if generated { "generated" } else { "skipped" };
        m.forecasts.with_label_values(&[outcome]).inc();
    }
}

/// Record variants written for one type
pub fn record_variants(variant_type: &str, count: usize) {
    if count == 0 {
        return;
    }
    if let Some(m) = ANALYTICS_METRICS.get() {
        m.variants_upserted
            .with_label_values(&[variant_type])
            .inc_by(count as f64);
    }
}

/// Record one raised viral alert
pub fn record_viral_alert(severity: &str) {
    if let Some(m) = ANALYTICS_METRICS.get() {
        m.viral_alerts.with_label_values(&[severity]).inc();
    }
}

/// Record normalized bins written for one bin size
pub fn record_bins(bin_size: &str, count: usize) {
    if count == 0 {
        return;
    }
    if let Some(m) = ANALYTICS_METRICS.get() {
        m.bins_upserted
            .with_label_values(&[bin_size])
            .inc_by(count as f64);
    }
}

/// Record an insufficient-data skip for a component
pub fn record_insufficient_data(component: &str) {
    if let Some(m) = ANALYTICS_METRICS.get() {
        m.insufficient_data.with_label_values(&[component]).inc();
    }
}

/// Record a failed store call
pub fn record_store_error(operation: &str, category: &str) {
    if let Some(m) = ANALYTICS_METRICS.get() {
        m.store_errors
            .with_label_values(&[operation, category])
            .inc();
    }
}

/// Record the outcome of one trend in a batch run
pub fn record_trend_result(success: bool, duration_secs: f64) {
    let Some(m) = ANALYTICS_METRICS.get() else {
        return;
    };

    let status = if success { "success" } else { "failure" };
    m.trend_results.with_label_values(&[status]).inc();
    m.derivation_duration
        .with_label_values(&[status])
        .observe(duration_secs);
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ensure_metrics_initialized() {
        let _ = init_metrics();
    }

    #[test]
    fn test_init_metrics() {
        // Should succeed or return Ok if already initialized
        assert!(init_metrics().is_ok());

        // Second call should also be Ok (idempotent)
        assert!(init_metrics().is_ok());
    }

    #[test]
    fn test_encode_metrics() {
        ensure_metrics_initialized();
        record_forecast(true);
        let text = encode_metrics().unwrap();
        assert!(text.contains("wavescope_forecasts_total"));
    }

    #[test]
    fn test_recording_does_not_panic() {
        ensure_metrics_initialized();
        assert!(metrics_initialized());
        record_anomaly("spike", "high");
        record_forecast(false);
        record_variants("snapshot", 4);
        record_variants("projected", 0);
        record_viral_alert("critical");
        record_bins("hourly", 3);
        record_bins("daily", 0);
        record_insufficient_data("forecast");
        record_store_error("query_series", "timeout");
        record_trend_result(true, 0.02);
        record_trend_result(false, 1.5);
    }
}
