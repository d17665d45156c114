//! Tests for config module

use std::path::Path;

use serial_test::serial;
use wavescope::config::{Config, StorageBackend};

const ENV_KEYS: [&str; 6] = [
    "WAVESCOPE_STORAGE_BACKEND",
    "WAVESCOPE_SQLITE_PATH",
    "WAVESCOPE_MAX_CONCURRENT_TRENDS",
    "WAVESCOPE_IO_TIMEOUT",
    "WAVESCOPE_FORECAST_HORIZON",
    "WAVESCOPE_LOG_FORMAT",
];

fn clear_env() {
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
}

#[test]
fn test_config_file_exists() {
    let config_path = Path::new("config.toml");
    assert!(
        config_path.exists(),
        "config.toml should exist in project root"
    );
}

#[test]
fn test_shipped_config_matches_defaults() {
    let config = Config::from_file(Path::new("config.toml")).unwrap();
    config.validate().unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_missing_file_reports_path() {
    let err = Config::from_file(Path::new("does/not/exist.toml")).unwrap_err();
    assert!(err.to_string().contains("does/not/exist.toml"));
}

#[test]
fn test_oversized_peer_window_is_rejected() {
    let mut config = Config::default();
    config.analytics.variants.peer_window = "9999999999999999d".to_string();
    let err = config.validate().unwrap_err();
    assert!(format!("{err:#}").contains("out of range"));

    config.analytics.variants.peer_window = "100000000d".to_string();
    config.validate().unwrap();
}

#[test]
#[serial]
fn test_env_overrides() {
    clear_env();
    std::env::set_var("WAVESCOPE_STORAGE_BACKEND", "Memory");
    std::env::set_var("WAVESCOPE_SQLITE_PATH", "/tmp/trends.db");
    std::env::set_var("WAVESCOPE_MAX_CONCURRENT_TRENDS", "3");
    std::env::set_var("WAVESCOPE_IO_TIMEOUT", "750");
    std::env::set_var("WAVESCOPE_FORECAST_HORIZON", "48");
    std::env::set_var("WAVESCOPE_LOG_FORMAT", "json");

    let config = Config::from_env().unwrap();
    clear_env();

    assert_eq!(config.storage.backend, StorageBackend::Memory);
    assert_eq!(config.storage.sqlite_path, Path::new("/tmp/trends.db"));
    assert_eq!(config.runner.max_concurrent_trends, 3);
    assert_eq!(config.runner.io_timeout_ms, 750);
    assert_eq!(config.analytics.forecast.horizon_hours, 48);
    assert_eq!(config.logging.format, "json");
    config.validate().unwrap();
}

#[test]
#[serial]
fn test_env_overlays_file_values() {
    clear_env();
    std::env::set_var("WAVESCOPE_MAX_CONCURRENT_TRENDS", "not-a-number");
    std::env::set_var("WAVESCOPE_FORECAST_HORIZON", "0");

    let mut config = Config::from_file(Path::new("config.toml")).unwrap();
    config.apply_env();
    clear_env();

    // unparsable values keep the file's value; parsable ones still go through validation
    assert_eq!(config.runner.max_concurrent_trends, 8);
    assert_eq!(config.analytics.forecast.horizon_hours, 0);
    assert!(config.validate().is_err());
}
