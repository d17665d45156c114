//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the crate.

pub mod retry;

use chrono::Duration;

use crate::error::{Error, Result};

/// Round to two decimal places
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Parse a compact interval such as `30m`, `6h`, `7d` or `2w`
///
/// A bare number is read as hours.
pub fn parse_time_interval(interval: &str) -> Result<Duration> {
    let interval = interval.trim();
    if interval.is_empty() {
        return Err(Error::config("empty time interval"));
    }

    let (digits, unit) = match interval.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => interval.split_at(idx),
        None => (interval, "h"),
    };

    let amount: i64 = digits
        .parse()
        .map_err(|_| Error::config(format!("invalid time interval: {interval}")))?;

    let duration = match unit {
        "m" | "min" => Duration::try_minutes(amount),
        "h" => Duration::try_hours(amount),
        "d" => Duration::try_days(amount),
        "w" => Duration::try_weeks(amount),
        _ => {
            return Err(Error::config(format!(
                "unknown time unit '{unit}' in interval: {interval}"
            )))
        }
    }
    .ok_or_else(|| Error::config(format!("interval out of range: {interval}")))?;

    if duration <= Duration::zero() {
        return Err(Error::config(format!(
            "time interval must be positive: {interval}"
        )));
    }
    Ok(duration)
}
