//! Hourly mining-quota arithmetic.

use chrono::{DateTime, Timelike, Utc};

use crate::types::QuotaStats;

/// The exchange publishes a daily limit; the throttle works per hour.
pub fn hourly_limit(daily_limit: f64) -> f64 {
    daily_limit / 24.0
}

/// Share of the hourly limit consumed, in percent.
///
/// A non-positive limit counts as fully consumed.
pub fn used_percent(stats: &QuotaStats, hourly_limit: f64) -> f64 {
    if hourly_limit <= 0.0 {
        return f64::INFINITY;
    }
    stats.consumed() * 100.0 / hourly_limit
}

/// Trading continues strictly below the threshold.
pub fn keep_running(used_percent: f64, threshold_percent: u32) -> bool {
    used_percent < f64::from(threshold_percent)
}

/// Seconds until the next wall-clock hour boundary (1..=3600).
pub fn secs_until_next_hour(now: DateTime<Utc>) -> u64 {
    let into_hour = u64::from(now.minute() * 60 + now.second());
    3600 - into_hour
}
