//! Stale-order detection against the exchange clock.
//!
//! Drift is measured from the order's server-assigned insertion time to
//! the server time reported by `/ping`, so local clock skew never enters.

use chrono::{DateTime, Utc};

use crate::types::{CancelFilter, Order};

/// Milliseconds between insertion and the given server time (ns).
pub fn drift_ms(server_time_ns: i64, inserted_at: DateTime<Utc>) -> i64 {
    server_time_ns / 1_000_000 - inserted_at.timestamp_millis()
}

/// An order is stale once |drift| strictly exceeds the threshold.
pub fn is_stale(drift_ms: i64, threshold_ms: u64) -> bool {
    drift_ms.unsigned_abs() > threshold_ms
}

/// Orders the canceller should cancel, with their drift, in input order.
pub fn select_stale<'a>(
    orders: &'a [Order],
    filter: CancelFilter,
    server_time_ns: i64,
    threshold_ms: u64,
) -> Vec<(&'a Order, i64)> {
    orders
        .iter()
        .filter(|o| filter.matches(o.side))
        .map(|o| (o, drift_ms(server_time_ns, o.inserted_at)))
        .filter(|(_, drift)| is_stale(*drift, threshold_ms))
        .collect()
}
