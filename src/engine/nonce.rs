//! Request nonces for authenticated calls.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Strictly increasing nonces based on wall-clock nanoseconds.
///
/// Two calls never return the same value, even from concurrent tasks or
/// when the clock stalls or steps backwards.
#[derive(Debug, Default)]
pub struct NonceSource {
    last: AtomicI64,
}

impl NonceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> i64 {
        let now = now_nanos();
        let prev = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        now.max(prev + 1)
    }
}

fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
