//! Common time helpers for charger_core.

use std::time::Duration;

/// Number of milliseconds in one second.
pub const MILLIS_PER_SEC: u64 = 1_000;

/// Duration as whole milliseconds, clamped to at least 1 ms so interval
/// arithmetic never degenerates to a zero period.
#[inline]
pub fn interval_ms(d: Duration) -> u64 {
    let ms = d.as_millis().min(u128::from(u64::MAX)) as u64;
    ms.max(1)
}

/// Milliseconds as fractional seconds.
#[inline]
pub fn ms_to_secs(ms: u64) -> f64 {
    ms as f64 / MILLIS_PER_SEC as f64
}
