//! Absolute times are epoch milliseconds stored in an `i64`.
//! `i64::MAX` is the largest representable absolute time; arithmetic
//! saturates instead of wrapping.

use std::time::Duration;

use chrono::Utc;

pub const MAX_TIME_MS: i64 = i64::MAX;

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Absolute expiry for a relative TTL plus an uplift, clamped to `MAX_TIME_MS`.
pub fn expiry_from_ttl(ttl_ms: u64, uplift_ms: u64) -> i64 {
    let ttl = i64::try_from(ttl_ms).unwrap_or(MAX_TIME_MS);
    let uplift = i64::try_from(uplift_ms).unwrap_or(MAX_TIME_MS);
    now_ms().saturating_add(ttl).saturating_add(uplift)
}

/// Milliseconds from now until `deadline_ms`, zero if it already passed.
pub fn remaining_ms(deadline_ms: i64) -> u64 {
    u64::try_from(deadline_ms.saturating_sub(now_ms())).unwrap_or(0)
}

pub fn duration_until(deadline_ms: i64) -> Duration {
    Duration::from_millis(remaining_ms(deadline_ms))
}

pub fn millis(ms: i64) -> Duration {
    Duration::from_millis(u64::try_from(ms).unwrap_or(0))
}
