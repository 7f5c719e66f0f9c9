//! Timestamp conversions between `chrono` and the millisecond integers
//! stored in SQLite.

use chrono::{DateTime, TimeDelta, Utc};

/// Current time as unix milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert a timestamp to unix milliseconds.
pub fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// Convert stored unix milliseconds back to a timestamp.
///
/// Out-of-range values clamp to the unix epoch.
pub fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::UNIX_EPOCH)
}

/// Convert a `std::time::Duration` TTL to whole milliseconds.
pub fn ttl_millis(ttl: std::time::Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

/// The instant `ttl` after `from`, saturating at the latest representable
/// time.
pub fn expires_after(from: DateTime<Utc>, ttl: std::time::Duration) -> DateTime<Utc> {
    TimeDelta::try_milliseconds(ttl_millis(ttl))
        .and_then(|delta| from.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
