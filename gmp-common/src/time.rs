//! Timestamp utilities

use chrono::{DateTime, Utc};

use crate::{Error, Result};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> std::time::Duration {
    std::time::Duration::from_millis(millis)
}

/// Format a timestamp the way it is stored in SQLite (RFC 3339, UTC, millis)
pub fn to_storage(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Parse an RFC 3339 timestamp into UTC
pub fn parse_rfc3339(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::InvalidTimestamp {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

/// Absolute distance between two instants in whole seconds, rounded up
///
/// Sub-second remainders count as a full second so a candidate never sneaks
/// inside a seconds-based window through truncation.
pub fn abs_seconds_between(a: &DateTime<Utc>, b: &DateTime<Utc>) -> i64 {
    let millis = (*a - *b).num_milliseconds().abs();
    (millis + 999) / 1000
}
