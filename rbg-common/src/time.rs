//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> std::time::Duration {
    std::time::Duration::from_millis(millis)
}

/// Seconds since the Unix epoch, with sub-second precision
///
/// The backend reports timestamps (e.g. `session_start`) in this form.
pub fn unix_seconds(timestamp: DateTime<Utc>) -> f64 {
    timestamp.timestamp_millis() as f64 / 1000.0
}

/// Elapsed seconds between two timestamps, never negative
pub fn elapsed_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let millis = (end - start).num_milliseconds().max(0);
    millis as f64 / 1000.0
}
