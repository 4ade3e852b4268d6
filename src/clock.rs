// Clock - wall-clock milliseconds for stamping transactions and markets
//
// Domain operations never read the clock themselves; callers pass `now`
// so tests can drive time explicitly.

use chrono::{DateTime, Utc};

/// Current unix time in milliseconds
pub fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Render a millisecond timestamp for display
pub fn format_millis(millis: u64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(millis as i64) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => millis.to_string(),
    }
}
