//! Timestamp utilities
//!
//! Reservation times are wall-clock values as the booking channels report
//! them, so they are stored as `NaiveDateTime` in a fixed text format.

use chrono::{DateTime, Local, NaiveDateTime, Utc};

/// Storage format for reservation timestamps
pub const STORAGE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current wall-clock time, used when upstream omits a booking time
pub fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> std::time::Duration {
    std::time::Duration::from_millis(millis)
}

/// Format a wall-clock timestamp for storage
pub fn to_storage(ts: &NaiveDateTime) -> String {
    ts.format(STORAGE_FORMAT).to_string()
}

/// Parse a stored wall-clock timestamp
pub fn from_storage(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, STORAGE_FORMAT).ok()
}
