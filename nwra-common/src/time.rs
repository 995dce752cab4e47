//! Timestamp utilities

use chrono::{DateTime, Local, Utc};
use std::time::SystemTime;

/// Timestamp format used in provenance records and log messages
pub const DATEFMT: &str = "%Y-%m-%dT%H:%M:%S";

/// Compact timestamp format used in archived and datestamped filenames
pub const FILE_DATEFMT: &str = "%Y%m%d%H%M";

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert a filesystem timestamp to UTC
pub fn from_system_time(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

/// Format a timestamp in local time using [`DATEFMT`]
pub fn format_local(timestamp: DateTime<Utc>) -> String {
    timestamp.with_timezone(&Local).format(DATEFMT).to_string()
}

/// Format a timestamp in local time using [`FILE_DATEFMT`]
pub fn file_stamp(timestamp: DateTime<Utc>) -> String {
    timestamp.with_timezone(&Local).format(FILE_DATEFMT).to_string()
}
