//! Timestamp utilities

use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Format used for the timestamp portion of run ids (fixed width, sorts lexically)
pub const RUN_ID_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3fZ";

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Get current UTC calendar date
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Whole calendar days from the date of `timestamp` to `date`
///
/// Negative when `timestamp` falls after `date`.
pub fn days_since(timestamp: DateTime<Utc>, date: NaiveDate) -> i64 {
    (date - timestamp.date_naive()).num_days()
}

/// Duration expressed as fractional days
pub fn duration_in_days(duration: Duration) -> f64 {
    duration.num_seconds() as f64 / 86_400.0
}

/// Render the timestamp portion of a run id
pub fn run_id_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format(RUN_ID_TIMESTAMP_FORMAT).to_string()
}
