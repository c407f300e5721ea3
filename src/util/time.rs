//! Date parsing and formatting for due dates.
//!
//! Both services speak slightly different date dialects: one sends plain
//! `YYYY-MM-DD` dates (or local datetimes for timed tasks), the other an
//! RFC3339 timestamp pinned to midnight UTC. Everything is reduced to a
//! calendar date before comparison.

use crate::error::{Result, SyncError};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Wire format used when writing a due date to the list service.
pub const DUE_FORMAT: &str = "%Y-%m-%dT00:00:00.000Z";

/// Parse a due or deadline value into a calendar date.
///
/// Supports:
/// - Simple date: `2025-01-15`
/// - RFC3339: `2025-01-15T00:00:00.000Z`, `2025-01-15T09:30:00+02:00`
/// - Naive datetime: `2025-01-15T09:30:00`
///
/// RFC3339 values are reduced to their UTC date.
///
/// # Errors
///
/// Returns a `Data` error naming `record_id` and `field` when the value
/// matches none of the formats.
pub fn parse_due_date(value: &str, record_id: &str, field: &str) -> Result<NaiveDate> {
    let value = value.trim();

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc).date_naive());
    }

    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(dt.date());
        }
    }

    Err(SyncError::data(
        record_id,
        field,
        format!("unrecognized date '{value}'"),
    ))
}

/// Format a calendar date the way the list service stores due dates.
#[must_use]
pub fn format_due(date: NaiveDate) -> String {
    date.format(DUE_FORMAT).to_string()
}

/// Whole days from `today` until `date` (negative when overdue).
#[must_use]
pub fn days_until(date: NaiveDate, today: NaiveDate) -> i64 {
    (date - today).num_days()
}
