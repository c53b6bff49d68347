//! Timestamp handling for stored rows.
//!
//! Everything is persisted as `YYYY-MM-DDTHH:MM:SSZ` in UTC so that string
//! comparison in SQL matches chronological order.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::errors::DeskError;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Which end of the day a date-only input expands to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayBound {
    Start,
    End,
}

pub fn format_ts(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored or user-supplied timestamp. Accepts RFC 3339 with any
/// offset, SQLite's `YYYY-MM-DD HH:MM:SS`, and bare dates (start of day).
pub fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("Invalid timestamp '{}'", raw))?;
    Ok(date.and_time(NaiveTime::MIN).and_utc())
}

/// Normalize user input to the stored format. A bare date expands to the
/// start or end of that day.
pub fn normalize_input(raw: &str, bound: DayBound) -> Result<String, DeskError> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let time = match bound {
            DayBound::Start => NaiveTime::MIN,
            DayBound::End => NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN),
        };
        return Ok(format_ts(date.and_time(time).and_utc()));
    }
    parse_ts(raw)
        .map(format_ts)
        .map_err(|_| DeskError::validation(format!("Invalid date or timestamp '{}'", raw)))
}

/// Signed hours from `expected` to `actual`; positive means late.
pub fn hours_between(expected: DateTime<Utc>, actual: DateTime<Utc>) -> f64 {
    (actual - expected).num_seconds() as f64 / 3600.0
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
