//! Date and timestamp parsing shared by extraction and validation
//!
//! Legacy rows carry dates in several shapes: ISO strings with or without a
//! time part, `YYYY-MM-DD HH:MM:SS`, Italian `DD/MM/YYYY`, and packed
//! `YYYYMMDD` integers.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y%m%d", "%d/%m/%Y"];

/// Parse a date or timestamp string
///
/// Date-only values resolve to midnight. Offsets are converted to UTC.
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    parse_timestamp_only(value)
        .or_else(|| parse_date_only(value).and_then(|date| date.and_hms_opt(0, 0, 0)))
}

/// Parse a date, accepting any of the supported timestamp shapes
///
/// The time part of a timestamp is dropped.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    parse_date_only(value).or_else(|| parse_timestamp_only(value).map(|dt| dt.date()))
}

fn parse_timestamp_only(value: &str) -> Option<NaiveDateTime> {
    if value.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc).naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
}

fn parse_date_only(value: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
}

/// Interpret a packed `YYYYMMDD` integer
pub fn date_from_packed(value: i64) -> Option<NaiveDate> {
    if !(10_000_101..=99_991_231).contains(&value) {
        return None;
    }
    let year = (value / 10_000) as i32;
    let month = ((value / 100) % 100) as u32;
    let day = (value % 100) as u32;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Format a date as `YYYY-MM-DD`
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Format a naive UTC timestamp as ISO-8601 with a `Z` suffix
pub fn format_timestamp(timestamp: NaiveDateTime) -> String {
    timestamp
        .and_utc()
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Format a UTC timestamp as ISO-8601 with a `Z` suffix
pub fn format_utc(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}
