//! # Time Utilities
//!
//! Utilities for time formatting, parsing, and the daily UTC-midnight series used
//! by historical backfills.

use chrono::{DateTime, Duration, TimeZone, Utc};

/// Get current UTC time.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Format time as RFC3339 string.
pub fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339()
}

/// Parse an RFC3339 string to a UTC `DateTime`.
pub fn parse_utc(moment: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(moment)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| Error::FailToDateParse(moment.to_string()))
}

/// Truncate a timestamp down to UTC midnight of the same day.
pub fn truncate_to_utc_midnight(ts: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(ts.year(), ts.month(), ts.day(), 0, 0, 0)
        .single()
        .unwrap_or(ts)
}

use chrono::Datelike;

/// Generate the inclusive daily UTC-midnight timestamp series between `start` and `end`.
///
/// Both endpoints are first truncated to UTC midnight. The series always contains at
/// least one entry (when `start` truncates to the same day as `end`).
pub fn daily_utc_midnights(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    let start = truncate_to_utc_midnight(start);
    let end = truncate_to_utc_midnight(end);

    let mut series = Vec::new();
    let mut cursor = start;
    while cursor <= end {
        series.push(cursor);
        cursor += Duration::days(1);
    }
    series
}

// region:    --- Error
#[derive(Debug)]
pub enum Error {
    FailToDateParse(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "{self:?}")
    }
}

impl std::error::Error for Error {}
// endregion: --- Error

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn daily_series_is_inclusive_and_midnight_aligned() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 13, 30, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 4, 2, 0, 0).unwrap();
        let series = daily_utc_midnights(start, end);
        assert_eq!(series.len(), 4);
        for ts in &series {
            assert_eq!(ts.hour(), 0);
            assert_eq!(ts.minute(), 0);
            assert_eq!(ts.second(), 0);
        }
        assert_eq!(series.first().unwrap().day(), 1);
        assert_eq!(series.last().unwrap().day(), 4);
    }

    #[test]
    fn single_day_series_has_one_entry() {
        let day = Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap();
        let series = daily_utc_midnights(day, day);
        assert_eq!(series.len(), 1);
    }
}
