use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

/// Format a date as the `YYYY-MM-DD` key used by every date column.
pub fn date_key(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

/// Canonical UTC form of every stored event timestamp. Being fixed-width
/// with a `Z` suffix, it sorts and compares correctly as text against
/// `YYYY-MM-DD` bounds.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Parse an RFC 3339 timestamp with any offset and re-render it in UTC.
pub fn normalize_timestamp(raw: &str) -> Option<String> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc).format(TIMESTAMP_FORMAT).to_string())
}

/// Inclusive bounds of a trailing window of `days` calendar days ending on `as_of`.
/// A zero-day window is treated as a single day.
pub fn window_bounds(as_of: NaiveDate, days: u32) -> (NaiveDate, NaiveDate) {
    let span = days.max(1) as i64 - 1;
    (as_of - Duration::days(span), as_of)
}

/// Day of week with Sunday = 0 through Saturday = 6.
pub fn day_of_week(d: NaiveDate) -> u8 {
    d.weekday().num_days_from_sunday() as u8
}

/// Convert a Unix timestamp (seconds) to an RFC 3339 string in UTC.
pub fn unix_to_rfc3339(ts: i64) -> Option<String> {
    chrono::DateTime::from_timestamp(ts, 0).map(|dt| dt.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_window_bounds() {
        assert_eq!(window_bounds(d(2025, 3, 31), 7), (d(2025, 3, 25), d(2025, 3, 31)));
        assert_eq!(window_bounds(d(2025, 3, 1), 30), (d(2025, 1, 31), d(2025, 3, 1)));
        assert_eq!(window_bounds(d(2025, 3, 1), 1), (d(2025, 3, 1), d(2025, 3, 1)));
        assert_eq!(window_bounds(d(2025, 3, 1), 0), (d(2025, 3, 1), d(2025, 3, 1)));
    }

    #[test]
    fn test_day_of_week() {
        // 2025-01-05 was a Sunday
        assert_eq!(day_of_week(d(2025, 1, 5)), 0);
        assert_eq!(day_of_week(d(2025, 1, 6)), 1);
        assert_eq!(day_of_week(d(2025, 1, 11)), 6);
    }

    #[test]
    fn test_normalize_timestamp() {
        assert_eq!(
            normalize_timestamp("2025-01-15T10:30:00.000Z").as_deref(),
            Some("2025-01-15T10:30:00Z")
        );
        // Offsets move the event onto its UTC day.
        assert_eq!(
            normalize_timestamp("2025-02-01T01:00:00+05:00").as_deref(),
            Some("2025-01-31T20:00:00Z")
        );
        assert_eq!(
            normalize_timestamp("2025-01-31T22:00:00-05:00").as_deref(),
            Some("2025-02-01T03:00:00Z")
        );
        assert_eq!(normalize_timestamp("2025-01-15"), None);
        assert_eq!(normalize_timestamp("yesterday"), None);
        assert_eq!(normalize_timestamp("2025-01-1é"), None);
    }

    #[test]
    fn test_unix_to_rfc3339() {
        assert_eq!(
            unix_to_rfc3339(1_735_689_600).as_deref(),
            Some("2025-01-01T00:00:00+00:00")
        );
    }
}
