use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::date_util::{date_key, window_bounds};
use crate::error::{Error, Result};

static RE_DAYS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{1,4})\s*[dD]?$").unwrap());

/// Longest trailing window accepted anywhere (about five years).
pub const MAX_WINDOW_DAYS: u32 = 1825;

/// A trailing window of whole days ending on `as_of`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub days: u32,
    pub as_of: NaiveDate,
}

impl Window {
    pub fn new(days: u32, as_of: NaiveDate) -> Self {
        Self { days, as_of }
    }

    /// Window of `days` ending today. Event days are UTC calendar days.
    pub fn ending_today(days: u32) -> Self {
        Self::new(days, chrono::Utc::now().date_naive())
    }

    /// Parse a window length.
    ///
    /// Supported formats:
    /// - `30d` / `30D`: 30 days
    /// - `30`: 30 days
    pub fn parse_days(s: &str) -> Result<u32> {
        let s = s.trim();
        let caps = RE_DAYS
            .captures(s)
            .ok_or_else(|| Error::WindowParse(format!("unrecognized window: {s}")))?;
        let days: u32 = caps[1]
            .parse()
            .map_err(|_| Error::WindowParse(format!("invalid day count: {s}")))?;
        if days == 0 || days > MAX_WINDOW_DAYS {
            return Err(Error::WindowParse(format!(
                "window must be between 1 and {MAX_WINDOW_DAYS} days: {s}"
            )));
        }
        Ok(days)
    }

    /// Parse a comma-separated list such as `7d,30d,90d`. Duplicates are dropped,
    /// order is ascending.
    pub fn parse_list(s: &str) -> Result<Vec<u32>> {
        let mut days = s
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(Self::parse_days)
            .collect::<Result<Vec<u32>>>()?;
        days.sort_unstable();
        days.dedup();
        if days.is_empty() {
            return Err(Error::WindowParse(format!("no windows in: {s}")));
        }
        Ok(days)
    }

    /// Inclusive `(start, end)` dates.
    pub fn date_range(&self) -> (NaiveDate, NaiveDate) {
        window_bounds(self.as_of, self.days)
    }

    /// Inclusive `(start, end)` as `YYYY-MM-DD` keys.
    pub fn key_range(&self) -> (String, String) {
        let (start, end) = self.date_range();
        (date_key(start), date_key(end))
    }

    /// Half-open `[start, end)` bounds for comparing ISO-8601 timestamps:
    /// the first day of the window and the day after its last.
    pub fn timestamp_bounds(&self) -> (String, String) {
        let (start, end) = self.date_range();
        let after = end.succ_opt().unwrap_or(end);
        (date_key(start), date_key(after))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_days() {
        assert_eq!(Window::parse_days("30d").unwrap(), 30);
        assert_eq!(Window::parse_days("7D").unwrap(), 7);
        assert_eq!(Window::parse_days(" 90 ").unwrap(), 90);
    }

    #[test]
    fn test_parse_days_rejects_garbage() {
        assert!(Window::parse_days("").is_err());
        assert!(Window::parse_days("0d").is_err());
        assert!(Window::parse_days("abc").is_err());
        assert!(Window::parse_days("-5d").is_err());
        assert!(Window::parse_days("9999d").is_err());
    }

    #[test]
    fn test_parse_list_sorted_and_deduped() {
        assert_eq!(Window::parse_list("90d,7d,30d,7").unwrap(), vec![7, 30, 90]);
        assert!(Window::parse_list(" , ").is_err());
    }

    #[test]
    fn test_key_range() {
        let w = Window::new(7, NaiveDate::from_ymd_opt(2025, 3, 31).unwrap());
        assert_eq!(
            w.key_range(),
            ("2025-03-25".to_string(), "2025-03-31".to_string())
        );
    }

    #[test]
    fn test_timestamp_bounds_are_half_open() {
        let w = Window::new(30, NaiveDate::from_ymd_opt(2025, 1, 31).unwrap());
        let (start, end) = w.timestamp_bounds();
        assert_eq!(start, "2025-01-02");
        assert_eq!(end, "2025-02-01");
        assert!("2025-01-31T23:59:59Z" < end.as_str());
        assert!("2025-01-02T00:00:00Z" >= start.as_str());
    }
}
