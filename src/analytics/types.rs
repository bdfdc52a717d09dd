use serde::Serialize;

/// Readers and opens of one segment on one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyStat {
    pub date: String,
    pub segment: String,
    pub unique_readers: u64,
    pub total_opens: u64,
    /// 0 = Sunday through 6 = Saturday.
    pub day_of_week: u8,
}

/// Readers and opens of one segment over a trailing window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodStat {
    pub period_days: u32,
    pub segment: String,
    pub unique_readers: u64,
    pub total_opens: u64,
    pub window_start: String,
    pub window_end: String,
}

/// Readers split by which of the two segments they engaged with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlapStat {
    pub period_days: u32,
    pub segment_a: String,
    pub segment_b: String,
    pub both_users: u64,
    pub a_only_users: u64,
    pub b_only_users: u64,
    pub both_opens: u64,
    pub a_only_opens: u64,
    pub b_only_opens: u64,
    pub total_unique_users: u64,
    pub both_pct: f64,
    pub a_only_pct: f64,
    pub b_only_pct: f64,
    pub window_start: String,
    pub window_end: String,
}

/// Revenue attributed to one overlap class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ClassRevenue {
    pub users: u64,
    pub opens: u64,
    pub revenue: f64,
    /// Revenue per user.
    pub ltv: f64,
    /// Revenue per thousand opens.
    pub rpm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlapRevenue {
    pub period_days: u32,
    pub segment_a: String,
    pub segment_b: String,
    pub total_revenue: f64,
    pub total_opens: u64,
    pub both: ClassRevenue,
    pub a_only: ClassRevenue,
    pub b_only: ClassRevenue,
    pub window_start: String,
    pub window_end: String,
}

/// One segment's line in a period summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentSummary {
    pub segment: String,
    pub unique_readers: u64,
    pub total_opens: u64,
    pub revenue: f64,
    pub rpm: f64,
}

/// Cached period stats joined with the revenue recorded in the window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodSummary {
    pub period_days: u32,
    pub window_start: Option<String>,
    pub window_end: Option<String>,
    pub segments: Vec<SegmentSummary>,
    pub total_opens: u64,
    pub total_revenue: f64,
    pub blended_rpm: f64,
}

/// Average engagement of one segment on one weekday.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekdayStat {
    pub day_of_week: u8,
    pub day_name: String,
    pub segment: String,
    pub days_observed: u64,
    pub avg_unique_readers: f64,
    pub avg_opens: f64,
}

/// Revenue per thousand opens, 0 when there were no opens.
pub fn rpm(revenue: f64, opens: u64) -> f64 {
    if opens == 0 {
        0.0
    } else {
        revenue / opens as f64 * 1000.0
    }
}

/// `part / whole` as a percentage, 0 when `whole` is 0.
pub fn pct(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

pub fn weekday_name(day_of_week: u8) -> &'static str {
    match day_of_week {
        0 => "Sunday",
        1 => "Monday",
        2 => "Tuesday",
        3 => "Wednesday",
        4 => "Thursday",
        5 => "Friday",
        6 => "Saturday",
        _ => "Unknown",
    }
}
