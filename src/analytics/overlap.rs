use rusqlite::{params, Connection};

use super::types::{pct, rpm, ClassRevenue, OverlapRevenue, OverlapStat};
use crate::window::Window;

/// Opens of one reader in each segment of the pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderActivity {
    pub a_opens: u64,
    pub b_opens: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentClass {
    Both,
    AOnly,
    BOnly,
}

/// Place a reader in exactly one class. `None` for a reader with no
/// qualifying activity in either segment.
pub fn classify(activity: &ReaderActivity) -> Option<SegmentClass> {
    match (activity.a_opens > 0, activity.b_opens > 0) {
        (true, true) => Some(SegmentClass::Both),
        (true, false) => Some(SegmentClass::AOnly),
        (false, true) => Some(SegmentClass::BOnly),
        (false, false) => None,
    }
}

/// Users and opens per overlap class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverlapCounts {
    pub both_users: u64,
    pub a_only_users: u64,
    pub b_only_users: u64,
    pub both_opens: u64,
    pub a_only_opens: u64,
    pub b_only_opens: u64,
}

impl OverlapCounts {
    pub fn from_readers<'a>(readers: impl IntoIterator<Item = &'a ReaderActivity>) -> Self {
        let mut counts = Self::default();
        for reader in readers {
            let opens = reader.a_opens + reader.b_opens;
            match classify(reader) {
                Some(SegmentClass::Both) => {
                    counts.both_users += 1;
                    counts.both_opens += opens;
                }
                Some(SegmentClass::AOnly) => {
                    counts.a_only_users += 1;
                    counts.a_only_opens += opens;
                }
                Some(SegmentClass::BOnly) => {
                    counts.b_only_users += 1;
                    counts.b_only_opens += opens;
                }
                None => {}
            }
        }
        counts
    }

    pub fn total_users(&self) -> u64 {
        self.both_users + self.a_only_users + self.b_only_users
    }

    pub fn total_opens(&self) -> u64 {
        self.both_opens + self.a_only_opens + self.b_only_opens
    }
}

/// Per-reader opens in segments `a` and `b` over the window. Only events with
/// at least one open qualify.
pub fn load_reader_activity(
    conn: &Connection,
    segment_a: &str,
    segment_b: &str,
    window: &Window,
) -> Result<Vec<ReaderActivity>, rusqlite::Error> {
    let (start, end) = window.timestamp_bounds();
    let mut stmt = conn.prepare(
        "SELECT
            COALESCE(SUM(CASE WHEN segment = ?1 THEN open_count ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN segment = ?2 THEN open_count ELSE 0 END), 0)
         FROM raw_events
         WHERE segment IN (?1, ?2)
           AND open_count >= 1
           AND occurred_at >= ?3 AND occurred_at < ?4
         GROUP BY reader_id",
    )?;
    let rows = stmt.query_map(params![segment_a, segment_b, start, end], |row| {
        Ok(ReaderActivity {
            a_opens: row.get::<_, i64>(0)? as u64,
            b_opens: row.get::<_, i64>(1)? as u64,
        })
    })?;
    rows.collect()
}

/// Partition the window's readers into both / A-only / B-only.
pub fn compute_overlap(
    conn: &Connection,
    segment_a: &str,
    segment_b: &str,
    window: &Window,
) -> Result<OverlapStat, rusqlite::Error> {
    let readers = load_reader_activity(conn, segment_a, segment_b, window)?;
    let counts = OverlapCounts::from_readers(&readers);
    let (window_start, window_end) = window.key_range();
    Ok(overlap_stat(window.days, segment_a, segment_b, &counts, window_start, window_end))
}

pub fn overlap_stat(
    period_days: u32,
    segment_a: &str,
    segment_b: &str,
    counts: &OverlapCounts,
    window_start: String,
    window_end: String,
) -> OverlapStat {
    let total = counts.total_users();
    OverlapStat {
        period_days,
        segment_a: segment_a.to_string(),
        segment_b: segment_b.to_string(),
        both_users: counts.both_users,
        a_only_users: counts.a_only_users,
        b_only_users: counts.b_only_users,
        both_opens: counts.both_opens,
        a_only_opens: counts.a_only_opens,
        b_only_opens: counts.b_only_opens,
        total_unique_users: total,
        both_pct: pct(counts.both_users, total),
        a_only_pct: pct(counts.a_only_users, total),
        b_only_pct: pct(counts.b_only_users, total),
        window_start,
        window_end,
    }
}

fn class_revenue(users: u64, opens: u64, total_opens: u64, total_revenue: f64) -> ClassRevenue {
    let revenue = if total_opens == 0 {
        0.0
    } else {
        total_revenue * opens as f64 / total_opens as f64
    };
    ClassRevenue {
        users,
        opens,
        revenue,
        ltv: if users == 0 { 0.0 } else { revenue / users as f64 },
        rpm: rpm(revenue, opens),
    }
}

/// Split `total_revenue` across the overlap classes by their share of opens.
pub fn attribute_revenue(stat: &OverlapStat, total_revenue: f64) -> OverlapRevenue {
    let total_opens = stat.both_opens + stat.a_only_opens + stat.b_only_opens;
    OverlapRevenue {
        period_days: stat.period_days,
        segment_a: stat.segment_a.clone(),
        segment_b: stat.segment_b.clone(),
        total_revenue,
        total_opens,
        both: class_revenue(stat.both_users, stat.both_opens, total_opens, total_revenue),
        a_only: class_revenue(stat.a_only_users, stat.a_only_opens, total_opens, total_revenue),
        b_only: class_revenue(stat.b_only_users, stat.b_only_opens, total_opens, total_revenue),
        window_start: stat.window_start.clone(),
        window_end: stat.window_end.clone(),
    }
}
