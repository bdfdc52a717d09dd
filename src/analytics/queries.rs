use std::collections::BTreeMap;

use rusqlite::{params, Connection, OptionalExtension};

use super::overlap::attribute_revenue;
use super::types::{
    rpm, weekday_name, DailyStat, OverlapRevenue, OverlapStat, PeriodSummary, SegmentSummary,
    WeekdayStat,
};
use crate::storage::repository;
use crate::window::Window;

/// Cached period stats for `period_days`, joined with the revenue recorded
/// in the same window. Segments that earned revenue but had no readers are
/// listed with zero readers.
pub fn period_summary(conn: &Connection, period_days: u32) -> Result<PeriodSummary, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT segment, unique_readers, total_opens, window_start, window_end
         FROM cache_period_stats WHERE period_days = ?1 ORDER BY segment",
    )?;
    let rows = stmt
        .query_map(params![period_days], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)? as u64,
                row.get::<_, i64>(2)? as u64,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let Some((_, _, _, window_start, window_end)) = rows.first().cloned() else {
        return Ok(PeriodSummary {
            period_days,
            window_start: None,
            window_end: None,
            segments: Vec::new(),
            total_opens: 0,
            total_revenue: 0.0,
            blended_rpm: 0.0,
        });
    };

    let mut by_segment: BTreeMap<String, (u64, u64, f64)> = rows
        .into_iter()
        .map(|(segment, readers, opens, _, _)| (segment, (readers, opens, 0.0)))
        .collect();
    for (segment, revenue) in repository::revenue_by_segment(conn, &window_start, &window_end)? {
        by_segment.entry(segment).or_insert((0, 0, 0.0)).2 = revenue;
    }

    let segments: Vec<SegmentSummary> = by_segment
        .into_iter()
        .map(|(segment, (unique_readers, total_opens, revenue))| SegmentSummary {
            segment,
            unique_readers,
            total_opens,
            revenue,
            rpm: rpm(revenue, total_opens),
        })
        .collect();
    let total_opens = segments.iter().map(|s| s.total_opens).sum();
    let total_revenue = repository::sum_revenue(conn, &window_start, &window_end)?;

    Ok(PeriodSummary {
        period_days,
        window_start: Some(window_start),
        window_end: Some(window_end),
        segments,
        total_opens,
        total_revenue,
        blended_rpm: rpm(total_revenue, total_opens),
    })
}

pub fn overlap_stat(conn: &Connection, period_days: u32) -> Result<Option<OverlapStat>, rusqlite::Error> {
    conn.query_row(
        "SELECT segment_a, segment_b, both_users, a_only_users, b_only_users,
                both_opens, a_only_opens, b_only_opens, total_unique_users,
                both_pct, a_only_pct, b_only_pct, window_start, window_end
         FROM cache_overlap_stats WHERE period_days = ?1",
        params![period_days],
        |row| {
            Ok(OverlapStat {
                period_days,
                segment_a: row.get(0)?,
                segment_b: row.get(1)?,
                both_users: row.get::<_, i64>(2)? as u64,
                a_only_users: row.get::<_, i64>(3)? as u64,
                b_only_users: row.get::<_, i64>(4)? as u64,
                both_opens: row.get::<_, i64>(5)? as u64,
                a_only_opens: row.get::<_, i64>(6)? as u64,
                b_only_opens: row.get::<_, i64>(7)? as u64,
                total_unique_users: row.get::<_, i64>(8)? as u64,
                both_pct: row.get(9)?,
                a_only_pct: row.get(10)?,
                b_only_pct: row.get(11)?,
                window_start: row.get(12)?,
                window_end: row.get(13)?,
            })
        },
    )
    .optional()
}

/// The cached overlap split with the window's revenue attributed to it.
pub fn overlap_revenue(conn: &Connection, period_days: u32) -> Result<Option<OverlapRevenue>, rusqlite::Error> {
    let Some(stat) = overlap_stat(conn, period_days)? else {
        return Ok(None);
    };
    let total = repository::sum_revenue(conn, &stat.window_start, &stat.window_end)?;
    Ok(Some(attribute_revenue(&stat, total)))
}

/// Cached daily rows inside `window`, oldest first.
pub fn daily_stats(conn: &Connection, window: &Window) -> Result<Vec<DailyStat>, rusqlite::Error> {
    let (start, end) = window.key_range();
    let mut stmt = conn.prepare(
        "SELECT stat_date, segment, unique_readers, total_opens, day_of_week
         FROM cache_daily_stats
         WHERE stat_date >= ?1 AND stat_date <= ?2
         ORDER BY stat_date, segment",
    )?;
    let rows = stmt.query_map(params![start, end], |row| {
        Ok(DailyStat {
            date: row.get(0)?,
            segment: row.get(1)?,
            unique_readers: row.get::<_, i64>(2)? as u64,
            total_opens: row.get::<_, i64>(3)? as u64,
            day_of_week: row.get(4)?,
        })
    })?;
    rows.collect()
}

/// Per-weekday averages of the cached daily rows inside `window`.
pub fn weekday_stats(conn: &Connection, window: &Window) -> Result<Vec<WeekdayStat>, rusqlite::Error> {
    let (start, end) = window.key_range();
    let mut stmt = conn.prepare(
        "SELECT day_of_week, segment, COUNT(*), AVG(unique_readers), AVG(total_opens)
         FROM cache_daily_stats
         WHERE stat_date >= ?1 AND stat_date <= ?2
         GROUP BY day_of_week, segment
         ORDER BY day_of_week, segment",
    )?;
    let rows = stmt.query_map(params![start, end], |row| {
        let day_of_week: u8 = row.get(0)?;
        Ok(WeekdayStat {
            day_of_week,
            day_name: weekday_name(day_of_week).to_string(),
            segment: row.get(1)?,
            days_observed: row.get::<_, i64>(2)? as u64,
            avg_unique_readers: row.get(3)?,
            avg_opens: row.get(4)?,
        })
    })?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::refresh::{refresh_caches, RefreshOptions};
    use crate::config::AnalyticsConfig;
    use crate::storage::repository::{insert_event, upsert_revenue, RawEvent, RevenueRecord};
    use crate::storage::Database;
    use chrono::NaiveDate;

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 31).unwrap()
    }

    async fn refreshed() -> Database {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                let events = [
                    ("a@x.com", "morning", "2025-01-27T07:00:00Z", 2),
                    ("a@x.com", "night", "2025-01-27T21:00:00Z", 1),
                    ("b@x.com", "night", "2025-01-28T21:00:00Z", 1),
                    ("c@x.com", "morning", "2025-01-28T07:00:00Z", 4),
                    ("a@x.com", "morning", "2025-01-20T07:00:00Z", 2),
                ];
                for (reader, segment, at, opens) in events {
                    insert_event(
                        conn,
                        &RawEvent {
                            reader_id: reader.into(),
                            content_id: "post".into(),
                            segment: segment.into(),
                            occurred_at: at.into(),
                            open_count: opens,
                        },
                    )?;
                }
                for (date, segment, revenue) in [
                    ("2025-01-27", "morning", 60.0),
                    ("2025-01-28", "night", 20.0),
                    ("2025-01-28", "sponsor", 10.0),
                    ("2024-12-01", "morning", 999.0),
                ] {
                    upsert_revenue(
                        conn,
                        &RevenueRecord {
                            date: date.into(),
                            segment: segment.into(),
                            revenue,
                        },
                    )?;
                }
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();

        let opts = RefreshOptions {
            as_of: Some(as_of()),
            ..Default::default()
        };
        let result = refresh_caches(&db, &AnalyticsConfig::default(), &opts).await;
        assert!(result.all_succeeded());
        db
    }

    #[tokio::test]
    async fn test_period_summary_joins_revenue() {
        let db = refreshed().await;
        let summary = db
            .reader()
            .call(|conn| period_summary(conn, 7))
            .await
            .unwrap();

        assert_eq!(summary.window_start.as_deref(), Some("2025-01-25"));
        assert_eq!(summary.window_end.as_deref(), Some("2025-01-31"));
        assert_eq!(summary.total_opens, 8);
        assert_eq!(summary.total_revenue, 90.0);
        assert_eq!(summary.blended_rpm, 90.0 / 8.0 * 1000.0);

        let segments: Vec<&str> = summary.segments.iter().map(|s| s.segment.as_str()).collect();
        assert_eq!(segments, vec!["morning", "night", "sponsor"]);
        let morning = &summary.segments[0];
        assert_eq!(morning.unique_readers, 2);
        assert_eq!(morning.total_opens, 6);
        assert_eq!(morning.revenue, 60.0);
        assert_eq!(morning.rpm, 10_000.0);
        assert_eq!(summary.segments[2].unique_readers, 0);
        assert_eq!(summary.segments[2].rpm, 0.0);
    }

    #[tokio::test]
    async fn test_unknown_period_is_empty() {
        let db = refreshed().await;
        let (summary, overlap) = db
            .reader()
            .call(|conn| Ok::<_, rusqlite::Error>((period_summary(conn, 14)?, overlap_revenue(conn, 14)?)))
            .await
            .unwrap();
        assert!(summary.segments.is_empty());
        assert!(summary.window_start.is_none());
        assert!(overlap.is_none());
    }

    #[tokio::test]
    async fn test_overlap_revenue_from_cache() {
        let db = refreshed().await;
        let split = db
            .reader()
            .call(|conn| overlap_revenue(conn, 7))
            .await
            .unwrap()
            .unwrap();

        // a@x.com reads both (3 opens), c@x.com morning only (4), b@x.com night only (1).
        assert_eq!(split.total_opens, 8);
        assert_eq!(split.both.users, 1);
        assert_eq!(split.a_only.users, 1);
        assert_eq!(split.b_only.users, 1);
        // The sponsor revenue counts towards the total being split.
        assert_eq!(split.total_revenue, 90.0);
        let sum = split.both.revenue + split.a_only.revenue + split.b_only.revenue;
        assert!((sum - 90.0).abs() < 1e-6);
        assert!((split.a_only.revenue - 45.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_daily_and_weekday() {
        let db = refreshed().await;
        let window = Window::new(30, as_of());
        let (daily, weekdays) = db
            .reader()
            .call(move |conn| Ok::<_, rusqlite::Error>((daily_stats(conn, &window)?, weekday_stats(conn, &window)?)))
            .await
            .unwrap();

        assert_eq!(daily.len(), 5);
        assert_eq!(daily[0].date, "2025-01-20");
        assert_eq!(daily[0].day_of_week, 1);

        // Both morning rows fall on Mondays (Jan 20 and Jan 27).
        let monday_morning = weekdays
            .iter()
            .find(|w| w.day_of_week == 1 && w.segment == "morning")
            .unwrap();
        assert_eq!(monday_morning.day_name, "Monday");
        assert_eq!(monday_morning.days_observed, 2);
        assert_eq!(monday_morning.avg_opens, 2.0);
    }
}
