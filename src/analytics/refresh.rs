use std::time::Instant;

use chrono::NaiveDate;
use rusqlite::{params, Connection};
use serde::Serialize;

use super::overlap::compute_overlap;
use crate::config::{AnalyticsConfig, DEFAULT_PERIODS};
use crate::date_util::{date_key, day_of_week};
use crate::error::{Error, Result};
use crate::storage::repository;
use crate::storage::Database;
use crate::window::Window;

/// Trailing days recomputed by the daily stage when not told otherwise.
pub const DEFAULT_DAYS_TO_UPDATE: u32 = 30;

/// Which cache stages to run and over which windows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshOptions {
    pub periods: Vec<u32>,
    pub update_daily: bool,
    pub update_stats: bool,
    pub update_overlap: bool,
    pub days_to_update: u32,
    /// Last day of every window. Defaults to today (UTC).
    pub as_of: Option<NaiveDate>,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self {
            periods: DEFAULT_PERIODS.to_vec(),
            update_daily: true,
            update_stats: true,
            update_overlap: true,
            days_to_update: DEFAULT_DAYS_TO_UPDATE,
            as_of: None,
        }
    }
}

impl RefreshOptions {
    /// Defaults with the periods taken from the analytics config.
    pub fn from_config(cfg: &AnalyticsConfig) -> Self {
        Self {
            periods: cfg.periods.clone(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Daily,
    Period,
    Overlap,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Daily => "daily",
            Stage::Period => "period",
            Stage::Overlap => "overlap",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageResult {
    pub success: bool,
    pub duration_ms: u64,
    pub rows_written: u64,
    pub error: Option<String>,
}

/// Outcome of each requested stage; `None` for stages that were not requested.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshResult {
    pub as_of: String,
    pub daily: Option<StageResult>,
    pub stats: Option<StageResult>,
    pub overlap: Option<StageResult>,
}

impl RefreshResult {
    pub fn all_succeeded(&self) -> bool {
        [&self.daily, &self.stats, &self.overlap]
            .into_iter()
            .flatten()
            .all(|stage| stage.success)
    }
}

/// Recompute the requested cache stages.
///
/// Stages run concurrently and fail independently: an error is recorded in
/// that stage's slot and in `cache_refresh_log`, and the other stages still
/// run. Every window is rewritten inside a single transaction, so readers see
/// either the previous snapshot or the new one.
pub async fn refresh_caches(db: &Database, cfg: &AnalyticsConfig, opts: &RefreshOptions) -> RefreshResult {
    let as_of = opts
        .as_of
        .unwrap_or_else(|| chrono::Utc::now().date_naive());
    log::info!(
        "Refreshing caches as of {as_of} (daily: {}, stats: {}, overlap: {}, periods: {:?})",
        opts.update_daily,
        opts.update_stats,
        opts.update_overlap,
        opts.periods
    );

    let daily_window = Window::new(opts.days_to_update, as_of);
    let periods = opts.periods.clone();
    let overlap_periods = opts.periods.clone();
    let segments = (cfg.segment_a.clone(), cfg.segment_b.clone());

    let (daily, stats, overlap) = tokio::join!(
        run_stage(db, Stage::Daily, opts.update_daily, move |conn| {
            refresh_daily(conn, &daily_window)
        }),
        run_stage(db, Stage::Period, opts.update_stats, move |conn| {
            refresh_periods(conn, &periods, as_of)
        }),
        run_stage(db, Stage::Overlap, opts.update_overlap, move |conn| {
            refresh_overlaps(conn, &segments.0, &segments.1, &overlap_periods, as_of)
        }),
    );

    RefreshResult {
        as_of: date_key(as_of),
        daily,
        stats,
        overlap,
    }
}

async fn run_stage<F>(db: &Database, stage: Stage, enabled: bool, work: F) -> Option<StageResult>
where
    F: FnOnce(&mut Connection) -> Result<u64> + Send + 'static,
{
    if !enabled {
        return None;
    }
    let started = Instant::now();
    let outcome: Result<u64> = db.writer().call(work).await.map_err(Error::from);
    let duration_ms = started.elapsed().as_millis() as u64;

    let result = match outcome {
        Ok(rows) => {
            log::info!("Cache stage {} wrote {rows} rows in {duration_ms}ms", stage.as_str());
            StageResult {
                success: true,
                duration_ms,
                rows_written: rows,
                error: None,
            }
        }
        Err(e) => {
            log::error!("Cache stage {} failed: {e}", stage.as_str());
            StageResult {
                success: false,
                duration_ms,
                rows_written: 0,
                error: Some(e.to_string()),
            }
        }
    };

    let error = result.error.clone();
    let logged = db
        .writer()
        .call(move |conn| repository::record_refresh(conn, stage.as_str(), duration_ms, error.as_deref()))
        .await;
    if let Err(e) = logged {
        log::warn!("Could not record {} refresh: {e}", stage.as_str());
    }
    Some(result)
}

/// Rebuild `cache_daily_stats` for every day of `window`. A day whose key
/// cannot be parsed is logged and left out.
pub fn refresh_daily(conn: &mut Connection, window: &Window) -> Result<u64> {
    let (first_day, last_day) = window.key_range();
    let (ts_start, ts_end) = window.timestamp_bounds();

    let tx = conn.transaction()?;
    tx.execute(
        "DELETE FROM cache_daily_stats WHERE stat_date >= ?1 AND stat_date <= ?2",
        params![first_day, last_day],
    )?;

    let groups: Vec<(String, String, i64, i64)> = {
        let mut stmt = tx.prepare(
            "SELECT substr(occurred_at, 1, 10) AS day, segment,
                    COUNT(DISTINCT reader_id), SUM(open_count)
             FROM raw_events
             WHERE occurred_at >= ?1 AND occurred_at < ?2 AND open_count >= 1
             GROUP BY day, segment
             ORDER BY day, segment",
        )?;
        let rows = stmt.query_map(params![ts_start, ts_end], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?;
        rows.collect::<std::result::Result<_, rusqlite::Error>>()?
    };

    let mut written = 0u64;
    {
        let mut insert = tx.prepare(
            "INSERT INTO cache_daily_stats (stat_date, segment, unique_readers, total_opens, day_of_week)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for (day, segment, readers, opens) in &groups {
            let date = match NaiveDate::parse_from_str(day, "%Y-%m-%d") {
                Ok(d) => d,
                Err(e) => {
                    log::warn!("Skipping events with unparseable day '{day}': {e}");
                    continue;
                }
            };
            insert.execute(params![day, segment, readers, opens, day_of_week(date)])?;
            written += 1;
        }
    }
    tx.commit()?;
    Ok(written)
}

/// Rebuild the `cache_period_stats` snapshot of one trailing window.
pub fn refresh_period(conn: &mut Connection, window: &Window) -> Result<u64> {
    let (first_day, last_day) = window.key_range();
    let (ts_start, ts_end) = window.timestamp_bounds();

    let tx = conn.transaction()?;
    tx.execute(
        "DELETE FROM cache_period_stats WHERE period_days = ?1",
        params![window.days],
    )?;
    let written = tx.execute(
        "INSERT INTO cache_period_stats
            (period_days, segment, unique_readers, total_opens, window_start, window_end)
         SELECT ?1, segment, COUNT(DISTINCT reader_id), SUM(open_count), ?2, ?3
         FROM raw_events
         WHERE occurred_at >= ?4 AND occurred_at < ?5 AND open_count >= 1
         GROUP BY segment",
        params![window.days, first_day, last_day, ts_start, ts_end],
    )?;
    tx.commit()?;
    Ok(written as u64)
}

fn refresh_periods(conn: &mut Connection, periods: &[u32], as_of: NaiveDate) -> Result<u64> {
    for_each_period(periods, |days| refresh_period(conn, &Window::new(days, as_of)))
}

/// Recompute and store the overlap row of one trailing window.
pub fn refresh_overlap(conn: &Connection, segment_a: &str, segment_b: &str, window: &Window) -> Result<u64> {
    let stat = compute_overlap(conn, segment_a, segment_b, window)?;
    conn.execute(
        "INSERT INTO cache_overlap_stats (
            period_days, segment_a, segment_b, both_users, a_only_users, b_only_users,
            both_opens, a_only_opens, b_only_opens, total_unique_users,
            both_pct, a_only_pct, b_only_pct, window_start, window_end
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        ON CONFLICT(period_days) DO UPDATE SET
            segment_a=excluded.segment_a, segment_b=excluded.segment_b,
            both_users=excluded.both_users, a_only_users=excluded.a_only_users,
            b_only_users=excluded.b_only_users, both_opens=excluded.both_opens,
            a_only_opens=excluded.a_only_opens, b_only_opens=excluded.b_only_opens,
            total_unique_users=excluded.total_unique_users, both_pct=excluded.both_pct,
            a_only_pct=excluded.a_only_pct, b_only_pct=excluded.b_only_pct,
            window_start=excluded.window_start, window_end=excluded.window_end",
        params![
            stat.period_days,
            stat.segment_a,
            stat.segment_b,
            stat.both_users as i64,
            stat.a_only_users as i64,
            stat.b_only_users as i64,
            stat.both_opens as i64,
            stat.a_only_opens as i64,
            stat.b_only_opens as i64,
            stat.total_unique_users as i64,
            stat.both_pct,
            stat.a_only_pct,
            stat.b_only_pct,
            stat.window_start,
            stat.window_end,
        ],
    )?;
    Ok(1)
}

fn refresh_overlaps(
    conn: &mut Connection,
    segment_a: &str,
    segment_b: &str,
    periods: &[u32],
    as_of: NaiveDate,
) -> Result<u64> {
    for_each_period(periods, |days| {
        refresh_overlap(conn, segment_a, segment_b, &Window::new(days, as_of))
    })
}

/// Run `f` for every period even when some fail; the stage fails if any did.
fn for_each_period(periods: &[u32], mut f: impl FnMut(u32) -> Result<u64>) -> Result<u64> {
    let mut written = 0;
    let mut failures = Vec::new();
    for &days in periods {
        match f(days) {
            Ok(n) => written += n,
            Err(e) => {
                log::warn!("{days}d window failed: {e}");
                failures.push(format!("{days}d: {e}"));
            }
        }
    }
    if failures.is_empty() {
        Ok(written)
    } else {
        Err(Error::PersistenceFailure(failures.join("; ")))
    }
}
