pub mod overlap;
pub mod queries;
pub mod refresh;
pub mod types;

pub use refresh::{refresh_caches, RefreshOptions, RefreshResult, Stage, StageResult};
pub use types::*;

use crate::error::Result;
use crate::storage::Database;
use crate::window::Window;

/// Cached readers, opens, and revenue per segment for a trailing period.
pub async fn get_stats(db: &Database, period_days: u32) -> Result<PeriodSummary> {
    Ok(db
        .reader()
        .call(move |conn| queries::period_summary(conn, period_days))
        .await?)
}

pub async fn get_overlap(db: &Database, period_days: u32) -> Result<Option<OverlapStat>> {
    Ok(db
        .reader()
        .call(move |conn| queries::overlap_stat(conn, period_days))
        .await?)
}

pub async fn get_overlap_revenue(db: &Database, period_days: u32) -> Result<Option<OverlapRevenue>> {
    Ok(db
        .reader()
        .call(move |conn| queries::overlap_revenue(conn, period_days))
        .await?)
}

pub async fn get_daily(db: &Database, window: Window) -> Result<Vec<DailyStat>> {
    Ok(db
        .reader()
        .call(move |conn| queries::daily_stats(conn, &window))
        .await?)
}

pub async fn get_weekday(db: &Database, window: Window) -> Result<Vec<WeekdayStat>> {
    Ok(db
        .reader()
        .call(move |conn| queries::weekday_stats(conn, &window))
        .await?)
}
