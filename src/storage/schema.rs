use rusqlite_migration::{Migrations, M};

/// Every table the warehouse owns, in creation order.
pub const TABLES: &[&str] = &[
    "dim_publications",
    "dim_posts",
    "fact_post_stats",
    "raw_events",
    "raw_revenue",
    "cache_daily_stats",
    "cache_period_stats",
    "cache_overlap_stats",
    "cache_refresh_log",
    "sync_jobs",
    "app_config",
];

/// Embedded schema migrations, applied on every open.
pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(include_str!("migrations/001_initial.sql"))])
}

/// Row counts shown by `newsletterdw status`.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct WarehouseCounts {
    pub publications: i64,
    pub posts: i64,
    pub posts_with_stats: i64,
    pub events: i64,
    pub revenue_days: i64,
    pub daily_rows: i64,
    pub last_sync_at: Option<String>,
    pub last_refresh_at: Option<String>,
}

pub fn warehouse_counts(conn: &rusqlite::Connection) -> Result<WarehouseCounts, rusqlite::Error> {
    let count = |table: &str| -> Result<i64, rusqlite::Error> {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
    };
    Ok(WarehouseCounts {
        publications: count("dim_publications")?,
        posts: count("dim_posts")?,
        posts_with_stats: count("fact_post_stats")?,
        events: count("raw_events")?,
        revenue_days: conn.query_row(
            "SELECT COUNT(DISTINCT revenue_date) FROM raw_revenue",
            [],
            |row| row.get(0),
        )?,
        daily_rows: count("cache_daily_stats")?,
        last_sync_at: conn.query_row(
            "SELECT MAX(completed_at) FROM sync_jobs WHERE status = 'completed'",
            [],
            |row| row.get(0),
        )?,
        last_refresh_at: conn.query_row(
            "SELECT MAX(refreshed_at) FROM cache_refresh_log WHERE success = 1",
            [],
            |row| row.get(0),
        )?,
    })
}
