use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Deserializer, Serialize};

use crate::client::RemotePost;
use crate::date_util::{normalize_timestamp, unix_to_rfc3339};
use crate::sync::stats::PostStatsRecord;

/// Whether an upsert created a row or overwrote an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

// ── Publications ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Publication {
    pub publication_id: String,
    pub display_name: Option<String>,
    pub added_at: String,
    pub last_sync_at: Option<String>,
}

pub fn add_publication(
    conn: &Connection,
    publication_id: &str,
    display_name: Option<&str>,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO dim_publications (publication_id, display_name, added_at)
         VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(publication_id) DO UPDATE SET
           display_name = COALESCE(excluded.display_name, dim_publications.display_name)",
        params![publication_id, display_name],
    )?;
    Ok(())
}

pub fn remove_publication(conn: &Connection, publication_id: &str) -> Result<bool, rusqlite::Error> {
    let count = conn.execute(
        "DELETE FROM dim_publications WHERE publication_id = ?1",
        params![publication_id],
    )?;
    Ok(count > 0)
}

pub fn list_publications(conn: &Connection) -> Result<Vec<Publication>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT publication_id, display_name, added_at, last_sync_at
         FROM dim_publications ORDER BY added_at, publication_id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(Publication {
            publication_id: row.get(0)?,
            display_name: row.get(1)?,
            added_at: row.get(2)?,
            last_sync_at: row.get(3)?,
        })
    })?;
    rows.collect()
}

/// Stamp `last_sync_at`, registering the publication if a sync was run for
/// one that was never added explicitly.
pub fn touch_publication_sync_time(
    conn: &Connection,
    publication_id: &str,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO dim_publications (publication_id, added_at, last_sync_at)
         VALUES (?1, datetime('now'), datetime('now'))
         ON CONFLICT(publication_id) DO UPDATE SET last_sync_at = datetime('now')",
        params![publication_id],
    )?;
    Ok(())
}

// ── Posts ──────────────────────────────────────────────────────────

/// Upsert a post by its remote id. Local `post_id` and `created_at` are kept
/// on update; `updated_at` is always refreshed.
pub fn upsert_post(
    conn: &Connection,
    publication_id: &str,
    post: &RemotePost,
) -> Result<UpsertOutcome, rusqlite::Error> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT post_id FROM dim_posts WHERE external_id = ?1",
            params![post.id],
            |row| row.get(0),
        )
        .optional()?;

    let publish_date = post.publish_date.and_then(unix_to_rfc3339);

    conn.execute(
        "INSERT INTO dim_posts (
            external_id, publication_id, title, subtitle, status,
            publish_date, web_url, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, datetime('now'), datetime('now'))
        ON CONFLICT(external_id) DO UPDATE SET
            publication_id=excluded.publication_id, title=excluded.title,
            subtitle=excluded.subtitle, status=excluded.status,
            publish_date=excluded.publish_date, web_url=excluded.web_url,
            updated_at=excluded.updated_at",
        params![
            post.id,
            publication_id,
            post.title,
            post.subtitle,
            post.status.as_str(),
            publish_date,
            post.web_url,
        ],
    )?;

    Ok(if existing.is_some() {
        UpsertOutcome::Updated
    } else {
        UpsertOutcome::Inserted
    })
}

pub fn count_posts(conn: &Connection, publication_id: &str) -> Result<i64, rusqlite::Error> {
    conn.query_row(
        "SELECT COUNT(*) FROM dim_posts WHERE publication_id = ?1",
        params![publication_id],
        |row| row.get(0),
    )
}

pub fn count_posts_without_stats(
    conn: &Connection,
    publication_id: &str,
) -> Result<i64, rusqlite::Error> {
    conn.query_row(
        "SELECT COUNT(*) FROM dim_posts p
         LEFT JOIN fact_post_stats s ON s.post_id = p.post_id
         WHERE p.publication_id = ?1 AND s.post_id IS NULL",
        params![publication_id],
        |row| row.get(0),
    )
}

/// A post that needs its stats (re)fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsCandidate {
    pub post_id: i64,
    pub external_id: String,
    pub title: String,
    pub has_stats: bool,
}

/// Confirmed, published posts that either have no stats yet or were touched
/// locally within the last 24 hours. Newest first.
pub fn list_stats_candidates(
    conn: &Connection,
    publication_id: &str,
) -> Result<Vec<StatsCandidate>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT p.post_id, p.external_id, p.title, s.post_id IS NOT NULL
         FROM dim_posts p
         LEFT JOIN fact_post_stats s ON s.post_id = p.post_id
         WHERE p.publication_id = ?1
           AND p.status = 'confirmed'
           AND p.publish_date IS NOT NULL
           AND (s.post_id IS NULL OR p.updated_at >= datetime('now', '-24 hours'))
         ORDER BY p.publish_date DESC, p.post_id DESC",
    )?;
    let rows = stmt.query_map(params![publication_id], |row| {
        Ok(StatsCandidate {
            post_id: row.get(0)?,
            external_id: row.get(1)?,
            title: row.get(2)?,
            has_stats: row.get(3)?,
        })
    })?;
    rows.collect()
}

// ── Post Stats ─────────────────────────────────────────────────────

pub fn upsert_post_stats(
    conn: &Connection,
    post_id: i64,
    stats: &PostStatsRecord,
) -> Result<UpsertOutcome, rusqlite::Error> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT post_id FROM fact_post_stats WHERE post_id = ?1",
            params![post_id],
            |row| row.get(0),
        )
        .optional()?;

    conn.execute(
        "INSERT INTO fact_post_stats (
            post_id, recipients, delivered, opens, unique_opens, clicks, unique_clicks,
            unsubscribes, spam_reports, bounces, open_rate, click_rate, delivered_rate,
            unsubscribe_rate, click_through_rate, clicks_json, updated_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, datetime('now')
        )
        ON CONFLICT(post_id) DO UPDATE SET
            recipients=excluded.recipients, delivered=excluded.delivered,
            opens=excluded.opens, unique_opens=excluded.unique_opens,
            clicks=excluded.clicks, unique_clicks=excluded.unique_clicks,
            unsubscribes=excluded.unsubscribes, spam_reports=excluded.spam_reports,
            bounces=excluded.bounces, open_rate=excluded.open_rate,
            click_rate=excluded.click_rate, delivered_rate=excluded.delivered_rate,
            unsubscribe_rate=excluded.unsubscribe_rate,
            click_through_rate=excluded.click_through_rate,
            clicks_json=excluded.clicks_json, updated_at=excluded.updated_at",
        params![
            post_id,
            stats.recipients as i64,
            stats.delivered as i64,
            stats.opens as i64,
            stats.unique_opens as i64,
            stats.clicks as i64,
            stats.unique_clicks as i64,
            stats.unsubscribes as i64,
            stats.spam_reports as i64,
            stats.bounces as i64,
            stats.open_rate,
            stats.click_rate,
            stats.delivered_rate,
            stats.unsubscribe_rate,
            stats.click_through_rate,
            stats.clicks_json,
        ],
    )?;

    Ok(if existing.is_some() {
        UpsertOutcome::Updated
    } else {
        UpsertOutcome::Inserted
    })
}

pub fn get_post_stats(
    conn: &Connection,
    external_id: &str,
) -> Result<Option<PostStatsRecord>, rusqlite::Error> {
    conn.query_row(
        "SELECT s.recipients, s.delivered, s.opens, s.unique_opens, s.clicks, s.unique_clicks,
                s.unsubscribes, s.spam_reports, s.bounces, s.open_rate, s.click_rate,
                s.delivered_rate, s.unsubscribe_rate, s.click_through_rate, s.clicks_json
         FROM fact_post_stats s
         JOIN dim_posts p ON p.post_id = s.post_id
         WHERE p.external_id = ?1",
        params![external_id],
        |row| {
            Ok(PostStatsRecord {
                recipients: row.get::<_, i64>(0)? as u64,
                delivered: row.get::<_, i64>(1)? as u64,
                opens: row.get::<_, i64>(2)? as u64,
                unique_opens: row.get::<_, i64>(3)? as u64,
                clicks: row.get::<_, i64>(4)? as u64,
                unique_clicks: row.get::<_, i64>(5)? as u64,
                unsubscribes: row.get::<_, i64>(6)? as u64,
                spam_reports: row.get::<_, i64>(7)? as u64,
                bounces: row.get::<_, i64>(8)? as u64,
                open_rate: row.get(9)?,
                click_rate: row.get(10)?,
                delivered_rate: row.get(11)?,
                unsubscribe_rate: row.get(12)?,
                click_through_rate: row.get(13)?,
                clicks_json: row.get(14)?,
            })
        },
    )
    .optional()
}

// ── Raw Events & Revenue ───────────────────────────────────────────

/// One tracking-pixel hit, as exported by the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub reader_id: String,
    pub content_id: String,
    pub segment: String,
    /// RFC 3339 timestamp. Any offset is accepted on input; it is stored as
    /// UTC `YYYY-MM-DDTHH:MM:SSZ`.
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub occurred_at: String,
    #[serde(default = "default_open_count")]
    pub open_count: u32,
}

fn default_open_count() -> u32 {
    1
}

fn deserialize_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let raw = String::deserialize(deserializer)?;
    normalize_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid RFC 3339 timestamp: {raw}")))
}

/// Ad revenue earned by one segment on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueRecord {
    /// `YYYY-MM-DD`.
    pub date: String,
    pub segment: String,
    pub revenue: f64,
}

pub fn insert_event(conn: &Connection, event: &RawEvent) -> Result<(), rusqlite::Error> {
    let occurred_at = normalize_timestamp(&event.occurred_at).ok_or_else(|| {
        rusqlite::Error::ToSqlConversionFailure(
            format!("invalid event timestamp: {}", event.occurred_at).into(),
        )
    })?;
    conn.execute(
        "INSERT INTO raw_events (reader_id, content_id, segment, occurred_at, open_count)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            event.reader_id,
            event.content_id,
            event.segment,
            occurred_at,
            event.open_count,
        ],
    )?;
    Ok(())
}

/// Revenue rows are keyed by day and segment; a re-import replaces the amount.
pub fn upsert_revenue(conn: &Connection, record: &RevenueRecord) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO raw_revenue (revenue_date, segment, revenue) VALUES (?1, ?2, ?3)
         ON CONFLICT(revenue_date, segment) DO UPDATE SET revenue = excluded.revenue",
        params![record.date, record.segment, record.revenue],
    )?;
    Ok(())
}

/// Total revenue across all segments for an inclusive date range.
pub fn sum_revenue(conn: &Connection, start: &str, end: &str) -> Result<f64, rusqlite::Error> {
    conn.query_row(
        "SELECT COALESCE(SUM(revenue), 0.0) FROM raw_revenue
         WHERE revenue_date >= ?1 AND revenue_date <= ?2",
        params![start, end],
        |row| row.get(0),
    )
}

/// Revenue per segment for an inclusive date range.
pub fn revenue_by_segment(
    conn: &Connection,
    start: &str,
    end: &str,
) -> Result<Vec<(String, f64)>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT segment, SUM(revenue) FROM raw_revenue
         WHERE revenue_date >= ?1 AND revenue_date <= ?2
         GROUP BY segment ORDER BY segment",
    )?;
    let rows = stmt.query_map(params![start, end], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

// ── Sync Jobs ──────────────────────────────────────────────────────

pub fn insert_sync_job(
    conn: &Connection,
    publication_id: &str,
    job_type: &str,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO sync_jobs (publication_id, job_type, status, started_at)
         VALUES (?1, ?2, 'running', datetime('now'))",
        params![publication_id, job_type],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Final counters of a finished sync job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobCounts {
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub failed: u64,
}

pub fn finish_sync_job(
    conn: &Connection,
    job_id: i64,
    status: &str,
    counts: &JobCounts,
    error_message: Option<&str>,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "UPDATE sync_jobs SET
            status = ?2, completed_at = datetime('now'),
            created_items = ?3, updated_items = ?4,
            skipped_items = ?5, failed_items = ?6,
            error_message = ?7
         WHERE id = ?1",
        params![
            job_id,
            status,
            counts.created as i64,
            counts.updated as i64,
            counts.skipped as i64,
            counts.failed as i64,
            error_message,
        ],
    )?;
    Ok(())
}

// ── Cache Refresh Log ──────────────────────────────────────────────

pub fn record_refresh(
    conn: &Connection,
    stage: &str,
    duration_ms: u64,
    error: Option<&str>,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO cache_refresh_log (stage, refreshed_at, duration_ms, success, error)
         VALUES (?1, datetime('now'), ?2, ?3, ?4)",
        params![stage, duration_ms as i64, error.is_none() as i32, error],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::remote_post;
    use crate::client::PostStatus;
    use crate::storage::Database;

    #[tokio::test]
    async fn test_config_round_trip() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                set_config(conn, "segment_a", "morning")?;
                let val = get_config(conn, "segment_a")?;
                assert_eq!(val, Some("morning".to_string()));

                let missing = get_config(conn, "nonexistent")?;
                assert_eq!(missing, None);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_publication_crud() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                add_publication(conn, "pub_1", Some("Morning Brew"))?;
                add_publication(conn, "pub_2", None)?;
                // Re-adding without a name keeps the existing one
                add_publication(conn, "pub_1", None)?;

                let pubs = list_publications(conn)?;
                assert_eq!(pubs.len(), 2);
                let first = pubs.iter().find(|p| p.publication_id == "pub_1").unwrap();
                assert_eq!(first.display_name.as_deref(), Some("Morning Brew"));

                assert!(remove_publication(conn, "pub_2")?);
                assert!(!remove_publication(conn, "pub_2")?);
                assert_eq!(list_publications(conn)?.len(), 1);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_touch_publication_registers_unknown() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                touch_publication_sync_time(conn, "pub_9")?;
                let pubs = list_publications(conn)?;
                assert_eq!(pubs.len(), 1);
                assert!(pubs[0].last_sync_at.is_some());
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_upsert_post_reports_outcome() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                let mut post = remote_post("post_1", PostStatus::Draft, None);
                assert_eq!(upsert_post(conn, "pub_1", &post)?, UpsertOutcome::Inserted);

                post.status = PostStatus::Confirmed;
                post.title = "Renamed".into();
                post.publish_date = Some(1_735_689_600);
                assert_eq!(upsert_post(conn, "pub_1", &post)?, UpsertOutcome::Updated);

                let (count, title, status, publish_date): (i64, String, String, Option<String>) =
                    conn.query_row(
                        "SELECT COUNT(*), MAX(title), MAX(status), MAX(publish_date) FROM dim_posts",
                        [],
                        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                    )?;
                assert_eq!(count, 1);
                assert_eq!(title, "Renamed");
                assert_eq!(status, "confirmed");
                assert_eq!(publish_date.as_deref(), Some("2025-01-01T00:00:00+00:00"));
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_stats_candidates_selection() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                let published = Some(1_735_689_600);
                upsert_post(conn, "pub_1", &remote_post("needs", PostStatus::Confirmed, published))?;
                upsert_post(conn, "pub_1", &remote_post("draft", PostStatus::Draft, published))?;
                upsert_post(conn, "pub_1", &remote_post("unpublished", PostStatus::Confirmed, None))?;
                upsert_post(conn, "pub_1", &remote_post("fresh", PostStatus::Confirmed, published))?;
                upsert_post(conn, "pub_1", &remote_post("stale", PostStatus::Confirmed, published))?;
                upsert_post(conn, "pub_2", &remote_post("other_pub", PostStatus::Confirmed, published))?;

                let id_of = |ext: &str| -> Result<i64, rusqlite::Error> {
                    conn.query_row(
                        "SELECT post_id FROM dim_posts WHERE external_id = ?1",
                        [ext],
                        |row| row.get(0),
                    )
                };
                upsert_post_stats(conn, id_of("fresh")?, &PostStatsRecord::default())?;
                upsert_post_stats(conn, id_of("stale")?, &PostStatsRecord::default())?;
                conn.execute(
                    "UPDATE dim_posts SET updated_at = datetime('now', '-3 days') WHERE external_id = 'stale'",
                    [],
                )?;

                let candidates = list_stats_candidates(conn, "pub_1")?;
                let mut ids: Vec<&str> = candidates.iter().map(|c| c.external_id.as_str()).collect();
                ids.sort();
                // "fresh" has stats but was touched recently; "stale" has stats and was not.
                assert_eq!(ids, vec!["fresh", "needs"]);
                let fresh = candidates.iter().find(|c| c.external_id == "fresh").unwrap();
                assert!(fresh.has_stats);

                assert_eq!(count_posts_without_stats(conn, "pub_1")?, 3);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_post_stats_round_trip() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                upsert_post(conn, "pub_1", &remote_post("post_1", PostStatus::Confirmed, Some(0)))?;
                let post_id: i64 = conn.query_row(
                    "SELECT post_id FROM dim_posts WHERE external_id = 'post_1'",
                    [],
                    |row| row.get(0),
                )?;
                let record = PostStatsRecord {
                    recipients: 10,
                    delivered: 9,
                    bounces: 1,
                    delivered_rate: 90.0,
                    clicks_json: "[]".into(),
                    ..Default::default()
                };
                assert_eq!(upsert_post_stats(conn, post_id, &record)?, UpsertOutcome::Inserted);
                assert_eq!(upsert_post_stats(conn, post_id, &record)?, UpsertOutcome::Updated);

                assert_eq!(get_post_stats(conn, "post_1")?, Some(record));
                assert_eq!(get_post_stats(conn, "missing")?, None);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_revenue_upsert_and_sums() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                let rec = |date: &str, segment: &str, revenue: f64| RevenueRecord {
                    date: date.into(),
                    segment: segment.into(),
                    revenue,
                };
                upsert_revenue(conn, &rec("2025-01-01", "morning", 10.0))?;
                upsert_revenue(conn, &rec("2025-01-01", "morning", 12.5))?;
                upsert_revenue(conn, &rec("2025-01-02", "night", 4.0))?;
                upsert_revenue(conn, &rec("2025-02-01", "night", 100.0))?;

                assert_eq!(sum_revenue(conn, "2025-01-01", "2025-01-31")?, 16.5);
                assert_eq!(sum_revenue(conn, "2024-01-01", "2024-12-31")?, 0.0);
                assert_eq!(
                    revenue_by_segment(conn, "2025-01-01", "2025-01-31")?,
                    vec![("morning".to_string(), 12.5), ("night".to_string(), 4.0)]
                );
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sync_job_round_trip() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                let job_id = insert_sync_job(conn, "pub_1", "posts")?;
                assert!(job_id > 0);

                let counts = JobCounts {
                    created: 3,
                    updated: 2,
                    ..Default::default()
                };
                finish_sync_job(conn, job_id, "completed", &counts, None)?;

                let (status, created): (String, i64) = conn.query_row(
                    "SELECT status, created_items FROM sync_jobs WHERE id = ?1",
                    params![job_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;
                assert_eq!(status, "completed");
                assert_eq!(created, 3);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[test]
    fn test_raw_event_open_count_defaults_to_one() {
        let ev: RawEvent = serde_json::from_str(
            r#"{"reader_id": "a@x.com", "content_id": "post_1", "segment": "morning",
                "occurred_at": "2025-01-01T07:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(ev.open_count, 1);
    }

    #[test]
    fn test_raw_event_timestamp_is_normalized_to_utc() {
        let ev: RawEvent = serde_json::from_str(
            r#"{"reader_id": "a@x.com", "content_id": "post_1", "segment": "morning",
                "occurred_at": "2025-02-01T01:00:00+05:00"}"#,
        )
        .unwrap();
        assert_eq!(ev.occurred_at, "2025-01-31T20:00:00Z");

        let bad = serde_json::from_str::<RawEvent>(
            r#"{"reader_id": "a@x.com", "content_id": "post_1", "segment": "morning",
                "occurred_at": "last tuesday"}"#,
        );
        assert!(bad.is_err());
    }

    #[tokio::test]
    async fn test_insert_event_stores_utc() {
        let db = Database::open_memory().await.unwrap();
        let (stored, rejected) = db
            .writer()
            .call(|conn| {
                let mut ev = RawEvent {
                    reader_id: "a@x.com".into(),
                    content_id: "post_1".into(),
                    segment: "night".into(),
                    occurred_at: "2025-01-31T22:00:00-05:00".into(),
                    open_count: 1,
                };
                insert_event(conn, &ev)?;
                ev.occurred_at = "2025-01-31".into();
                let rejected = insert_event(conn, &ev).is_err();
                let stored: String =
                    conn.query_row("SELECT occurred_at FROM raw_events", [], |row| row.get(0))?;
                Ok::<_, rusqlite::Error>((stored, rejected))
            })
            .await
            .unwrap();
        assert_eq!(stored, "2025-02-01T03:00:00Z");
        assert!(rejected);
    }
}
