use serde::Serialize;

use super::progress::{JobType, ProgressTracker};
use super::{begin_job, finish_job};
use crate::client::{PublicationApi, PAGE_SIZE};
use crate::error::Result;
use crate::storage::repository::{self, JobCounts, UpsertOutcome};
use crate::storage::Database;

/// Consecutive already-known posts after which pagination stops.
///
/// Posts come back newest first, so a long run of known posts means the rest
/// of the history was mirrored by an earlier sync. This is a heuristic: a
/// remote edit that reorders old posts can end a sync early.
pub const EARLY_STOP_THRESHOLD: u32 = 50;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PostSyncReport {
    pub publication_id: String,
    pub created: u64,
    pub updated: u64,
    pub failed: u64,
    pub posts_without_stats: u64,
    /// True when pagination stopped early on a run of known posts.
    pub is_incremental: bool,
    pub pages_fetched: u32,
}

/// Mirror a publication's posts into `dim_posts`.
///
/// A page fetch failure aborts the job and marks it as errored; a single
/// post that fails to upsert is logged and counted in `failed`.
pub async fn sync_posts(
    db: &Database,
    api: &dyn PublicationApi,
    tracker: &ProgressTracker,
    publication_id: &str,
) -> Result<PostSyncReport> {
    tracker.start(publication_id, JobType::Posts, PAGE_SIZE as u64);
    let job_id = begin_job(db, publication_id, JobType::Posts).await;

    let mut report = PostSyncReport {
        publication_id: publication_id.to_string(),
        ..Default::default()
    };
    let result = run(db, api, tracker, &mut report).await;

    let counts = JobCounts {
        created: report.created,
        updated: report.updated,
        skipped: 0,
        failed: report.failed,
    };
    match result {
        Ok(()) => {
            log::info!(
                "Post sync for {publication_id}: {} created, {} updated, {} failed, {} pages{}",
                report.created,
                report.updated,
                report.failed,
                report.pages_fetched,
                if report.is_incremental { " (stopped early)" } else { "" }
            );
            tracker.complete(
                publication_id,
                JobType::Posts,
                &format!(
                    "Synced {} new and {} existing posts",
                    report.created, report.updated
                ),
            );
            finish_job(db, job_id, "completed", counts, None).await;
            Ok(report)
        }
        Err(e) => {
            log::error!("Post sync for {publication_id} failed: {e}");
            tracker.error(publication_id, JobType::Posts, &e.to_string());
            finish_job(db, job_id, "error", counts, Some(e.to_string())).await;
            Err(e)
        }
    }
}

async fn run(
    db: &Database,
    api: &dyn PublicationApi,
    tracker: &ProgressTracker,
    report: &mut PostSyncReport,
) -> Result<()> {
    let publication_id = report.publication_id.clone();
    let mut page: u32 = 1;
    let mut processed: u64 = 0;
    let mut consecutive_existing: u32 = 0;

    'pages: loop {
        let resp = api.list_posts(&publication_id, page, PAGE_SIZE).await?;
        report.pages_fetched += 1;
        if page == 1 {
            tracker.set_total(&publication_id, JobType::Posts, resp.total_results);
        }
        log::debug!(
            "Page {page}/{} of {publication_id}: {} posts",
            resp.total_pages.map_or_else(|| "?".to_string(), |n| n.to_string()),
            resp.data.len()
        );
        if resp.data.is_empty() {
            break;
        }
        let last_page = match resp.total_pages {
            Some(total_pages) => page >= total_pages,
            None => (resp.data.len() as u32) < PAGE_SIZE,
        };

        for post in resp.data {
            processed += 1;
            let title = post.title.clone();
            let external_id = post.id.clone();
            let pid = publication_id.clone();
            let outcome = db
                .writer()
                .call(move |conn| repository::upsert_post(conn, &pid, &post))
                .await;

            match outcome {
                Ok(UpsertOutcome::Inserted) => {
                    report.created += 1;
                    consecutive_existing = 0;
                }
                Ok(UpsertOutcome::Updated) => {
                    report.updated += 1;
                    consecutive_existing += 1;
                }
                Err(e) => {
                    log::warn!("Failed to upsert post {external_id}: {e}");
                    report.failed += 1;
                }
            }
            tracker.update(
                &publication_id,
                JobType::Posts,
                processed,
                Some(&format!("Processing {title}")),
            );

            if consecutive_existing >= EARLY_STOP_THRESHOLD {
                log::info!(
                    "{consecutive_existing} consecutive known posts on page {page}, stopping early"
                );
                report.is_incremental = true;
                break 'pages;
            }
        }

        if last_page {
            break;
        }
        page += 1;
    }

    let pid = publication_id.clone();
    let without_stats = db
        .writer()
        .call(move |conn| {
            repository::touch_publication_sync_time(conn, &pid)?;
            repository::count_posts_without_stats(conn, &pid)
        })
        .await?;
    report.posts_without_stats = without_stats as u64;
    Ok(())
}
