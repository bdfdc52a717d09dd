pub mod posts;
pub mod progress;
pub mod rate_limit;
pub mod stats;

use serde::Serialize;

pub use posts::{sync_posts, PostSyncReport};
pub use progress::{JobProgress, JobStatus, JobType, ProgressTracker, SyncJob};
pub use stats::{sync_stats, StatsSyncReport};

use crate::storage::repository::{self, JobCounts};
use crate::storage::Database;

/// Result of a full sync (posts, then stats) of one publication.
#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub publication_id: String,
    pub posts: PostSyncReport,
    pub stats: StatsSyncReport,
}

/// Record the start of a job in `sync_jobs`. History is best-effort: a
/// failure here is logged and the sync proceeds untracked.
pub(crate) async fn begin_job(db: &Database, publication_id: &str, job_type: JobType) -> Option<i64> {
    let pid = publication_id.to_string();
    let result = db
        .writer()
        .call(move |conn| repository::insert_sync_job(conn, &pid, job_type.as_str()))
        .await;
    match result {
        Ok(id) => Some(id),
        Err(e) => {
            log::warn!("Could not record {} sync job for {publication_id}: {e}", job_type.as_str());
            None
        }
    }
}

pub(crate) async fn finish_job(
    db: &Database,
    job_id: Option<i64>,
    status: &'static str,
    counts: JobCounts,
    error: Option<String>,
) {
    let Some(job_id) = job_id else {
        return;
    };
    let result = db
        .writer()
        .call(move |conn| {
            repository::finish_sync_job(conn, job_id, status, &counts, error.as_deref())
        })
        .await;
    if let Err(e) = result {
        log::warn!("Could not finish sync job {job_id}: {e}");
    }
}
