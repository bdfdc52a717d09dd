use serde::Serialize;

use super::progress::{JobType, ProgressTracker};
use super::{begin_job, finish_job};
use crate::client::{ClickRecord, EmailStats, PublicationApi};
use crate::error::Result;
use crate::storage::repository::{self, JobCounts, StatsCandidate, UpsertOutcome};
use crate::storage::Database;

/// Engagement statistics of one post as stored in `fact_post_stats`.
/// Rates are percentages (`95.0` means 95 %).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PostStatsRecord {
    pub recipients: u64,
    pub delivered: u64,
    pub opens: u64,
    pub unique_opens: u64,
    pub clicks: u64,
    pub unique_clicks: u64,
    pub unsubscribes: u64,
    pub spam_reports: u64,
    pub bounces: u64,
    pub open_rate: f64,
    pub click_rate: f64,
    pub delivered_rate: f64,
    pub unsubscribe_rate: f64,
    pub click_through_rate: f64,
    /// Per-URL click list, serialized verbatim.
    pub clicks_json: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSyncReport {
    pub created: u64,
    pub updated: u64,
    /// Candidates that did not get a stats row, for whatever reason.
    pub skipped: u64,
    /// The subset of `skipped` caused by an actual error rather than
    /// stats not being available yet.
    pub failed: u64,
    pub total_processed: u64,
}

fn rate(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 * 100.0 / denominator as f64
    }
}

/// Derive the stored record from the remote email envelope.
pub fn derive_stats(email: &EmailStats, clicks: &[ClickRecord]) -> Result<PostStatsRecord> {
    Ok(PostStatsRecord {
        recipients: email.recipients,
        delivered: email.delivered,
        opens: email.opens,
        unique_opens: email.unique_opens,
        clicks: email.clicks,
        unique_clicks: email.unique_clicks,
        unsubscribes: email.unsubscribes,
        spam_reports: email.spam_reports,
        bounces: email.recipients.saturating_sub(email.delivered),
        open_rate: rate(email.unique_opens, email.delivered),
        click_rate: rate(email.unique_clicks, email.delivered),
        delivered_rate: rate(email.delivered, email.recipients),
        unsubscribe_rate: rate(email.unsubscribes, email.delivered),
        click_through_rate: rate(email.unique_clicks, email.unique_opens),
        clicks_json: serde_json::to_string(clicks)?,
    })
}

enum StatsOutcome {
    Stored(UpsertOutcome),
    Unavailable,
}

/// Fetch and store stats for every candidate post of a publication.
///
/// Candidates are confirmed, published posts with no stats yet or touched
/// within the last 24 hours. A post whose stats are not available (no email
/// envelope, or 404) is skipped; any other per-post failure is logged,
/// counted, and the loop moves on. Only failing to load the candidate list
/// aborts the job.
pub async fn sync_stats(
    db: &Database,
    api: &dyn PublicationApi,
    tracker: &ProgressTracker,
    publication_id: &str,
) -> Result<StatsSyncReport> {
    tracker.start(publication_id, JobType::Stats, 0);
    let job_id = begin_job(db, publication_id, JobType::Stats).await;

    let mut report = StatsSyncReport::default();
    let result = run(db, api, tracker, publication_id, &mut report).await;

    let counts = JobCounts {
        created: report.created,
        updated: report.updated,
        skipped: report.skipped,
        failed: report.failed,
    };
    match result {
        Ok(()) => {
            log::info!(
                "Stats sync for {publication_id}: {} created, {} updated, {} skipped ({} failed)",
                report.created,
                report.updated,
                report.skipped,
                report.failed
            );
            tracker.complete(
                publication_id,
                JobType::Stats,
                &format!(
                    "Synced stats for {} posts ({} skipped)",
                    report.created + report.updated,
                    report.skipped
                ),
            );
            finish_job(db, job_id, "completed", counts, None).await;
            Ok(report)
        }
        Err(e) => {
            log::error!("Stats sync for {publication_id} failed: {e}");
            tracker.error(publication_id, JobType::Stats, &e.to_string());
            finish_job(db, job_id, "error", counts, Some(e.to_string())).await;
            Err(e)
        }
    }
}

async fn run(
    db: &Database,
    api: &dyn PublicationApi,
    tracker: &ProgressTracker,
    publication_id: &str,
    report: &mut StatsSyncReport,
) -> Result<()> {
    let pid = publication_id.to_string();
    let candidates = db
        .reader()
        .call(move |conn| repository::list_stats_candidates(conn, &pid))
        .await?;

    let refreshes = candidates.iter().filter(|c| c.has_stats).count();
    log::info!(
        "{} posts of {publication_id} need stats ({refreshes} refreshes)",
        candidates.len()
    );
    tracker.set_total(publication_id, JobType::Stats, candidates.len() as u64);

    for candidate in &candidates {
        match fetch_and_store(db, api, publication_id, candidate).await {
            Ok(StatsOutcome::Stored(UpsertOutcome::Inserted)) => report.created += 1,
            Ok(StatsOutcome::Stored(UpsertOutcome::Updated)) => report.updated += 1,
            Ok(StatsOutcome::Unavailable) => {
                log::debug!("No stats yet for {}", candidate.external_id);
                report.skipped += 1;
            }
            Err(e) => {
                log::warn!("Failed to sync stats for {}: {e}", candidate.external_id);
                report.skipped += 1;
                report.failed += 1;
            }
        }
        report.total_processed += 1;
        tracker.update(
            publication_id,
            JobType::Stats,
            report.total_processed,
            Some(&format!(
                "{} stats for {}",
                if candidate.has_stats { "Refreshing" } else { "Fetching" },
                candidate.title
            )),
        );
    }
    Ok(())
}

async fn fetch_and_store(
    db: &Database,
    api: &dyn PublicationApi,
    publication_id: &str,
    candidate: &StatsCandidate,
) -> Result<StatsOutcome> {
    let post = match api
        .get_post_with_stats(publication_id, &candidate.external_id)
        .await
    {
        Ok(post) => post,
        Err(e) if e.is_not_found() => return Ok(StatsOutcome::Unavailable),
        Err(e) => return Err(e),
    };

    let Some(stats) = post.stats else {
        return Ok(StatsOutcome::Unavailable);
    };
    let Some(email) = stats.email else {
        return Ok(StatsOutcome::Unavailable);
    };

    let record = derive_stats(&email, &stats.clicks)?;
    let post_id = candidate.post_id;
    let outcome = db
        .writer()
        .call(move |conn| repository::upsert_post_stats(conn, post_id, &record))
        .await?;
    Ok(StatsOutcome::Stored(outcome))
}
