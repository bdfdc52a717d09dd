pub mod analytics;
pub mod client;
pub mod config;
pub mod date_util;
pub mod error;
pub mod storage;
pub mod sync;
pub mod window;

use std::path::Path;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};

pub use analytics::{
    ClassRevenue, DailyStat, OverlapRevenue, OverlapStat, PeriodSummary, RefreshOptions,
    RefreshResult, SegmentSummary, StageResult, WeekdayStat,
};
pub use client::{BeehiivClient, PublicationApi};
pub use config::{AnalyticsConfig, ApiConfig};
pub use error::{Error, Result};
pub use storage::repository::{Publication, RawEvent, RevenueRecord};
pub use storage::schema::WarehouseCounts;
pub use storage::Database;
pub use sync::stats::PostStatsRecord;
pub use sync::{
    JobProgress, JobStatus, JobType, PostSyncReport, ProgressTracker, StatsSyncReport, SyncJob,
    SyncSummary,
};
pub use window::Window;

use storage::{repository, schema};

/// Outcome of syncing one registered publication during `sync_all`.
#[derive(Debug, Clone, Serialize)]
pub struct PublicationSyncOutcome {
    pub publication_id: String,
    pub summary: Option<SyncSummary>,
    pub error: Option<String>,
}

/// Lines read from a JSON-lines import file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub imported: u64,
    /// Blank lines are ignored; lines that fail to parse are counted here.
    pub skipped: u64,
}

/// Main entry point for the newsletter data warehouse.
pub struct NewsletterDW {
    db: Database,
    api: Option<Arc<dyn PublicationApi>>,
    tracker: ProgressTracker,
}

impl NewsletterDW {
    pub fn new(db: Database, api: Arc<dyn PublicationApi>) -> Self {
        Self {
            db,
            api: Some(api),
            tracker: ProgressTracker::new(),
        }
    }

    /// A warehouse without API access. Read, refresh, import, and config
    /// operations work; syncing fails with `Error::NotConfigured`.
    pub fn offline(db: Database) -> Self {
        Self {
            db,
            api: None,
            tracker: ProgressTracker::new(),
        }
    }

    /// Share an existing tracker, e.g. with a poller that outlives this value.
    pub fn with_tracker(mut self, tracker: ProgressTracker) -> Self {
        self.tracker = tracker;
        self
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    fn api(&self) -> Result<&dyn PublicationApi> {
        self.api.as_deref().ok_or_else(|| {
            Error::NotConfigured(format!(
                "no API key; set {} to sync",
                config::ENV_API_KEY
            ))
        })
    }

    // ── Sync ───────────────────────────────────────────────────────

    /// Sync posts, then their stats, for one publication. Runs to completion;
    /// poll `get_progress` from another task to watch it.
    pub async fn start_sync(&self, publication_id: &str) -> Result<SyncSummary> {
        let api = self.api()?;
        let posts = sync::sync_posts(&self.db, api, &self.tracker, publication_id).await?;
        let stats = sync::sync_stats(&self.db, api, &self.tracker, publication_id).await?;
        Ok(SyncSummary {
            publication_id: publication_id.to_string(),
            posts,
            stats,
        })
    }

    /// Sync every registered publication. One failure does not stop the rest.
    pub async fn sync_all(&self) -> Result<Vec<PublicationSyncOutcome>> {
        self.api()?;
        let publications = self.publication_list().await?;
        let mut outcomes = Vec::with_capacity(publications.len());
        for publication in publications {
            let id = publication.publication_id;
            let outcome = match self.start_sync(&id).await {
                Ok(summary) => PublicationSyncOutcome {
                    publication_id: id,
                    summary: Some(summary),
                    error: None,
                },
                Err(e) => {
                    log::error!("Failed to sync {id}: {e}");
                    PublicationSyncOutcome {
                        publication_id: id,
                        summary: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    pub fn get_progress(&self, publication_id: &str) -> JobProgress {
        self.tracker.get_all(publication_id)
    }

    // ── Analytics ──────────────────────────────────────────────────

    pub async fn analytics_config(&self) -> Result<AnalyticsConfig> {
        self.db
            .reader()
            .call(|conn| Ok::<_, rusqlite::Error>(AnalyticsConfig::load(conn)))
            .await?
    }

    pub async fn refresh_caches(&self, options: &RefreshOptions) -> Result<RefreshResult> {
        let cfg = self.analytics_config().await?;
        Ok(analytics::refresh_caches(&self.db, &cfg, options).await)
    }

    pub async fn get_stats(&self, period_days: u32) -> Result<PeriodSummary> {
        analytics::get_stats(&self.db, period_days).await
    }

    pub async fn get_overlap(&self, period_days: u32) -> Result<OverlapStat> {
        analytics::get_overlap(&self.db, period_days)
            .await?
            .ok_or_else(|| not_cached("overlap", period_days))
    }

    pub async fn get_overlap_revenue(&self, period_days: u32) -> Result<OverlapRevenue> {
        analytics::get_overlap_revenue(&self.db, period_days)
            .await?
            .ok_or_else(|| not_cached("overlap", period_days))
    }

    /// Daily rows for the trailing `days` ending today.
    pub async fn get_daily(&self, days: u32) -> Result<Vec<DailyStat>> {
        analytics::get_daily(&self.db, Window::ending_today(days)).await
    }

    pub async fn get_weekday(&self, days: u32) -> Result<Vec<WeekdayStat>> {
        analytics::get_weekday(&self.db, Window::ending_today(days)).await
    }

    pub async fn post_stats(&self, external_id: &str) -> Result<PostStatsRecord> {
        let id = external_id.to_string();
        self.db
            .reader()
            .call(move |conn| repository::get_post_stats(conn, &id))
            .await?
            .ok_or_else(|| Error::NotFound(format!("no stats for post {external_id}")))
    }

    pub async fn status(&self) -> Result<WarehouseCounts> {
        Ok(self
            .db
            .reader()
            .call(|conn| schema::warehouse_counts(conn))
            .await?)
    }

    // ── Publications ───────────────────────────────────────────────

    pub async fn publication_add(&self, publication_id: &str, display_name: Option<&str>) -> Result<()> {
        let id = publication_id.trim().to_string();
        if id.is_empty() {
            return Err(Error::Config("publication id must be non-empty".into()));
        }
        let name = display_name.map(str::to_string);
        self.db
            .writer()
            .call(move |conn| repository::add_publication(conn, &id, name.as_deref()))
            .await?;
        Ok(())
    }

    pub async fn publication_remove(&self, publication_id: &str) -> Result<bool> {
        let id = publication_id.to_string();
        Ok(self
            .db
            .writer()
            .call(move |conn| repository::remove_publication(conn, &id))
            .await?)
    }

    pub async fn publication_list(&self) -> Result<Vec<Publication>> {
        Ok(self
            .db
            .reader()
            .call(|conn| repository::list_publications(conn))
            .await?)
    }

    // ── Import ─────────────────────────────────────────────────────

    /// Load tracking events from a JSON-lines export.
    pub async fn import_events(&self, path: impl AsRef<Path>) -> Result<ImportReport> {
        let (events, skipped) = read_json_lines::<RawEvent>(path.as_ref()).await?;
        let imported = events.len() as u64;
        self.db
            .writer()
            .call(move |conn| {
                let tx = conn.transaction()?;
                for event in &events {
                    repository::insert_event(&tx, event)?;
                }
                tx.commit()
            })
            .await?;
        log::info!("Imported {imported} events ({skipped} lines skipped)");
        Ok(ImportReport { imported, skipped })
    }

    /// Load per-day, per-segment revenue from a JSON-lines export. Existing
    /// amounts for the same day and segment are replaced.
    pub async fn import_revenue(&self, path: impl AsRef<Path>) -> Result<ImportReport> {
        let (records, skipped) = read_json_lines::<RevenueRecord>(path.as_ref()).await?;
        let imported = records.len() as u64;
        self.db
            .writer()
            .call(move |conn| {
                let tx = conn.transaction()?;
                for record in &records {
                    repository::upsert_revenue(&tx, record)?;
                }
                tx.commit()
            })
            .await?;
        log::info!("Imported {imported} revenue rows ({skipped} lines skipped)");
        Ok(ImportReport { imported, skipped })
    }

    // ── Config ─────────────────────────────────────────────────────

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        Ok(self
            .db
            .reader()
            .call(move |conn| repository::get_config(conn, &key))
            .await?)
    }

    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        config::validate_config_value(key, value)?;
        let key = key.to_string();
        let value = value.trim().to_string();
        self.db
            .writer()
            .call(move |conn| repository::set_config(conn, &key, &value))
            .await?;
        Ok(())
    }

    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        Ok(self
            .db
            .reader()
            .call(|conn| repository::list_config(conn))
            .await?)
    }
}

fn not_cached(what: &str, period_days: u32) -> Error {
    Error::NotFound(format!(
        "no cached {what} stats for {period_days}d; run `newsletterdw refresh`"
    ))
}

/// Parse one JSON value per non-blank line. Lines that fail to parse are
/// logged with their line number and counted.
async fn read_json_lines<T: DeserializeOwned>(path: &Path) -> Result<(Vec<T>, u64)> {
    let raw = tokio::fs::read_to_string(path).await?;
    let mut items = Vec::new();
    let mut skipped = 0;
    for (idx, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(line) {
            Ok(item) => items.push(item),
            Err(e) => {
                log::warn!("{}:{}: {e}", path.display(), idx + 1);
                skipped += 1;
            }
        }
    }
    Ok((items, skipped))
}
