use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// How long a finished job stays visible to pollers, in seconds.
pub const DEFAULT_TTL_SECS: i64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Posts,
    Stats,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Posts => "posts",
            JobType::Stats => "stats",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

/// Live state of one long-running sync job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncJob {
    pub subject_id: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub current: u64,
    pub total: u64,
    pub percentage: u8,
    pub message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    #[serde(skip)]
    expires_at: Option<DateTime<Utc>>,
}

impl SyncJob {
    fn recompute_percentage(&mut self) {
        self.percentage = percentage(self.current, self.total);
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// `round(current / total * 100)`, clamped to `[0, 100]`; 0 when total is 0.
pub fn percentage(current: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (current as f64 / total as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}

/// Snapshot of both jobs for one subject. Either may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobProgress {
    pub posts: Option<SyncJob>,
    pub stats: Option<SyncJob>,
}

type JobKey = (String, JobType);

/// Shared map of live sync jobs keyed by `(subject, job type)`.
///
/// Cloning yields another handle on the same map. Locks are held only for the
/// duration of an in-memory mutation, never across an await. Finished jobs
/// expire `ttl` after completion: readers treat them as absent, and `sweep`
/// drops them.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    jobs: Arc<RwLock<HashMap<JobKey, SyncJob>>>,
    ttl: Duration,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::with_ttl(Duration::seconds(DEFAULT_TTL_SECS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    fn key(subject: &str, job_type: JobType) -> JobKey {
        (subject.to_string(), job_type)
    }

    /// Apply `f` to the live job under `key`. Returns false when there is no
    /// job or it has expired.
    fn mutate(&self, subject: &str, job_type: JobType, f: impl FnOnce(&mut SyncJob) -> bool) -> bool {
        let now = Utc::now();
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let key = Self::key(subject, job_type);
        let expired = match jobs.get(&key) {
            Some(job) => job.is_expired(now),
            None => return false,
        };
        if expired {
            jobs.remove(&key);
            return false;
        }
        jobs.get_mut(&key).is_some_and(f)
    }

    /// Create or overwrite the job in the running state.
    pub fn start(&self, subject: &str, job_type: JobType, total: u64) {
        let job = SyncJob {
            subject_id: subject.to_string(),
            job_type,
            status: JobStatus::Running,
            current: 0,
            total,
            percentage: 0,
            message: None,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
            expires_at: None,
        };
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        jobs.insert(Self::key(subject, job_type), job);
    }

    /// Replace the estimated total once the real one is known.
    pub fn set_total(&self, subject: &str, job_type: JobType, total: u64) -> bool {
        let applied = self.mutate(subject, job_type, |job| {
            if job.status.is_terminal() {
                return false;
            }
            job.total = total;
            job.recompute_percentage();
            true
        });
        if !applied {
            log::warn!("set_total on missing or finished {} job for {subject}", job_type.as_str());
        }
        applied
    }

    /// Record progress. `current` never moves backwards; a lower value keeps
    /// the stored count but still replaces the message.
    pub fn update(&self, subject: &str, job_type: JobType, current: u64, message: Option<&str>) -> bool {
        let applied = self.mutate(subject, job_type, |job| {
            if job.status.is_terminal() {
                return false;
            }
            job.current = job.current.max(current);
            if let Some(msg) = message {
                job.message = Some(msg.to_string());
            }
            job.recompute_percentage();
            true
        });
        if !applied {
            log::warn!("update on missing or finished {} job for {subject}", job_type.as_str());
        }
        applied
    }

    pub fn complete(&self, subject: &str, job_type: JobType, message: &str) -> bool {
        let ttl = self.ttl;
        let applied = self.mutate(subject, job_type, |job| {
            if job.status.is_terminal() {
                return false;
            }
            let now = Utc::now();
            job.status = JobStatus::Completed;
            job.percentage = 100;
            job.message = Some(message.to_string());
            job.completed_at = Some(now);
            job.expires_at = Some(now + ttl);
            true
        });
        if !applied {
            log::warn!("complete on missing or finished {} job for {subject}", job_type.as_str());
        }
        applied
    }

    pub fn error(&self, subject: &str, job_type: JobType, message: &str) -> bool {
        let ttl = self.ttl;
        let applied = self.mutate(subject, job_type, |job| {
            if job.status.is_terminal() {
                return false;
            }
            let now = Utc::now();
            job.status = JobStatus::Error;
            job.error = Some(message.to_string());
            job.completed_at = Some(now);
            job.expires_at = Some(now + ttl);
            true
        });
        if !applied {
            log::warn!("error on missing or finished {} job for {subject}", job_type.as_str());
        }
        applied
    }

    /// A copy of the job, or `None` if absent or expired.
    pub fn get(&self, subject: &str, job_type: JobType) -> Option<SyncJob> {
        let now = Utc::now();
        let key = Self::key(subject, job_type);
        {
            let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
            match jobs.get(&key) {
                None => return None,
                Some(job) if !job.is_expired(now) => return Some(job.clone()),
                Some(_) => {}
            }
        }
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        if jobs.get(&key).is_some_and(|job| job.is_expired(now)) {
            jobs.remove(&key);
        }
        None
    }

    pub fn get_all(&self, subject: &str) -> JobProgress {
        JobProgress {
            posts: self.get(subject, JobType::Posts),
            stats: self.get(subject, JobType::Stats),
        }
    }

    /// Drop every expired job. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Utc::now();
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let before = jobs.len();
        jobs.retain(|_, job| !job.is_expired(now));
        before - jobs.len()
    }

    /// Number of jobs currently held, expired ones included.
    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
