//! The queue contract.

use std::time::Duration;

use async_trait::async_trait;
use specforge_core::checkpoint::CrawlCheckpoint;
use specforge_core::job::{Claim, Job, JobCounts, JobPayload, JobState};
use specforge_core::types::JobId;

use crate::error::QueueError;

/// How long a claim stays valid without renewal unless a backend is
/// configured otherwise.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(30);

/// A job submission.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub payload: JobPayload,
    pub session_id: String,
    pub user_id: Option<String>,
    /// When set, the job starts `delayed` and becomes runnable after this long.
    pub delay: Option<Duration>,
}

impl NewJob {
    pub fn new(payload: JobPayload, session_id: impl Into<String>) -> Self {
        Self {
            payload,
            session_id: session_id.into(),
            user_id: None,
            delay: None,
        }
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Durable, at-least-once job queue.
///
/// State machine: `waiting -> active -> {completed, failed}`, `delayed ->
/// waiting` when due, and `failed -> waiting` only through [`retry`].
///
/// Every claim carries a lease. The owning worker renews it while the job
/// runs; once it lapses the job is runnable again and the next
/// [`dequeue`] starts a new attempt. Worker-side transitions take the
/// [`Claim`] they act for and fail with [`QueueError::StaleClaim`] once a
/// newer attempt exists.
///
/// [`retry`]: JobQueue::retry
/// [`dequeue`]: JobQueue::dequeue
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Persist a new job. Fails with [`QueueError::Unavailable`] when the
    /// backend cannot be reached; the job is then never created.
    async fn enqueue(&self, job: NewJob) -> Result<JobId, QueueError>;

    /// Claim the oldest runnable job, mark it `active`, bump its attempt and
    /// start a lease. Runnable means `waiting`, due `delayed`, or `active`
    /// with an expired lease.
    ///
    /// Returns `None` when nothing is runnable; callers poll.
    async fn dequeue(&self) -> Result<Option<Job>, QueueError>;

    async fn get_by_id(&self, id: JobId) -> Result<Option<Job>, QueueError>;

    async fn list_by_state(&self, state: JobState) -> Result<Vec<Job>, QueueError>;

    /// Extend the lease of an active claim.
    async fn renew_lease(&self, claim: Claim) -> Result<(), QueueError>;

    /// Set progress (clamped to 100) on an active claim.
    async fn update_progress(&self, claim: Claim, progress: u8) -> Result<(), QueueError>;

    /// Replace the stored crawl checkpoint. Allowed while the claim is
    /// `active`, and after it was failed, so a cancelled crawl can record
    /// where it stopped.
    async fn save_checkpoint(
        &self,
        claim: Claim,
        checkpoint: &CrawlCheckpoint,
    ) -> Result<(), QueueError>;

    /// Mark an active claim `completed`, recording an optional result.
    async fn complete(
        &self,
        claim: Claim,
        result: Option<serde_json::Value>,
    ) -> Result<(), QueueError>;

    /// Mark an active claim `failed`. A claim that is already `failed`
    /// keeps its original reason and the call succeeds.
    async fn fail_attempt(&self, claim: Claim, reason: &str) -> Result<(), QueueError>;

    /// Mark an active job `failed` regardless of which attempt runs it.
    /// A job that is already `failed` keeps its original reason and the
    /// call succeeds.
    async fn move_to_failed(&self, id: JobId, reason: &str) -> Result<(), QueueError>;

    /// Return a `failed` job to `waiting`. The checkpoint is kept.
    async fn retry(&self, id: JobId) -> Result<(), QueueError>;

    /// Delete a job. Legal only while `waiting` or `delayed`.
    async fn remove(&self, id: JobId) -> Result<(), QueueError>;

    /// Number of jobs in each state.
    async fn counts(&self) -> Result<JobCounts, QueueError>;
}

impl NewJob {
    /// Absolute time at which a delayed job becomes runnable.
    pub fn run_at(&self) -> Result<Option<chrono::DateTime<chrono::Utc>>, QueueError> {
        self.delay
            .map(|d| {
                chrono::Duration::from_std(d)
                    .map(|d| chrono::Utc::now() + d)
                    .map_err(|e| QueueError::Backend(format!("invalid delay: {e}")))
            })
            .transpose()
    }
}

/// End of a lease of length `lease` starting at `now`.
pub(crate) fn lease_end(
    now: chrono::DateTime<chrono::Utc>,
    lease: Duration,
) -> chrono::DateTime<chrono::Utc> {
    chrono::Duration::from_std(lease)
        .ok()
        .and_then(|lease| now.checked_add_signed(lease))
        .unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC)
}
