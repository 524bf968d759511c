//! [`JobQueue`] over the `jobs` table.
//!
//! Claims use `FOR UPDATE SKIP LOCKED`, so any number of worker processes
//! can share one database. A claim whose worker stops renewing its lease is
//! picked up by the next `dequeue` anywhere.

use std::time::Duration;

use async_trait::async_trait;
use specforge_core::checkpoint::CrawlCheckpoint;
use specforge_core::job::{Claim, Job, JobCounts, JobState};
use specforge_core::types::JobId;
use specforge_db::models::job::{CreateJob, JobRow};
use specforge_db::repositories::JobRepo;
use specforge_db::DbPool;

use crate::error::QueueError;
use crate::queue::{JobQueue, NewJob, DEFAULT_LEASE};

#[derive(Clone)]
pub struct PgJobQueue {
    pool: DbPool,
    lease: Duration,
}

impl PgJobQueue {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            lease: DEFAULT_LEASE,
        }
    }

    /// Use `lease` as the claim lease instead of [`DEFAULT_LEASE`].
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Explain why a guarded update touched no rows. `attempt` is the
    /// claim's attempt for worker-side transitions.
    async fn rejected(&self, id: JobId, attempt: Option<u32>, action: &'static str) -> QueueError {
        match self.get_by_id(id).await {
            Ok(Some(job)) => match attempt {
                Some(attempt) if attempt != job.attempt => QueueError::StaleClaim {
                    id,
                    attempt,
                    current: job.attempt,
                },
                _ => QueueError::InvalidState {
                    id,
                    state: job.state,
                    action,
                },
            },
            Ok(None) => QueueError::NotFound(id),
            Err(e) => e,
        }
    }

    async fn guarded(&self, rows: u64, id: JobId, action: &'static str) -> Result<(), QueueError> {
        if rows > 0 {
            Ok(())
        } else {
            Err(self.rejected(id, None, action).await)
        }
    }

    async fn claim_guarded(
        &self,
        rows: u64,
        claim: Claim,
        action: &'static str,
    ) -> Result<(), QueueError> {
        if rows > 0 {
            Ok(())
        } else {
            Err(self.rejected(claim.job_id, Some(claim.attempt), action).await)
        }
    }
}

fn decode(row: JobRow) -> Result<Job, QueueError> {
    Ok(Job::try_from(row)?)
}

fn attempt_param(claim: Claim) -> Result<i32, QueueError> {
    i32::try_from(claim.attempt)
        .map_err(|_| QueueError::Corrupt(format!("attempt {} out of range", claim.attempt)))
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(&self, new: NewJob) -> Result<JobId, QueueError> {
        let run_at = new.run_at()?;
        let input = CreateJob::from_payload(
            uuid::Uuid::now_v7(),
            &new.payload,
            new.session_id,
            new.user_id,
            run_at,
        )
        .map_err(|e| QueueError::Backend(format!("payload encoding: {e}")))?;
        let row = JobRepo::insert(&self.pool, &input).await?;
        tracing::debug!(job_id = %row.id, job_type = %row.job_type, "Job enqueued");
        Ok(row.id)
    }

    async fn dequeue(&self) -> Result<Option<Job>, QueueError> {
        JobRepo::claim_next(&self.pool, self.lease)
            .await?
            .map(decode)
            .transpose()
    }

    async fn get_by_id(&self, id: JobId) -> Result<Option<Job>, QueueError> {
        JobRepo::find_by_id(&self.pool, id)
            .await?
            .map(decode)
            .transpose()
    }

    async fn list_by_state(&self, state: JobState) -> Result<Vec<Job>, QueueError> {
        JobRepo::list_by_state(&self.pool, state.id())
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    async fn renew_lease(&self, claim: Claim) -> Result<(), QueueError> {
        let rows =
            JobRepo::renew_lease(&self.pool, claim.job_id, attempt_param(claim)?, self.lease)
                .await?;
        self.claim_guarded(rows, claim, "renew lease of").await
    }

    async fn update_progress(&self, claim: Claim, progress: u8) -> Result<(), QueueError> {
        let rows = JobRepo::update_progress(
            &self.pool,
            claim.job_id,
            attempt_param(claim)?,
            i16::from(progress.min(100)),
        )
        .await?;
        self.claim_guarded(rows, claim, "update progress of").await
    }

    async fn save_checkpoint(
        &self,
        claim: Claim,
        checkpoint: &CrawlCheckpoint,
    ) -> Result<(), QueueError> {
        let value = serde_json::to_value(checkpoint)
            .map_err(|e| QueueError::Backend(format!("checkpoint encoding: {e}")))?;
        let rows =
            JobRepo::save_checkpoint(&self.pool, claim.job_id, attempt_param(claim)?, &value)
                .await?;
        self.claim_guarded(rows, claim, "checkpoint").await
    }

    async fn complete(
        &self,
        claim: Claim,
        result: Option<serde_json::Value>,
    ) -> Result<(), QueueError> {
        let rows =
            JobRepo::complete(&self.pool, claim.job_id, attempt_param(claim)?, result.as_ref())
                .await?;
        self.claim_guarded(rows, claim, "complete").await
    }

    async fn fail_attempt(&self, claim: Claim, reason: &str) -> Result<(), QueueError> {
        let rows =
            JobRepo::fail_attempt(&self.pool, claim.job_id, attempt_param(claim)?, reason).await?;
        if rows > 0 {
            return Ok(());
        }
        match self
            .rejected(claim.job_id, Some(claim.attempt), "fail")
            .await
        {
            QueueError::InvalidState {
                state: JobState::Failed,
                ..
            } => Ok(()),
            other => Err(other),
        }
    }

    async fn move_to_failed(&self, id: JobId, reason: &str) -> Result<(), QueueError> {
        let rows = JobRepo::fail(&self.pool, id, reason).await?;
        if rows > 0 {
            return Ok(());
        }
        match self.rejected(id, None, "fail").await {
            QueueError::InvalidState {
                state: JobState::Failed,
                ..
            } => Ok(()),
            other => Err(other),
        }
    }

    async fn retry(&self, id: JobId) -> Result<(), QueueError> {
        let rows = JobRepo::retry(&self.pool, id).await?;
        self.guarded(rows, id, "retry").await
    }

    async fn remove(&self, id: JobId) -> Result<(), QueueError> {
        let rows = JobRepo::delete_pending(&self.pool, id).await?;
        self.guarded(rows, id, "remove").await
    }

    async fn counts(&self) -> Result<JobCounts, QueueError> {
        let mut counts = JobCounts::default();
        for (state_id, n) in JobRepo::count_by_state(&self.pool).await? {
            let state = JobState::from_id(state_id)
                .ok_or_else(|| QueueError::Corrupt(format!("unknown state_id {state_id}")))?;
            counts.add(state, u64::try_from(n).unwrap_or(0));
        }
        Ok(counts)
    }
}
