//! Repository for the `jobs` table.
//!
//! Every state transition is guarded by the expected current state in the
//! `WHERE` clause, and worker-side transitions also by the claim's attempt.
//! Methods return the number of affected rows so callers can tell a missing
//! job from one in the wrong state.

use std::time::Duration;

use specforge_core::job::{JobState, StateId};
use specforge_core::types::JobId;
use sqlx::PgPool;

use crate::models::job::{CreateJob, JobRow};

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, job_type, payload, session_id, user_id, state_id, progress, \
    run_at, failure_reason, checkpoint, result, attempt, locked_until, \
    created_at, processed_at, finished_at";

/// Provides queue operations over the `jobs` table.
pub struct JobRepo;

impl JobRepo {
    /// Insert a new waiting or delayed job.
    pub async fn insert(pool: &PgPool, input: &CreateJob) -> Result<JobRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (id, job_type, payload, session_id, user_id, state_id, run_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(input.id)
            .bind(&input.job_type)
            .bind(&input.payload)
            .bind(&input.session_id)
            .bind(&input.user_id)
            .bind(input.state_id)
            .bind(input.run_at)
            .fetch_one(pool)
            .await
    }

    /// Atomically claim the oldest runnable job, mark it active and lease
    /// it for `lease`.
    ///
    /// Runnable means waiting, delayed with `run_at` in the past, or active
    /// with an expired lease (its worker stopped renewing). Each claim bumps
    /// `attempt`. Uses `SELECT FOR UPDATE SKIP LOCKED` so concurrent workers
    /// never claim the same row.
    pub async fn claim_next(
        pool: &PgPool,
        lease: Duration,
    ) -> Result<Option<JobRow>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET state_id = $1, processed_at = NOW(), run_at = NULL, \
                 attempt = attempt + 1, \
                 locked_until = NOW() + make_interval(secs => $4) \
             WHERE id = ( \
                 SELECT id FROM jobs \
                 WHERE state_id = $2 \
                    OR (state_id = $3 AND run_at <= NOW()) \
                    OR (state_id = $1 AND locked_until < NOW()) \
                 ORDER BY created_at ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(JobState::Active.id())
            .bind(JobState::Waiting.id())
            .bind(JobState::Delayed.id())
            .bind(lease.as_secs_f64())
            .fetch_optional(pool)
            .await
    }

    /// Push the lease of an active claim out to `NOW() + lease`.
    pub async fn renew_lease(
        pool: &PgPool,
        id: JobId,
        attempt: i32,
        lease: Duration,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET locked_until = NOW() + make_interval(secs => $3) \
             WHERE id = $1 AND attempt = $2 AND state_id = $4",
        )
        .bind(id)
        .bind(attempt)
        .bind(lease.as_secs_f64())
        .bind(JobState::Active.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn find_by_id(pool: &PgPool, id: JobId) -> Result<Option<JobRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List jobs in one state, oldest first.
    pub async fn list_by_state(
        pool: &PgPool,
        state_id: StateId,
    ) -> Result<Vec<JobRow>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM jobs WHERE state_id = $1 ORDER BY created_at ASC");
        sqlx::query_as::<_, JobRow>(&query)
            .bind(state_id)
            .fetch_all(pool)
            .await
    }

    /// Set progress on an active claim.
    pub async fn update_progress(
        pool: &PgPool,
        id: JobId,
        attempt: i32,
        progress: i16,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET progress = $3 WHERE id = $1 AND attempt = $2 AND state_id = $4",
        )
        .bind(id)
        .bind(attempt)
        .bind(progress)
        .bind(JobState::Active.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Replace the stored crawl checkpoint wholesale. The claim must still
    /// be current and the job active or failed.
    pub async fn save_checkpoint(
        pool: &PgPool,
        id: JobId,
        attempt: i32,
        checkpoint: &serde_json::Value,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET checkpoint = $3 \
             WHERE id = $1 AND attempt = $2 AND state_id IN ($4, $5)",
        )
        .bind(id)
        .bind(attempt)
        .bind(checkpoint)
        .bind(JobState::Active.id())
        .bind(JobState::Failed.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Mark an active claim completed. Clears any checkpoint.
    pub async fn complete(
        pool: &PgPool,
        id: JobId,
        attempt: i32,
        result: Option<&serde_json::Value>,
    ) -> Result<u64, sqlx::Error> {
        let outcome = sqlx::query(
            "UPDATE jobs \
             SET state_id = $3, result = $4, progress = 100, checkpoint = NULL, \
                 locked_until = NULL, finished_at = NOW() \
             WHERE id = $1 AND attempt = $2 AND state_id = $5",
        )
        .bind(id)
        .bind(attempt)
        .bind(JobState::Completed.id())
        .bind(result)
        .bind(JobState::Active.id())
        .execute(pool)
        .await?;
        Ok(outcome.rows_affected())
    }

    /// Mark an active claim failed with a reason.
    pub async fn fail_attempt(
        pool: &PgPool,
        id: JobId,
        attempt: i32,
        reason: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET state_id = $3, failure_reason = $4, locked_until = NULL, finished_at = NOW() \
             WHERE id = $1 AND attempt = $2 AND state_id = $5",
        )
        .bind(id)
        .bind(attempt)
        .bind(JobState::Failed.id())
        .bind(reason)
        .bind(JobState::Active.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Mark an active job failed with a reason, whichever attempt runs it.
    pub async fn fail(pool: &PgPool, id: JobId, reason: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET state_id = $2, failure_reason = $3, locked_until = NULL, finished_at = NOW() \
             WHERE id = $1 AND state_id = $4",
        )
        .bind(id)
        .bind(JobState::Failed.id())
        .bind(reason)
        .bind(JobState::Active.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Return a failed job to `waiting`, keeping its checkpoint.
    pub async fn retry(pool: &PgPool, id: JobId) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET state_id = $2, failure_reason = NULL, progress = 0, \
                 processed_at = NULL, finished_at = NULL \
             WHERE id = $1 AND state_id = $3",
        )
        .bind(id)
        .bind(JobState::Waiting.id())
        .bind(JobState::Failed.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete a job that has not started yet.
    pub async fn delete_pending(pool: &PgPool, id: JobId) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = $1 AND state_id IN ($2, $3)")
            .bind(id)
            .bind(JobState::Waiting.id())
            .bind(JobState::Delayed.id())
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Number of jobs per state id.
    pub async fn count_by_state(pool: &PgPool) -> Result<Vec<(StateId, i64)>, sqlx::Error> {
        sqlx::query_as::<_, (StateId, i64)>(
            "SELECT state_id, COUNT(*) FROM jobs GROUP BY state_id",
        )
        .fetch_all(pool)
        .await
    }
}
