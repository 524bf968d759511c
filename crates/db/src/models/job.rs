//! Row model for the `jobs` table.

use serde_json::json;
use specforge_core::checkpoint::CrawlCheckpoint;
use specforge_core::job::{Job, JobPayload, JobState, StateId};
use specforge_core::types::{JobId, Timestamp};
use sqlx::FromRow;

use super::RowDecodeError;

/// A row from the `jobs` table.
///
/// `payload` holds only the type-specific body; `job_type` is the tag.
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub id: JobId,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub session_id: String,
    pub user_id: Option<String>,
    pub state_id: StateId,
    pub progress: i16,
    pub run_at: Option<Timestamp>,
    pub failure_reason: Option<String>,
    pub checkpoint: Option<serde_json::Value>,
    pub result: Option<serde_json::Value>,
    pub attempt: i32,
    pub locked_until: Option<Timestamp>,
    pub created_at: Timestamp,
    pub processed_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
}

/// Insert DTO for a new job.
#[derive(Debug, Clone)]
pub struct CreateJob {
    pub id: JobId,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub session_id: String,
    pub user_id: Option<String>,
    pub state_id: StateId,
    pub run_at: Option<Timestamp>,
}

impl CreateJob {
    /// Split a typed payload into its tag and body columns.
    pub fn from_payload(
        id: JobId,
        payload: &JobPayload,
        session_id: String,
        user_id: Option<String>,
        run_at: Option<Timestamp>,
    ) -> Result<Self, serde_json::Error> {
        let mut tagged = serde_json::to_value(payload)?;
        let body = tagged
            .get_mut("payload")
            .map(serde_json::Value::take)
            .unwrap_or(serde_json::Value::Null);
        let state = if run_at.is_some() {
            JobState::Delayed
        } else {
            JobState::Waiting
        };
        Ok(Self {
            id,
            job_type: payload.job_type().as_str().to_string(),
            payload: body,
            session_id,
            user_id,
            state_id: state.id(),
            run_at,
        })
    }
}

impl TryFrom<JobRow> for Job {
    type Error = RowDecodeError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| RowDecodeError {
            table: "jobs",
            id: row.id,
            reason,
        };

        let payload: JobPayload =
            serde_json::from_value(json!({"type": row.job_type, "payload": row.payload}))
                .map_err(|e| corrupt(format!("payload: {e}")))?;
        let state = JobState::from_id(row.state_id)
            .ok_or_else(|| corrupt(format!("unknown state_id {}", row.state_id)))?;
        let checkpoint = row
            .checkpoint
            .clone()
            .map(serde_json::from_value::<CrawlCheckpoint>)
            .transpose()
            .map_err(|e| corrupt(format!("checkpoint: {e}")))?;
        let progress =
            u8::try_from(row.progress.clamp(0, 100)).map_err(|e| corrupt(e.to_string()))?;
        let attempt =
            u32::try_from(row.attempt).map_err(|e| corrupt(format!("attempt: {e}")))?;

        Ok(Job {
            id: row.id,
            payload,
            session_id: row.session_id,
            user_id: row.user_id,
            state,
            progress,
            created_at: row.created_at,
            processed_at: row.processed_at,
            finished_at: row.finished_at,
            failure_reason: row.failure_reason,
            checkpoint,
            result: row.result,
            attempt,
            locked_until: row.locked_until,
        })
    }
}
