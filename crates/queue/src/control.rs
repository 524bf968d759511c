//! User-facing job control.

use specforge_core::job::{JobState, JobStatusView};
use specforge_core::types::JobId;

use crate::error::QueueError;
use crate::queue::JobQueue;

/// Failure reason recorded when a user cancels an active job.
pub const CANCELLED_BY_USER: &str = "Cancelled by user";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job had not started and was deleted.
    Removed,
    /// The job was active. It is now `failed`; its worker stops at the next
    /// state check.
    CancellationRequested,
}

/// Cancel a job on behalf of a user.
///
/// Jobs that have not started are removed. Active jobs are moved to
/// `failed`. Finished jobs cannot be cancelled.
pub async fn cancel_job(queue: &dyn JobQueue, id: JobId) -> Result<CancelOutcome, QueueError> {
    let job = queue.get_by_id(id).await?.ok_or(QueueError::NotFound(id))?;
    match job.state {
        JobState::Waiting | JobState::Delayed => {
            queue.remove(id).await?;
            tracing::info!(job_id = %id, "Pending job removed");
            Ok(CancelOutcome::Removed)
        }
        JobState::Active => {
            queue.move_to_failed(id, CANCELLED_BY_USER).await?;
            tracing::info!(job_id = %id, "Cancellation requested for active job");
            Ok(CancelOutcome::CancellationRequested)
        }
        state => Err(QueueError::InvalidState {
            id,
            state,
            action: "cancel",
        }),
    }
}

/// The status view pollers see for one job.
pub async fn job_status(queue: &dyn JobQueue, id: JobId) -> Result<JobStatusView, QueueError> {
    queue
        .get_by_id(id)
        .await?
        .map(|job| job.status())
        .ok_or(QueueError::NotFound(id))
}
