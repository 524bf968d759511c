use specforge_core::job::JobState;
use specforge_core::types::JobId;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The queue backend could not be reached. Callers may retry.
    #[error("Queue unavailable: {0}")]
    Unavailable(String),

    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Cannot {action} job {id} in state {state}")]
    InvalidState {
        id: JobId,
        state: JobState,
        action: &'static str,
    },

    /// The job has been claimed again since this attempt started.
    #[error("Job {id} attempt {attempt} was superseded by attempt {current}")]
    StaleClaim { id: JobId, attempt: u32, current: u32 },

    #[error("Corrupt job record: {0}")]
    Corrupt(String),

    #[error("Queue backend error: {0}")]
    Backend(String),
}

impl QueueError {
    /// Whether the failure is infrastructure-level and worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, QueueError::Unavailable(_))
    }
}

impl From<sqlx::Error> for QueueError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Tls(_) => QueueError::Unavailable(e.to_string()),
            other => QueueError::Backend(other.to_string()),
        }
    }
}

impl From<specforge_db::models::RowDecodeError> for QueueError {
    fn from(e: specforge_db::models::RowDecodeError) -> Self {
        QueueError::Corrupt(e.to_string())
    }
}
