use specforge_core::error::CoreError;
use specforge_crawler::FetchError;
use specforge_queue::QueueError;

/// Why a job handler failed. The `Display` text becomes the job's failure
/// reason and the `error` field of the `job.failed` webhook.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Bad job input. Shown to the user as-is.
    #[error("{0}")]
    Validation(String),

    #[error("File not found")]
    FileNotFound,

    #[error("Crawl cancelled by user")]
    Cancelled,

    #[error(transparent)]
    Core(CoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

impl From<CoreError> for JobError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Validation(msg) => JobError::Validation(msg),
            other => JobError::Core(other),
        }
    }
}
