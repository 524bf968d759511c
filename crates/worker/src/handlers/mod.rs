//! Job handlers, one per job type.
//!
//! A handler returns the job's optional result value on success. Progress
//! is reported through the [`JobContext`] as it goes; recording the final
//! state and firing webhooks is left to the dispatcher.

pub mod batch;
pub mod crawl;
pub mod ingest;

use serde_json::Value;
use specforge_core::job::{Job, JobPayload};
use tokio_util::sync::CancellationToken;

use crate::context::JobContext;
use crate::error::JobError;

/// Run the handler for `job`'s type.
pub async fn dispatch(
    ctx: &JobContext,
    job: &Job,
    cancel: &CancellationToken,
) -> Result<Option<Value>, JobError> {
    match &job.payload {
        JobPayload::Upload(payload) => ingest::upload(ctx, job, payload).await,
        JobPayload::Paste(payload) => ingest::paste(ctx, job, payload).await,
        JobPayload::Crawl(payload) => crawl::crawl(ctx, job, payload, cancel).await,
        JobPayload::BatchGenerate(payload) => batch::generate(ctx, job, payload).await,
    }
}
