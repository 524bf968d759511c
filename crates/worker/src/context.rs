use std::sync::Arc;

use specforge_core::job::{Claim, Job};
use specforge_core::store::{CodeGenerator, SchemaStore};
use specforge_crawler::FetcherFactory;
use specforge_events::WebhookNotifier;
use specforge_queue::JobQueue;

use crate::config::WorkerConfig;

/// Everything a job handler needs, shared by all jobs on one worker.
pub struct JobContext {
    pub queue: Arc<dyn JobQueue>,
    pub schemas: Arc<dyn SchemaStore>,
    pub generator: Arc<dyn CodeGenerator>,
    pub notifier: Arc<WebhookNotifier>,
    pub fetchers: Arc<dyn FetcherFactory>,
    pub config: WorkerConfig,
}

impl JobContext {
    /// Record progress for the claimed `job`. Failures are logged, never
    /// returned.
    pub async fn report_progress(&self, job: &Job, progress: u8) {
        report_progress(self.queue.as_ref(), job.claim(), progress).await;
    }
}

/// Progress writes are advisory: a job that was cancelled, finished or
/// claimed again elsewhere rejects them, and that must not fail the handler.
pub async fn report_progress(queue: &dyn JobQueue, claim: Claim, progress: u8) {
    if let Err(e) = queue.update_progress(claim, progress.min(100)).await {
        tracing::debug!(
            job_id = %claim.job_id,
            attempt = claim.attempt,
            progress,
            error = %e,
            "Progress update rejected",
        );
    }
}
