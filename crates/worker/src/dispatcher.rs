//! Job dispatcher.
//!
//! Polls the queue every `poll_interval` and runs up to `concurrency` jobs
//! at once. Each active job gets a [`CancellationToken`] and a watchdog task
//! that renews the claim's lease every `cancel_check_interval`. When the
//! renewal is refused (the job was cancelled, removed or claimed again
//! elsewhere) the token fires and the crawl handler stops at its next check.
//! Outcomes are recorded against the claim, so a superseded attempt never
//! overwrites a newer one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use specforge_core::job::{Claim, Job, JobState};
use specforge_core::types::JobId;
use specforge_queue::{JobQueue, QueueError};
use tokio::sync::Semaphore;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::context::JobContext;
use crate::error::JobError;
use crate::handlers;

type ActiveJobs = Arc<Mutex<HashMap<JobId, CancellationToken>>>;

/// Background job worker. Cheap to clone; clones share active-job state.
#[derive(Clone)]
pub struct Worker {
    ctx: Arc<JobContext>,
    active: ActiveJobs,
}

impl Worker {
    pub fn new(ctx: JobContext) -> Self {
        Self {
            ctx: Arc::new(ctx),
            active: Arc::default(),
        }
    }

    pub fn context(&self) -> &JobContext {
        &self.ctx
    }

    /// Run the dispatch loop until `shutdown` fires, then wait for in-flight
    /// jobs to finish.
    pub async fn run(&self, shutdown: CancellationToken) {
        let concurrency = self.ctx.config.concurrency;
        let slots = Arc::new(Semaphore::new(concurrency));
        let mut ticker = tokio::time::interval(self.ctx.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            concurrency,
            poll_interval_ms = self.ctx.config.poll_interval.as_millis() as u64,
            "Job worker started",
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Job worker shutting down");
                    break;
                }
                _ = ticker.tick() => self.fill_slots(&slots).await,
            }
        }

        let in_flight = concurrency - slots.available_permits();
        if in_flight > 0 {
            tracing::info!(in_flight, "Waiting for active jobs to finish");
        }
        let _ = slots.acquire_many(concurrency as u32).await;
        tracing::info!("Job worker stopped");
    }

    /// Claim jobs while there are free slots and waiting work.
    async fn fill_slots(&self, slots: &Arc<Semaphore>) {
        while let Ok(permit) = slots.clone().try_acquire_owned() {
            match self.ctx.queue.dequeue().await {
                Ok(Some(job)) => {
                    let worker = self.clone();
                    tokio::spawn(async move {
                        worker.process_job(job).await;
                        drop(permit);
                    });
                }
                Ok(None) => break,
                Err(e) => {
                    if e.is_transient() {
                        tracing::warn!(error = %e, "Queue unavailable, will retry");
                    } else {
                        tracing::error!(error = %e, "Dequeue failed");
                    }
                    break;
                }
            }
        }
    }

    /// Claim and run one job. Returns the id of the job processed, if any.
    pub async fn process_next(&self) -> Result<Option<JobId>, QueueError> {
        let Some(job) = self.ctx.queue.dequeue().await? else {
            return Ok(None);
        };
        let id = job.id;
        self.process_job(job).await;
        Ok(Some(id))
    }

    /// Run a claimed job to completion and record its outcome.
    pub async fn process_job(&self, job: Job) {
        let span = tracing::info_span!(
            "job",
            job_id = %job.id,
            job_type = %job.job_type(),
            attempt = job.attempt,
        );
        async {
            tracing::info!(session_id = %job.session_id, "Job started");

            let cancel = CancellationToken::new();
            self.active_jobs().insert(job.id, cancel.clone());
            let watchdog = tokio::spawn(watch_job_state(
                self.ctx.queue.clone(),
                job.claim(),
                self.ctx.config.cancel_check_interval,
                cancel.clone(),
            ));

            let outcome = handlers::dispatch(&self.ctx, &job, &cancel).await;

            watchdog.abort();
            self.active_jobs().remove(&job.id);

            match outcome {
                Ok(result) => self.finish_completed(&job, result).await,
                Err(e) => self.finish_failed(&job, e).await,
            }
        }
        .instrument(span)
        .await
    }

    /// Stop an active job on this worker. Returns `false` if it is not
    /// running here.
    pub fn cancel(&self, job_id: JobId) -> bool {
        match self.active_jobs().get(&job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Ids of jobs currently running on this worker.
    pub fn active_job_ids(&self) -> Vec<JobId> {
        self.active_jobs().keys().copied().collect()
    }

    fn active_jobs(&self) -> std::sync::MutexGuard<'_, HashMap<JobId, CancellationToken>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    // -----------------------------------------------------------------------
    // Outcomes
    // -----------------------------------------------------------------------

    async fn finish_completed(&self, job: &Job, result: Option<Value>) {
        match self.ctx.queue.complete(job.claim(), result.clone()).await {
            Ok(()) => {
                tracing::info!("Job completed");
                self.ctx
                    .notifier
                    .on_job_completed(&job.session_id, job.id, job.job_type(), result.as_ref())
                    .await;
            }
            Err(QueueError::InvalidState {
                state: JobState::Failed,
                ..
            }) => {
                // Cancelled elsewhere while the handler was finishing.
                let reason = self.stored_failure_reason(job.id).await.unwrap_or_default();
                tracing::info!(reason = %reason, "Job was failed before it could complete");
                self.ctx
                    .notifier
                    .on_job_failed(&job.session_id, job.id, job.job_type(), &reason)
                    .await;
            }
            Err(e @ QueueError::StaleClaim { .. }) => {
                tracing::warn!(error = %e, "Job was claimed again, dropping result");
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to record job completion");
            }
        }
    }

    async fn finish_failed(&self, job: &Job, error: JobError) {
        let reason = error.to_string();
        tracing::warn!(error = %reason, "Job failed");

        let reason = match self.ctx.queue.fail_attempt(job.claim(), &reason).await {
            // A job failed elsewhere first (user cancel) keeps that reason.
            Ok(()) => self.stored_failure_reason(job.id).await.unwrap_or(reason),
            Err(e @ QueueError::StaleClaim { .. }) => {
                tracing::warn!(error = %e, "Job was claimed again, dropping failure");
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to record job failure");
                reason
            }
        };
        self.ctx
            .notifier
            .on_job_failed(&job.session_id, job.id, job.job_type(), &reason)
            .await;
    }

    async fn stored_failure_reason(&self, job_id: JobId) -> Option<String> {
        match self.ctx.queue.get_by_id(job_id).await {
            Ok(Some(job)) => job.failure_reason,
            _ => None,
        }
    }
}

/// Renew `claim`'s lease every `every` and fire `cancel` once the queue
/// refuses. Runs until aborted.
async fn watch_job_state(
    queue: Arc<dyn JobQueue>,
    claim: Claim,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match queue.renew_lease(claim).await {
            Ok(()) => {}
            Err(
                e @ (QueueError::NotFound(_)
                | QueueError::InvalidState { .. }
                | QueueError::StaleClaim { .. }),
            ) => {
                tracing::info!(job_id = %claim.job_id, reason = %e, "Job no longer held, cancelling");
                cancel.cancel();
                return;
            }
            Err(e) => {
                tracing::warn!(job_id = %claim.job_id, error = %e, "Lease renewal failed");
            }
        }
    }
}
