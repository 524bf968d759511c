//! In-process [`JobQueue`] implementation.
//!
//! All state lives behind one mutex; no lock is held across an await.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use specforge_core::checkpoint::CrawlCheckpoint;
use specforge_core::job::{Claim, Job, JobCounts, JobState};
use specforge_core::types::{JobId, Timestamp};

use crate::error::QueueError;
use crate::queue::{lease_end, JobQueue, NewJob, DEFAULT_LEASE};

#[derive(Default)]
struct Inner {
    jobs: HashMap<JobId, Job>,
    /// FIFO of runnable job ids.
    waiting: VecDeque<JobId>,
    /// Delayed job ids with the time they become runnable.
    delayed: Vec<(Timestamp, JobId)>,
}

impl Inner {
    fn job_mut(&mut self, id: JobId) -> Result<&mut Job, QueueError> {
        self.jobs.get_mut(&id).ok_or(QueueError::NotFound(id))
    }

    /// The job `claim` refers to, provided no later attempt has started.
    fn claimed_mut(&mut self, claim: Claim) -> Result<&mut Job, QueueError> {
        let job = self.job_mut(claim.job_id)?;
        if job.attempt != claim.attempt {
            return Err(QueueError::StaleClaim {
                id: claim.job_id,
                attempt: claim.attempt,
                current: job.attempt,
            });
        }
        Ok(job)
    }

    /// Move every due delayed job to the back of `waiting`, earliest first.
    fn promote_due(&mut self, now: Timestamp) {
        let (mut due, later): (Vec<_>, Vec<_>) = std::mem::take(&mut self.delayed)
            .into_iter()
            .partition(|(run_at, _)| *run_at <= now);
        self.delayed = later;
        due.sort_by_key(|(run_at, _)| *run_at);
        for (_, id) in due {
            if let Some(job) = self.jobs.get_mut(&id) {
                job.state = JobState::Waiting;
                self.waiting.push_back(id);
            }
        }
    }

    /// Return active jobs whose lease has lapsed to the back of `waiting`,
    /// oldest first.
    fn requeue_expired(&mut self, now: Timestamp) {
        let mut expired: Vec<&mut Job> = self
            .jobs
            .values_mut()
            .filter(|j| j.state == JobState::Active && j.locked_until.is_some_and(|t| t <= now))
            .collect();
        expired.sort_by_key(|j| (j.created_at, j.id));
        for job in expired {
            tracing::warn!(job_id = %job.id, attempt = job.attempt, "Job lease expired, requeueing");
            job.state = JobState::Waiting;
            job.locked_until = None;
            self.waiting.push_back(job.id);
        }
    }
}

/// Queue backed by process memory. Contents are lost on restart.
pub struct MemoryJobQueue {
    inner: Mutex<Inner>,
    closed: AtomicBool,
    lease: Duration,
}

impl Default for MemoryJobQueue {
    fn default() -> Self {
        Self {
            inner: Mutex::default(),
            closed: AtomicBool::new(false),
            lease: DEFAULT_LEASE,
        }
    }
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `lease` as the claim lease instead of [`DEFAULT_LEASE`].
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Simulate losing the backend: every later call returns
    /// [`QueueError::Unavailable`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, QueueError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable("queue closed".into()));
        }
        self.inner
            .lock()
            .map_err(|_| QueueError::Backend("queue lock poisoned".into()))
    }
}

fn invalid(job: &Job, action: &'static str) -> QueueError {
    QueueError::InvalidState {
        id: job.id,
        state: job.state,
        action,
    }
}

fn mark_failed(job: &mut Job, reason: &str) {
    job.state = JobState::Failed;
    job.failure_reason = Some(reason.to_string());
    job.locked_until = None;
    job.finished_at = Some(Utc::now());
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, new: NewJob) -> Result<JobId, QueueError> {
        let run_at = new.run_at()?;
        let mut inner = self.lock()?;

        let id = uuid::Uuid::now_v7();
        let job = Job {
            id,
            payload: new.payload,
            session_id: new.session_id,
            user_id: new.user_id,
            state: if run_at.is_some() {
                JobState::Delayed
            } else {
                JobState::Waiting
            },
            progress: 0,
            created_at: Utc::now(),
            processed_at: None,
            finished_at: None,
            failure_reason: None,
            checkpoint: None,
            result: None,
            attempt: 0,
            locked_until: None,
        };
        inner.jobs.insert(id, job);
        match run_at {
            Some(at) => inner.delayed.push((at, id)),
            None => inner.waiting.push_back(id),
        }
        Ok(id)
    }

    async fn dequeue(&self) -> Result<Option<Job>, QueueError> {
        let mut inner = self.lock()?;
        let now = Utc::now();
        inner.promote_due(now);
        inner.requeue_expired(now);

        while let Some(id) = inner.waiting.pop_front() {
            let Some(job) = inner.jobs.get_mut(&id) else {
                continue;
            };
            if job.state != JobState::Waiting {
                continue;
            }
            job.state = JobState::Active;
            job.attempt += 1;
            job.processed_at = Some(now);
            job.locked_until = Some(lease_end(now, self.lease));
            return Ok(Some(job.clone()));
        }
        Ok(None)
    }

    async fn get_by_id(&self, id: JobId) -> Result<Option<Job>, QueueError> {
        Ok(self.lock()?.jobs.get(&id).cloned())
    }

    async fn list_by_state(&self, state: JobState) -> Result<Vec<Job>, QueueError> {
        let inner = self.lock()?;
        let mut jobs: Vec<Job> = inner
            .jobs
            .values()
            .filter(|j| j.state == state)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| (j.created_at, j.id));
        Ok(jobs)
    }

    async fn renew_lease(&self, claim: Claim) -> Result<(), QueueError> {
        let mut inner = self.lock()?;
        let job = inner.claimed_mut(claim)?;
        if job.state != JobState::Active {
            return Err(invalid(job, "renew lease of"));
        }
        job.locked_until = Some(lease_end(Utc::now(), self.lease));
        Ok(())
    }

    async fn update_progress(&self, claim: Claim, progress: u8) -> Result<(), QueueError> {
        let mut inner = self.lock()?;
        let job = inner.claimed_mut(claim)?;
        if job.state != JobState::Active {
            return Err(invalid(job, "update progress of"));
        }
        job.progress = progress.min(100);
        Ok(())
    }

    async fn save_checkpoint(
        &self,
        claim: Claim,
        checkpoint: &CrawlCheckpoint,
    ) -> Result<(), QueueError> {
        let mut inner = self.lock()?;
        let job = inner.claimed_mut(claim)?;
        if !matches!(job.state, JobState::Active | JobState::Failed) {
            return Err(invalid(job, "checkpoint"));
        }
        job.checkpoint = Some(checkpoint.clone());
        Ok(())
    }

    async fn complete(
        &self,
        claim: Claim,
        result: Option<serde_json::Value>,
    ) -> Result<(), QueueError> {
        let mut inner = self.lock()?;
        let job = inner.claimed_mut(claim)?;
        if job.state != JobState::Active {
            return Err(invalid(job, "complete"));
        }
        job.state = JobState::Completed;
        job.progress = 100;
        job.result = result;
        job.checkpoint = None;
        job.locked_until = None;
        job.finished_at = Some(Utc::now());
        Ok(())
    }

    async fn fail_attempt(&self, claim: Claim, reason: &str) -> Result<(), QueueError> {
        let mut inner = self.lock()?;
        let job = inner.claimed_mut(claim)?;
        match job.state {
            JobState::Active => {
                mark_failed(job, reason);
                Ok(())
            }
            JobState::Failed => Ok(()),
            _ => Err(invalid(job, "fail")),
        }
    }

    async fn move_to_failed(&self, id: JobId, reason: &str) -> Result<(), QueueError> {
        let mut inner = self.lock()?;
        let job = inner.job_mut(id)?;
        match job.state {
            JobState::Active => {
                mark_failed(job, reason);
                Ok(())
            }
            JobState::Failed => Ok(()),
            _ => Err(invalid(job, "fail")),
        }
    }

    async fn retry(&self, id: JobId) -> Result<(), QueueError> {
        let mut inner = self.lock()?;
        let job = inner.job_mut(id)?;
        if job.state != JobState::Failed {
            return Err(invalid(job, "retry"));
        }
        job.state = JobState::Waiting;
        job.failure_reason = None;
        job.progress = 0;
        job.processed_at = None;
        job.finished_at = None;
        inner.waiting.push_back(id);
        Ok(())
    }

    async fn remove(&self, id: JobId) -> Result<(), QueueError> {
        let mut inner = self.lock()?;
        let job = inner.job_mut(id)?;
        if !job.state.is_removable() {
            return Err(invalid(job, "remove"));
        }
        inner.jobs.remove(&id);
        inner.waiting.retain(|queued| *queued != id);
        inner.delayed.retain(|(_, queued)| *queued != id);
        Ok(())
    }

    async fn counts(&self) -> Result<JobCounts, QueueError> {
        let inner = self.lock()?;
        let mut counts = JobCounts::default();
        for job in inner.jobs.values() {
            counts.add(job.state, 1);
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use specforge_core::checkpoint::PendingUrl;
    use specforge_core::job::{JobPayload, PastePayload};

    use super::*;

    fn paste(content: &str) -> NewJob {
        NewJob::new(
            JobPayload::Paste(PastePayload {
                content: content.into(),
            }),
            "s1",
        )
    }

    // -- Enqueue / dequeue ---------------------------------------------------

    #[tokio::test]
    async fn dequeue_is_fifo_and_marks_active() {
        let queue = MemoryJobQueue::new();
        let a = queue.enqueue(paste("a")).await.unwrap();
        let b = queue.enqueue(paste("b").user_id("u1")).await.unwrap();

        let first = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(first.id, a);
        assert_eq!(first.state, JobState::Active);
        assert!(first.processed_at.is_some());

        let second = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(second.id, b);
        assert_eq!(second.user_id.as_deref(), Some("u1"));
        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn closed_queue_is_unavailable() {
        let queue = MemoryJobQueue::new();
        queue.close();
        let err = queue.enqueue(paste("a")).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn delayed_job_waits_until_due() {
        let queue = MemoryJobQueue::new();
        let later = queue
            .enqueue(paste("later").delay(Duration::from_secs(3600)))
            .await
            .unwrap();
        let due = queue
            .enqueue(paste("due").delay(Duration::ZERO))
            .await
            .unwrap();

        assert_eq!(queue.counts().await.unwrap().delayed, 2);
        let claimed = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(claimed.id, due);
        assert!(queue.dequeue().await.unwrap().is_none());

        let job = queue.get_by_id(later).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Delayed);
    }

    // -- Transitions ---------------------------------------------------------

    #[tokio::test]
    async fn complete_sets_progress_and_clears_checkpoint() {
        let queue = MemoryJobQueue::new();
        let id = queue.enqueue(paste("a")).await.unwrap();
        let claim = queue.dequeue().await.unwrap().unwrap().claim();
        queue.update_progress(claim, 40).await.unwrap();
        queue
            .save_checkpoint(claim, &CrawlCheckpoint::default())
            .await
            .unwrap();
        queue
            .complete(claim, Some(serde_json::json!({"ok": true})))
            .await
            .unwrap();

        let job = queue.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.checkpoint.is_none());
        assert!(job.locked_until.is_none());
        assert!(job.finished_at.is_some());
        assert_eq!(job.result.unwrap()["ok"], true);
    }

    #[tokio::test]
    async fn progress_requires_active_job() {
        let queue = MemoryJobQueue::new();
        let id = queue.enqueue(paste("a")).await.unwrap();
        let unclaimed = Claim { job_id: id, attempt: 0 };
        let err = queue.update_progress(unclaimed, 10).await.unwrap_err();
        assert_matches!(err, QueueError::InvalidState { state: JobState::Waiting, .. });
        let unknown = Claim { job_id: uuid::Uuid::nil(), attempt: 1 };
        assert_matches!(
            queue.update_progress(unknown, 10).await,
            Err(QueueError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn failing_twice_keeps_first_reason() {
        let queue = MemoryJobQueue::new();
        let id = queue.enqueue(paste("a")).await.unwrap();
        let claim = queue.dequeue().await.unwrap().unwrap().claim();
        queue.move_to_failed(id, "Cancelled by user").await.unwrap();
        queue.fail_attempt(claim, "Crawl cancelled by user").await.unwrap();

        let job = queue.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(job.failure_reason.as_deref(), Some("Cancelled by user"));
    }

    #[tokio::test]
    async fn waiting_job_cannot_fail_or_complete() {
        let queue = MemoryJobQueue::new();
        let id = queue.enqueue(paste("a")).await.unwrap();
        assert_matches!(
            queue.move_to_failed(id, "x").await,
            Err(QueueError::InvalidState { action: "fail", .. })
        );
        assert_matches!(
            queue.complete(Claim { job_id: id, attempt: 0 }, None).await,
            Err(QueueError::InvalidState { action: "complete", .. })
        );
    }

    #[tokio::test]
    async fn retry_requeues_and_keeps_checkpoint() {
        let queue = MemoryJobQueue::new();
        let id = queue.enqueue(paste("a")).await.unwrap();
        let claim = queue.dequeue().await.unwrap().unwrap().claim();
        let checkpoint = CrawlCheckpoint {
            visited: vec!["https://a/".into()],
            pending: vec![PendingUrl::new("https://a/b", 1)],
            specs: vec![],
        };
        queue.save_checkpoint(claim, &checkpoint).await.unwrap();
        queue.fail_attempt(claim, "boom").await.unwrap();

        queue.retry(id).await.unwrap();
        let job = queue.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Waiting);
        assert!(job.failure_reason.is_none());
        assert_eq!(job.checkpoint, Some(checkpoint));

        let again = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(again.id, id);
        assert_eq!(again.attempt, 2);
    }

    #[tokio::test]
    async fn retry_requires_failed_job() {
        let queue = MemoryJobQueue::new();
        let id = queue.enqueue(paste("a")).await.unwrap();
        assert_matches!(
            queue.retry(id).await,
            Err(QueueError::InvalidState { action: "retry", .. })
        );
    }

    // -- Claims and leases ---------------------------------------------------

    #[tokio::test]
    async fn dequeue_starts_a_leased_attempt() {
        let queue = MemoryJobQueue::new().with_lease(Duration::from_secs(60));
        queue.enqueue(paste("a")).await.unwrap();

        let before = Utc::now();
        let job = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(job.attempt, 1);
        let locked_until = job.locked_until.unwrap();
        assert!(locked_until >= before + chrono::Duration::seconds(59));
    }

    #[tokio::test]
    async fn expired_lease_is_claimed_again() {
        let queue = MemoryJobQueue::new().with_lease(Duration::from_millis(20));
        let id = queue.enqueue(paste("a")).await.unwrap();
        let first = queue.dequeue().await.unwrap().unwrap();
        assert!(queue.dequeue().await.unwrap().is_none());

        tokio::time::sleep(Duration::from_millis(40)).await;
        let second = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(second.id, id);
        assert_eq!(second.attempt, first.attempt + 1);
        assert_eq!(second.state, JobState::Active);

        // The abandoned attempt can no longer touch the job.
        assert_matches!(
            queue.complete(first.claim(), None).await,
            Err(QueueError::StaleClaim { attempt: 1, current: 2, .. })
        );
        queue.complete(second.claim(), None).await.unwrap();
    }

    #[tokio::test]
    async fn renewed_lease_keeps_the_claim() {
        let queue = MemoryJobQueue::new().with_lease(Duration::from_millis(50));
        queue.enqueue(paste("a")).await.unwrap();
        let job = queue.dequeue().await.unwrap().unwrap();

        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            queue.renew_lease(job.claim()).await.unwrap();
        }
        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn renewing_a_finished_claim_fails() {
        let queue = MemoryJobQueue::new();
        let id = queue.enqueue(paste("a")).await.unwrap();
        let claim = queue.dequeue().await.unwrap().unwrap().claim();
        queue.move_to_failed(id, "Cancelled by user").await.unwrap();

        assert_matches!(
            queue.renew_lease(claim).await,
            Err(QueueError::InvalidState { state: JobState::Failed, .. })
        );
    }

    #[tokio::test]
    async fn superseded_attempt_cannot_touch_the_retried_job() {
        let queue = MemoryJobQueue::new();
        let id = queue.enqueue(paste("a")).await.unwrap();
        let stale = queue.dequeue().await.unwrap().unwrap().claim();

        // Cancelled, retried and picked up again before the first worker
        // noticed.
        queue.move_to_failed(id, "Cancelled by user").await.unwrap();
        queue.retry(id).await.unwrap();
        let stale_checkpoint = CrawlCheckpoint {
            visited: vec!["https://stale/".into()],
            ..CrawlCheckpoint::default()
        };
        assert_matches!(
            queue.save_checkpoint(stale, &stale_checkpoint).await,
            Err(QueueError::InvalidState { state: JobState::Waiting, .. })
        );
        let current = queue.dequeue().await.unwrap().unwrap().claim();
        assert_eq!(current.attempt, 2);

        assert_matches!(
            queue.save_checkpoint(stale, &stale_checkpoint).await,
            Err(QueueError::StaleClaim { .. })
        );
        assert_matches!(
            queue.fail_attempt(stale, "Crawl cancelled by user").await,
            Err(QueueError::StaleClaim { .. })
        );
        assert_matches!(
            queue.update_progress(stale, 50).await,
            Err(QueueError::StaleClaim { .. })
        );
        assert_matches!(queue.renew_lease(stale).await, Err(QueueError::StaleClaim { .. }));

        let job = queue.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Active);
        assert!(job.checkpoint.is_none());
        assert!(job.failure_reason.is_none());
    }

    #[tokio::test]
    async fn checkpoint_allowed_after_own_attempt_failed() {
        let queue = MemoryJobQueue::new();
        let id = queue.enqueue(paste("a")).await.unwrap();
        let claim = queue.dequeue().await.unwrap().unwrap().claim();
        queue.move_to_failed(id, "Cancelled by user").await.unwrap();

        queue
            .save_checkpoint(claim, &CrawlCheckpoint::default())
            .await
            .unwrap();
        assert!(queue.get_by_id(id).await.unwrap().unwrap().checkpoint.is_some());
    }

    // -- Removal and counts --------------------------------------------------

    #[tokio::test]
    async fn remove_only_before_start() {
        let queue = MemoryJobQueue::new();
        let waiting = queue.enqueue(paste("a")).await.unwrap();
        let delayed = queue
            .enqueue(paste("b").delay(Duration::from_secs(60)))
            .await
            .unwrap();
        let active = queue.enqueue(paste("c")).await.unwrap();

        queue.remove(waiting).await.unwrap();
        queue.remove(delayed).await.unwrap();
        let claimed = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(claimed.id, active);
        assert_matches!(
            queue.remove(active).await,
            Err(QueueError::InvalidState { state: JobState::Active, .. })
        );
        assert!(queue.get_by_id(waiting).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn counts_and_listing() {
        let queue = MemoryJobQueue::new();
        let a = queue.enqueue(paste("a")).await.unwrap();
        queue.enqueue(paste("b")).await.unwrap();
        let claim = queue.dequeue().await.unwrap().unwrap().claim();
        queue.fail_attempt(claim, "boom").await.unwrap();

        let counts = queue.counts().await.unwrap();
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.waiting, 1);

        let failed = queue.list_by_state(JobState::Failed).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, a);
    }
}
