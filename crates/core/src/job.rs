//! Job entity, states and per-type payloads.
//!
//! A [`Job`] is created on submission and mutated only by the worker that
//! owns its active attempt, identified by a [`Claim`]. `completed` and
//! `failed` are terminal; a failed job returns to `waiting` only through an
//! explicit retry.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::checkpoint::CrawlCheckpoint;
use crate::types::{JobId, SchemaId, Timestamp};

/// State ID type matching the SMALLINT `state_id` column.
pub type StateId = i16;

// ---------------------------------------------------------------------------
// JobState
// ---------------------------------------------------------------------------

/// Lifecycle state of a job.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting = 1,
    Active = 2,
    Completed = 3,
    Failed = 4,
    Delayed = 5,
}

impl JobState {
    pub const ALL: [JobState; 5] = [
        JobState::Waiting,
        JobState::Active,
        JobState::Completed,
        JobState::Failed,
        JobState::Delayed,
    ];

    /// Return the database state ID.
    pub fn id(self) -> StateId {
        self as StateId
    }

    /// Look up a state by its database ID.
    pub fn from_id(id: StateId) -> Option<Self> {
        JobState::ALL.into_iter().find(|s| s.id() == id)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Delayed => "delayed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Only jobs that have not started may be removed from the queue.
    pub fn is_removable(self) -> bool {
        matches!(self, JobState::Waiting | JobState::Delayed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// JobType and payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    Upload,
    Crawl,
    Paste,
    BatchGenerate,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::Upload => "UPLOAD",
            JobType::Crawl => "CRAWL",
            JobType::Paste => "PASTE",
            JobType::BatchGenerate => "BATCH_GENERATE",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An uploaded file waiting to be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPayload {
    pub file_path: String,
    pub original_name: String,
}

/// Raw JSON or YAML text pasted by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PastePayload {
    pub content: String,
}

/// Per-crawl transport options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlRequestOptions {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub auth_headers: BTreeMap<String, String>,
    /// Delay in milliseconds before each request.
    #[serde(default, rename = "rateLimit", skip_serializing_if = "Option::is_none")]
    pub rate_limit_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_redirects: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlPayload {
    pub url: String,
    pub depth: u32,
    #[serde(default)]
    pub options: CrawlRequestOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchGeneratePayload {
    pub schema_ids: Vec<SchemaId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,
}

/// Type-discriminated job payload.
///
/// Serialized as `{"type": "CRAWL", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobPayload {
    Upload(UploadPayload),
    Crawl(CrawlPayload),
    Paste(PastePayload),
    BatchGenerate(BatchGeneratePayload),
}

impl JobPayload {
    pub fn job_type(&self) -> JobType {
        match self {
            JobPayload::Upload(_) => JobType::Upload,
            JobPayload::Crawl(_) => JobType::Crawl,
            JobPayload::Paste(_) => JobType::Paste,
            JobPayload::BatchGenerate(_) => JobType::BatchGenerate,
        }
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One unit of asynchronous work tracked through the state machine.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub payload: JobPayload,
    pub session_id: String,
    pub user_id: Option<String>,
    pub state: JobState,
    /// Percentage in `0..=100`.
    pub progress: u8,
    pub created_at: Timestamp,
    pub processed_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub failure_reason: Option<String>,
    pub checkpoint: Option<CrawlCheckpoint>,
    /// Optional result recorded on completion (e.g. a batch download descriptor).
    pub result: Option<serde_json::Value>,
    /// Number of times the job has been claimed. `0` until first dequeued.
    pub attempt: u32,
    /// End of the current claim's lease while `active`. A job whose lease
    /// has passed may be claimed again by another worker.
    pub locked_until: Option<Timestamp>,
}

impl Job {
    pub fn job_type(&self) -> JobType {
        self.payload.job_type()
    }

    /// Identity of the attempt this snapshot was claimed as.
    pub fn claim(&self) -> Claim {
        Claim {
            job_id: self.id,
            attempt: self.attempt,
        }
    }

    /// The status query surface exposed to pollers.
    pub fn status(&self) -> JobStatusView {
        JobStatusView {
            id: self.id,
            job_type: self.job_type(),
            state: self.state,
            progress: self.progress,
            failed_reason: self.failure_reason.clone(),
            created_at: self.created_at,
            processed_at: self.processed_at,
            finished_at: self.finished_at,
        }
    }
}

/// One claimed run of a job.
///
/// Transitions made on behalf of a claim are rejected once the job has been
/// claimed again, so a superseded worker can never touch a newer attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Claim {
    pub job_id: JobId,
    pub attempt: u32,
}

/// Job status as returned to status pollers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub id: JobId,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub state: JobState,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,
    pub created_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<Timestamp>,
}

/// Number of jobs per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobCounts {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub delayed: u64,
}

impl JobCounts {
    pub fn add(&mut self, state: JobState, n: u64) {
        match state {
            JobState::Waiting => self.waiting += n,
            JobState::Active => self.active += n,
            JobState::Completed => self.completed += n,
            JobState::Failed => self.failed += n,
            JobState::Delayed => self.delayed += n,
        }
    }
}
