//! Durable job queue for the SpecForge pipeline.
//!
//! [`JobQueue`] is the contract the worker consumes. Two implementations
//! are provided: [`MemoryJobQueue`] for single-process use and tests, and
//! [`PgJobQueue`] backed by the `jobs` table.

pub mod control;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod queue;

pub use control::{cancel_job, job_status, CancelOutcome, CANCELLED_BY_USER};
pub use error::QueueError;
pub use memory::MemoryJobQueue;
pub use postgres::PgJobQueue;
pub use queue::{JobQueue, NewJob, DEFAULT_LEASE};
