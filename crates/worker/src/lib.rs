//! SpecForge background worker.
//!
//! Pulls jobs from a [`JobQueue`](specforge_queue::JobQueue), routes each to
//! the handler for its type, records the outcome and fires the matching
//! webhook. The binary in `main.rs` wires this to Postgres and an HTTP code
//! generator.

pub mod archive;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod generator;
pub mod handlers;

pub use config::{ConfigError, WorkerConfig};
pub use context::JobContext;
pub use dispatcher::Worker;
pub use error::JobError;
