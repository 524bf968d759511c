//! Shared domain types for the SpecForge job pipeline.
//!
//! This crate has no internal dependencies so it can be used by the queue,
//! crawler, notifier, persistence and worker crates alike.

pub mod checkpoint;
pub mod error;
pub mod events;
pub mod job;
pub mod memory;
pub mod openapi;
pub mod signing;
pub mod store;
pub mod types;
