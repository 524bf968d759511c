//! Row structs and insert DTOs.
//!
//! Each submodule contains a `FromRow` struct matching the table row and the
//! conversion into the matching `specforge-core` domain type.

pub mod job;
pub mod schema;
pub mod webhook;

/// A stored row could not be mapped onto its domain type.
#[derive(Debug, thiserror::Error)]
#[error("Corrupt {table} row {id}: {reason}")]
pub struct RowDecodeError {
    pub table: &'static str,
    pub id: uuid::Uuid,
    pub reason: String,
}
