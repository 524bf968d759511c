//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod job_repo;
pub mod schema_repo;
pub mod webhook_repo;

pub use job_repo::JobRepo;
pub use schema_repo::SchemaRepo;
pub use webhook_repo::WebhookRepo;
