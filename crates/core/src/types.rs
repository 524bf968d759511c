/// Jobs are identified by UUIDs generated at enqueue time.
pub type JobId = uuid::Uuid;

/// Stored OpenAPI documents are identified by UUIDs.
pub type SchemaId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
