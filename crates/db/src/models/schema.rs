//! Row model for the `schemas` table.

use specforge_core::store::{SchemaKind, StoredSchema};
use specforge_core::types::{SchemaId, Timestamp};
use sqlx::FromRow;

use super::RowDecodeError;

/// A row from the `schemas` table.
#[derive(Debug, Clone, FromRow)]
pub struct SchemaRow {
    pub id: SchemaId,
    pub session_id: String,
    pub user_id: Option<String>,
    pub kind: String,
    pub content: String,
    pub url: Option<String>,
    pub created_at: Timestamp,
}

impl TryFrom<SchemaRow> for StoredSchema {
    type Error = RowDecodeError;

    fn try_from(row: SchemaRow) -> Result<Self, Self::Error> {
        let kind = SchemaKind::parse(&row.kind).ok_or_else(|| RowDecodeError {
            table: "schemas",
            id: row.id,
            reason: format!("unknown kind {}", row.kind),
        })?;
        Ok(StoredSchema {
            id: row.id,
            session_id: row.session_id,
            user_id: row.user_id,
            kind,
            content: row.content,
            url: row.url,
            created_at: row.created_at,
        })
    }
}
