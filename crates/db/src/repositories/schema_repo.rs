//! Repository for the `schemas` table.

use specforge_core::store::NewSchema;
use specforge_core::types::SchemaId;
use sqlx::PgPool;

use crate::models::schema::SchemaRow;

const COLUMNS: &str = "id, session_id, user_id, kind, content, url, created_at";

pub struct SchemaRepo;

impl SchemaRepo {
    pub async fn create(pool: &PgPool, input: &NewSchema) -> Result<SchemaRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO schemas (id, session_id, user_id, kind, content, url) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SchemaRow>(&query)
            .bind(uuid::Uuid::now_v7())
            .bind(&input.session_id)
            .bind(&input.user_id)
            .bind(input.kind.as_str())
            .bind(&input.content)
            .bind(&input.url)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: SchemaId) -> Result<Option<SchemaRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM schemas WHERE id = $1");
        sqlx::query_as::<_, SchemaRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
