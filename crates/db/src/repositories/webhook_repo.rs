//! Repository for the `webhooks` table.

use sqlx::PgPool;

use crate::models::webhook::{CreateWebhook, WebhookRow};

const COLUMNS: &str = "id, session_id, url, secret, active, events, created_at";

pub struct WebhookRepo;

impl WebhookRepo {
    pub async fn create(pool: &PgPool, input: &CreateWebhook) -> Result<WebhookRow, sqlx::Error> {
        let events: Vec<String> = input.events.iter().map(|e| e.as_str().to_string()).collect();
        let query = format!(
            "INSERT INTO webhooks (id, session_id, url, secret, events) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WebhookRow>(&query)
            .bind(uuid::Uuid::now_v7())
            .bind(&input.session_id)
            .bind(&input.url)
            .bind(&input.secret)
            .bind(&events)
            .fetch_one(pool)
            .await
    }

    /// Active subscriptions for a session that list `event`.
    pub async fn list_active_for_event(
        pool: &PgPool,
        session_id: &str,
        event: &str,
    ) -> Result<Vec<WebhookRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM webhooks \
             WHERE session_id = $1 AND active AND $2 = ANY(events) \
             ORDER BY created_at ASC"
        );
        sqlx::query_as::<_, WebhookRow>(&query)
            .bind(session_id)
            .bind(event)
            .fetch_all(pool)
            .await
    }

    pub async fn set_active(pool: &PgPool, id: uuid::Uuid, active: bool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE webhooks SET active = $2 WHERE id = $1")
            .bind(id)
            .bind(active)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
