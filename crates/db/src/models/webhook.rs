//! Row model for the `webhooks` table.

use specforge_core::events::EventKind;
use specforge_core::store::WebhookSubscription;
use specforge_core::types::Timestamp;
use sqlx::FromRow;

/// A row from the `webhooks` table.
#[derive(Debug, Clone, FromRow)]
pub struct WebhookRow {
    pub id: uuid::Uuid,
    pub session_id: String,
    pub url: String,
    pub secret: Option<String>,
    pub active: bool,
    pub events: Vec<String>,
    pub created_at: Timestamp,
}

/// Insert DTO for a webhook subscription.
#[derive(Debug, Clone)]
pub struct CreateWebhook {
    pub session_id: String,
    pub url: String,
    pub secret: Option<String>,
    pub events: Vec<EventKind>,
}

impl From<WebhookRow> for WebhookSubscription {
    /// Unknown event names in the row are dropped with a warning.
    fn from(row: WebhookRow) -> Self {
        let events = row
            .events
            .iter()
            .filter_map(|name| match name.parse::<EventKind>() {
                Ok(kind) => Some(kind),
                Err(e) => {
                    tracing::warn!(webhook_id = %row.id, error = %e, "Ignoring stored event name");
                    None
                }
            })
            .collect();
        WebhookSubscription {
            id: row.id,
            session_id: row.session_id,
            url: row.url,
            secret: row.secret,
            active: row.active,
            events,
        }
    }
}
