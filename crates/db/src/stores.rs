//! Postgres-backed implementations of the collaborator store traits.

use async_trait::async_trait;
use specforge_core::error::CoreError;
use specforge_core::events::EventKind;
use specforge_core::store::{
    NewSchema, SchemaStore, StoredSchema, SubscriptionStore, WebhookSubscription,
};
use specforge_core::types::SchemaId;

use crate::repositories::{SchemaRepo, WebhookRepo};
use crate::DbPool;

fn storage(e: impl std::fmt::Display) -> CoreError {
    CoreError::Storage(e.to_string())
}

/// [`SchemaStore`] over the `schemas` table.
#[derive(Clone)]
pub struct PgSchemaStore {
    pool: DbPool,
}

impl PgSchemaStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SchemaStore for PgSchemaStore {
    async fn persist(&self, schema: NewSchema) -> Result<SchemaId, CoreError> {
        let row = SchemaRepo::create(&self.pool, &schema)
            .await
            .map_err(storage)?;
        Ok(row.id)
    }

    async fn find(&self, id: SchemaId) -> Result<Option<StoredSchema>, CoreError> {
        SchemaRepo::find_by_id(&self.pool, id)
            .await
            .map_err(storage)?
            .map(StoredSchema::try_from)
            .transpose()
            .map_err(storage)
    }
}

/// [`SubscriptionStore`] over the `webhooks` table.
#[derive(Clone)]
pub struct PgSubscriptionStore {
    pool: DbPool,
}

impl PgSubscriptionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    async fn active_for_event(
        &self,
        session_id: &str,
        event: EventKind,
    ) -> Result<Vec<WebhookSubscription>, CoreError> {
        let rows = WebhookRepo::list_active_for_event(&self.pool, session_id, event.as_str())
            .await
            .map_err(storage)?;
        Ok(rows.into_iter().map(WebhookSubscription::from).collect())
    }
}
