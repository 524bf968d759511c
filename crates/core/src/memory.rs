//! In-process implementations of the collaborator stores.
//!
//! Used by single-process deployments and by tests across the workspace.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::CoreError;
use crate::events::EventKind;
use crate::store::{
    NewSchema, SchemaKind, SchemaStore, StoredSchema, SubscriptionStore, WebhookSubscription,
};
use crate::types::SchemaId;

fn poisoned() -> CoreError {
    CoreError::Internal("in-memory store lock poisoned".into())
}

// ---------------------------------------------------------------------------
// MemorySchemaStore
// ---------------------------------------------------------------------------

/// Schema storage backed by a `HashMap`.
#[derive(Default)]
pub struct MemorySchemaStore {
    schemas: Mutex<HashMap<SchemaId, StoredSchema>>,
}

impl MemorySchemaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw content without validation, returning the new id.
    pub fn insert_raw(&self, session_id: &str, kind: SchemaKind, content: &str) -> SchemaId {
        let id = uuid::Uuid::now_v7();
        let schema = StoredSchema {
            id,
            session_id: session_id.to_string(),
            user_id: None,
            kind,
            content: content.to_string(),
            url: None,
            created_at: Utc::now(),
        };
        self.schemas
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, schema);
        id
    }

    /// All stored schemas, oldest first.
    pub fn all(&self) -> Vec<StoredSchema> {
        let mut all: Vec<_> = self
            .schemas
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        all.sort_by_key(|s| (s.created_at, s.id));
        all
    }
}

#[async_trait]
impl SchemaStore for MemorySchemaStore {
    async fn persist(&self, schema: NewSchema) -> Result<SchemaId, CoreError> {
        let id = uuid::Uuid::now_v7();
        let stored = StoredSchema {
            id,
            session_id: schema.session_id,
            user_id: schema.user_id,
            kind: schema.kind,
            content: schema.content,
            url: schema.url,
            created_at: Utc::now(),
        };
        self.schemas
            .lock()
            .map_err(|_| poisoned())?
            .insert(id, stored);
        Ok(id)
    }

    async fn find(&self, id: SchemaId) -> Result<Option<StoredSchema>, CoreError> {
        Ok(self.schemas.lock().map_err(|_| poisoned())?.get(&id).cloned())
    }
}

// ---------------------------------------------------------------------------
// MemorySubscriptionStore
// ---------------------------------------------------------------------------

/// Webhook subscriptions held in a `Vec`.
#[derive(Default)]
pub struct MemorySubscriptionStore {
    subscriptions: Mutex<Vec<WebhookSubscription>>,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, subscription: WebhookSubscription) {
        self.subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(subscription);
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn active_for_event(
        &self,
        session_id: &str,
        event: EventKind,
    ) -> Result<Vec<WebhookSubscription>, CoreError> {
        Ok(self
            .subscriptions
            .lock()
            .map_err(|_| poisoned())?
            .iter()
            .filter(|s| s.session_id == session_id && s.wants(event))
            .cloned()
            .collect())
    }
}
