//! Collaborator interfaces consumed by the job pipeline.
//!
//! The pipeline calls these but does not own them: schema storage, webhook
//! subscription management and code generation live behind these traits.

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::events::EventKind;
use crate::types::{SchemaId, Timestamp};

// ---------------------------------------------------------------------------
// Schemas
// ---------------------------------------------------------------------------

/// How a stored schema entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchemaKind {
    Upload,
    Crawl,
    Paste,
}

impl SchemaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SchemaKind::Upload => "UPLOAD",
            SchemaKind::Crawl => "CRAWL",
            SchemaKind::Paste => "PASTE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UPLOAD" => Some(SchemaKind::Upload),
            "CRAWL" => Some(SchemaKind::Crawl),
            "PASTE" => Some(SchemaKind::Paste),
            _ => None,
        }
    }
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated document about to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSchema {
    pub session_id: String,
    pub user_id: Option<String>,
    pub kind: SchemaKind,
    /// Normalized JSON text of the document.
    pub content: String,
    /// Source URL for crawled documents.
    pub url: Option<String>,
}

/// A stored document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSchema {
    pub id: SchemaId,
    pub session_id: String,
    pub user_id: Option<String>,
    pub kind: SchemaKind,
    pub content: String,
    pub url: Option<String>,
    pub created_at: Timestamp,
}

/// Relational storage for OpenAPI documents.
#[async_trait]
pub trait SchemaStore: Send + Sync {
    /// Store a document and return its new id.
    async fn persist(&self, schema: NewSchema) -> Result<SchemaId, CoreError>;

    /// Look up a stored document.
    async fn find(&self, id: SchemaId) -> Result<Option<StoredSchema>, CoreError>;
}

// ---------------------------------------------------------------------------
// Webhook subscriptions
// ---------------------------------------------------------------------------

/// A session-scoped webhook subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookSubscription {
    pub id: uuid::Uuid,
    pub session_id: String,
    pub url: String,
    /// Signing secret; deliveries are unsigned when absent or empty.
    pub secret: Option<String>,
    pub active: bool,
    pub events: BTreeSet<EventKind>,
}

impl WebhookSubscription {
    /// Whether this subscription should receive `event`.
    pub fn wants(&self, event: EventKind) -> bool {
        self.active && self.events.contains(&event)
    }

    /// The secret to sign with, ignoring empty strings.
    pub fn signing_secret(&self) -> Option<&str> {
        self.secret.as_deref().filter(|s| !s.is_empty())
    }
}

/// Read-only view of webhook subscriptions.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Active subscriptions for `session_id` whose event set contains `event`.
    async fn active_for_event(
        &self,
        session_id: &str,
        event: EventKind,
    ) -> Result<Vec<WebhookSubscription>, CoreError>;
}

// ---------------------------------------------------------------------------
// Code generation
// ---------------------------------------------------------------------------

/// OpenAPI to code generator, treated as a black box.
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    /// Generate code for `spec` and return a zip archive.
    async fn generate(
        &self,
        spec: &serde_json::Value,
        language: &str,
        options: &serde_json::Value,
    ) -> Result<Vec<u8>, CoreError>;
}
