//! Webhook request body.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use specforge_core::events::EventKind;

/// `{"event": <kind>, "timestamp": <ISO8601>, "data": {...}}`
#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub event: EventKind,
    pub timestamp: String,
    pub data: serde_json::Value,
}

impl WebhookPayload {
    /// A payload stamped with the current time.
    pub fn new(event: EventKind, data: serde_json::Value) -> Self {
        Self {
            event,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            data,
        }
    }

    /// The exact bytes sent on the wire. Signatures are computed over these.
    pub fn to_body(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
