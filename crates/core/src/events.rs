//! Webhook event kinds.
//!
//! The dotted names are part of the webhook wire format (`X-Webhook-Event`
//! header and the `event` body field) and of the stored subscription rows.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A lifecycle or content event a webhook subscriber can listen for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "job.completed")]
    JobCompleted,
    #[serde(rename = "job.failed")]
    JobFailed,
    #[serde(rename = "schema.created")]
    SchemaCreated,
    #[serde(rename = "schema.updated")]
    SchemaUpdated,
}

impl EventKind {
    /// Every event kind, in declaration order.
    pub const ALL: [EventKind; 4] = [
        EventKind::JobCompleted,
        EventKind::JobFailed,
        EventKind::SchemaCreated,
        EventKind::SchemaUpdated,
    ];

    /// The dotted wire name, e.g. `"job.completed"`.
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::JobCompleted => "job.completed",
            EventKind::JobFailed => "job.failed",
            EventKind::SchemaCreated => "schema.created",
            EventKind::SchemaUpdated => "schema.updated",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown webhook event kind: {0}")]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEventKind(s.to_string()))
    }
}
