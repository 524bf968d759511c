//! Outbound webhook notifications.
//!
//! - [`WebhookNotifier`] fans one event out to every matching subscription
//!   of a session, concurrently and without propagating failures.
//! - [`delivery::webhook::WebhookDelivery`] performs one signed HTTP POST.
//! - [`WebhookPayload`] is the JSON body sent to subscribers.

pub mod delivery;
pub mod notifier;
pub mod payload;

pub use delivery::webhook::{WebhookDelivery, WebhookError};
pub use notifier::{TriggerSummary, WebhookNotifier};
pub use payload::WebhookPayload;
