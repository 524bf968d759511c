//! Single-attempt webhook delivery.
//!
//! [`WebhookDelivery`] POSTs a pre-serialized body to one subscriber URL.
//! There is no retry: a failed attempt is reported to the caller and
//! dropped.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use specforge_core::events::EventKind;
use specforge_core::signing::{compute_webhook_hmac, signature_header};
use uuid::Uuid;

/// HTTP request timeout for a single delivery attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str = "SpecForge-Webhook/1.0";

pub const HEADER_EVENT: &str = "X-Webhook-Event";
pub const HEADER_DELIVERY: &str = "X-Webhook-Delivery";
pub const HEADER_SIGNATURE: &str = "X-Webhook-Signature";

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for webhook delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote server returned a non-2xx status code.
    #[error("Webhook returned HTTP {0}")]
    HttpStatus(u16),
}

// ---------------------------------------------------------------------------
// WebhookDelivery
// ---------------------------------------------------------------------------

/// Delivers webhook bodies to subscriber endpoints.
#[derive(Clone)]
pub struct WebhookDelivery {
    client: reqwest::Client,
}

impl WebhookDelivery {
    /// Create a new delivery service with a pre-configured HTTP client.
    pub fn new() -> Self {
        Self::with_timeout(REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self { client }
    }

    /// POST `body` to `url` once.
    ///
    /// Signs the body when `secret` is non-empty. Returns the delivery id
    /// sent in `X-Webhook-Delivery`.
    pub async fn deliver(
        &self,
        url: &str,
        event: EventKind,
        body: &[u8],
        secret: Option<&str>,
    ) -> Result<Uuid, WebhookError> {
        let delivery_id = Uuid::new_v4();

        let mut request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(HEADER_EVENT, event.as_str())
            .header(HEADER_DELIVERY, delivery_id.to_string());
        if let Some(secret) = secret.filter(|s| !s.is_empty()) {
            let signature = compute_webhook_hmac(secret, body);
            request = request.header(HEADER_SIGNATURE, signature_header(&signature));
        }

        let response = request.body(body.to_vec()).send().await?;
        if !response.status().is_success() {
            return Err(WebhookError::HttpStatus(response.status().as_u16()));
        }
        Ok(delivery_id)
    }
}

impl Default for WebhookDelivery {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
