//! Webhook fan-out.
//!
//! [`WebhookNotifier::trigger`] never fails. Subscription lookup errors and
//! per-subscriber delivery errors are logged and counted, then dropped: by
//! the time a notification runs, the job it describes has already reached
//! its final state.

use std::sync::Arc;

use futures::future::join_all;
use serde_json::{json, Value};
use specforge_core::events::EventKind;
use specforge_core::job::JobType;
use specforge_core::store::{SubscriptionStore, WebhookSubscription};
use specforge_core::types::{JobId, SchemaId};

use crate::delivery::webhook::WebhookDelivery;
use crate::payload::WebhookPayload;

/// Outcome counts for one trigger, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerSummary {
    pub matched: usize,
    pub delivered: usize,
    pub failed: usize,
}

pub struct WebhookNotifier {
    subscriptions: Arc<dyn SubscriptionStore>,
    delivery: WebhookDelivery,
}

impl WebhookNotifier {
    pub fn new(subscriptions: Arc<dyn SubscriptionStore>) -> Self {
        Self::with_delivery(subscriptions, WebhookDelivery::new())
    }

    pub fn with_delivery(subscriptions: Arc<dyn SubscriptionStore>, delivery: WebhookDelivery) -> Self {
        Self {
            subscriptions,
            delivery,
        }
    }

    /// Deliver `event` to every active subscription of `session_id` that
    /// listens for it. Deliveries run concurrently and all are awaited.
    pub async fn trigger(&self, session_id: &str, event: EventKind, data: Value) -> TriggerSummary {
        let subscriptions = match self.subscriptions.active_for_event(session_id, event).await {
            Ok(subs) => subs,
            Err(e) => {
                tracing::error!(session_id, event = %event, error = %e, "Webhook subscription lookup failed");
                return TriggerSummary::default();
            }
        };
        let targets: Vec<WebhookSubscription> =
            subscriptions.into_iter().filter(|s| s.wants(event)).collect();
        if targets.is_empty() {
            return TriggerSummary::default();
        }

        let payload = WebhookPayload::new(event, data);
        let body = match payload.to_body() {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(event = %event, error = %e, "Failed to serialize webhook payload");
                return TriggerSummary {
                    matched: targets.len(),
                    delivered: 0,
                    failed: targets.len(),
                };
            }
        };

        let outcomes = join_all(targets.iter().map(|sub| {
            self.delivery
                .deliver(&sub.url, event, &body, sub.signing_secret())
        }))
        .await;

        let mut summary = TriggerSummary {
            matched: targets.len(),
            ..Default::default()
        };
        for (sub, outcome) in targets.iter().zip(outcomes) {
            match outcome {
                Ok(delivery_id) => {
                    summary.delivered += 1;
                    tracing::info!(
                        webhook_id = %sub.id,
                        event = %event,
                        delivery_id = %delivery_id,
                        "Webhook delivered",
                    );
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(
                        webhook_id = %sub.id,
                        url = %sub.url,
                        event = %event,
                        error = %e,
                        "Webhook delivery failed",
                    );
                }
            }
        }
        summary
    }

    // -----------------------------------------------------------------------
    // Event helpers
    // -----------------------------------------------------------------------

    pub async fn on_job_completed(
        &self,
        session_id: &str,
        job_id: JobId,
        job_type: JobType,
        result: Option<&Value>,
    ) -> TriggerSummary {
        let mut data = json!({"jobId": job_id, "type": job_type});
        if let Some(result) = result {
            data["result"] = result.clone();
        }
        self.trigger(session_id, EventKind::JobCompleted, data).await
    }

    pub async fn on_job_failed(
        &self,
        session_id: &str,
        job_id: JobId,
        job_type: JobType,
        error: &str,
    ) -> TriggerSummary {
        let data = json!({"jobId": job_id, "type": job_type, "error": error});
        self.trigger(session_id, EventKind::JobFailed, data).await
    }

    pub async fn on_schema_created(
        &self,
        session_id: &str,
        schema_id: SchemaId,
        title: Option<&str>,
    ) -> TriggerSummary {
        let mut data = json!({"schemaId": schema_id});
        if let Some(title) = title {
            data["title"] = Value::from(title);
        }
        self.trigger(session_id, EventKind::SchemaCreated, data).await
    }

    pub async fn on_schema_updated(
        &self,
        session_id: &str,
        schema_id: SchemaId,
        version: u32,
    ) -> TriggerSummary {
        let data = json!({"schemaId": schema_id, "version": version});
        self.trigger(session_id, EventKind::SchemaUpdated, data).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use async_trait::async_trait;
    use specforge_core::error::CoreError;
    use specforge_core::memory::MemorySubscriptionStore;

    use super::*;

    struct BrokenStore;

    #[async_trait]
    impl SubscriptionStore for BrokenStore {
        async fn active_for_event(
            &self,
            _session_id: &str,
            _event: EventKind,
        ) -> Result<Vec<WebhookSubscription>, CoreError> {
            Err(CoreError::Storage("connection reset".into()))
        }
    }

    /// Returns every subscription regardless of filters.
    struct UnfilteredStore(Vec<WebhookSubscription>);

    #[async_trait]
    impl SubscriptionStore for UnfilteredStore {
        async fn active_for_event(
            &self,
            _session_id: &str,
            _event: EventKind,
        ) -> Result<Vec<WebhookSubscription>, CoreError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn lookup_failure_is_swallowed() {
        let notifier = WebhookNotifier::new(Arc::new(BrokenStore));
        let summary = notifier
            .trigger("s1", EventKind::JobCompleted, json!({}))
            .await;
        assert_eq!(summary, TriggerSummary::default());
    }

    #[tokio::test]
    async fn no_subscriptions_means_no_deliveries() {
        let notifier = WebhookNotifier::new(Arc::new(MemorySubscriptionStore::new()));
        let summary = notifier
            .on_job_failed("s1", uuid::Uuid::nil(), JobType::Paste, "boom")
            .await;
        assert_eq!(summary.matched, 0);
    }

    #[tokio::test]
    async fn inactive_or_unsubscribed_rows_are_filtered_again() {
        let sub = |active: bool, event: EventKind| WebhookSubscription {
            id: uuid::Uuid::new_v4(),
            session_id: "s1".into(),
            url: "http://127.0.0.1:9/hook".into(),
            secret: None,
            active,
            events: BTreeSet::from([event]),
        };
        let store = UnfilteredStore(vec![
            sub(false, EventKind::SchemaCreated),
            sub(true, EventKind::SchemaUpdated),
        ]);
        let notifier = WebhookNotifier::new(Arc::new(store));

        let summary = notifier
            .on_schema_created("s1", uuid::Uuid::nil(), Some("Pets"))
            .await;
        assert_eq!(summary, TriggerSummary::default());
    }
}
