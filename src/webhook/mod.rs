//! Webhook Delivery (C7, spec §4.7).

pub mod delivery;
pub mod retry;
pub mod signature;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identifiers;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEndpoint {
    pub endpoint_id: String,
    pub account_id: String,
    pub url: String,
    pub secret: String,
    /// Empty means "subscribed to every event type" (spec §4.7 step 2).
    pub event_types: Vec<String>,
    pub is_active: bool,
    pub consecutive_failures: u32,
    pub disabled_reason: Option<String>,
}

impl WebhookEndpoint {
    pub fn new(account_id: impl Into<String>, url: impl Into<String>, secret: impl Into<String>) -> Self {
        WebhookEndpoint {
            endpoint_id: identifiers::webhook_endpoint_id(),
            account_id: account_id.into(),
            url: url.into(),
            secret: secret.into(),
            event_types: Vec::new(),
            is_active: true,
            consecutive_failures: 0,
            disabled_reason: None,
        }
    }

    fn subscribes_to(&self, event_type: &str) -> bool {
        self.is_active && (self.event_types.is_empty() || self.event_types.iter().any(|t| t == event_type))
    }
}

/// The event envelope (spec §3): `{id, type, created_at, account_id, data}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub created_at: DateTime<Utc>,
    pub account_id: String,
    pub data: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Success,
    Failed,
    GaveUp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub delivery_id: String,
    pub event_id: String,
    pub endpoint_id: String,
    pub status: DeliveryStatus,
    pub attempt_count: u32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl WebhookDelivery {
    fn new(event_id: &str, endpoint_id: &str, now: DateTime<Utc>) -> Self {
        WebhookDelivery {
            delivery_id: identifiers::delivery_id(),
            event_id: event_id.to_string(),
            endpoint_id: endpoint_id.to_string(),
            status: DeliveryStatus::Pending,
            attempt_count: 0,
            next_attempt_at: now,
            last_error: None,
        }
    }

    /// Create a fresh re-delivery row for an operator-initiated redelivery
    /// (spec §4.7 "Re-delivery"): same event/endpoint, new delivery id,
    /// `pending` status, `next_attempt_at = now`. The original row is left
    /// untouched for audit.
    pub fn redeliver(original: &WebhookDelivery, now: DateTime<Utc>) -> Self {
        WebhookDelivery::new(&original.event_id, &original.endpoint_id, now)
    }
}

/// The persistence contract a real deployment must satisfy (spec §1
/// Non-goals: the store itself is external). This crate provides the
/// trait and an in-memory reference implementation.
#[async_trait]
pub trait WebhookStore: Send + Sync {
    async fn endpoints_for_account(&self, account_id: &str) -> Vec<WebhookEndpoint>;
    /// Persist the event if not already known by this id; returns whether
    /// it was newly inserted (spec §8: "invoking it repeatedly with the
    /// same `{event_id}` is a no-op at the persistence layer").
    async fn save_event(&self, event: WebhookEvent) -> bool;
    async fn save_delivery(&self, delivery: WebhookDelivery);
    async fn update_delivery(&self, delivery: WebhookDelivery);
    async fn event(&self, event_id: &str) -> Option<WebhookEvent>;
    async fn endpoint(&self, endpoint_id: &str) -> Option<WebhookEndpoint>;
    async fn update_endpoint(&self, endpoint: WebhookEndpoint);
    /// All deliveries still pending with `next_attempt_at <= now`, for the
    /// retry cron tick.
    async fn due_deliveries(&self, now: DateTime<Utc>) -> Vec<WebhookDelivery>;
}

#[derive(Default)]
pub struct InMemoryWebhookStore {
    endpoints: DashMap<String, WebhookEndpoint>,
    events: DashMap<String, WebhookEvent>,
    deliveries: DashMap<String, WebhookDelivery>,
}

impl InMemoryWebhookStore {
    pub fn new() -> Self {
        InMemoryWebhookStore::default()
    }

    pub fn register_endpoint(&self, endpoint: WebhookEndpoint) {
        self.endpoints.insert(endpoint.endpoint_id.clone(), endpoint);
    }
}

#[async_trait]
impl WebhookStore for InMemoryWebhookStore {
    async fn endpoints_for_account(&self, account_id: &str) -> Vec<WebhookEndpoint> {
        self.endpoints
            .iter()
            .filter(|e| e.account_id == account_id)
            .map(|e| e.clone())
            .collect()
    }

    async fn save_event(&self, event: WebhookEvent) -> bool {
        if self.events.contains_key(&event.id) {
            return false;
        }
        self.events.insert(event.id.clone(), event);
        true
    }

    async fn save_delivery(&self, delivery: WebhookDelivery) {
        self.deliveries.insert(delivery.delivery_id.clone(), delivery);
    }

    async fn update_delivery(&self, delivery: WebhookDelivery) {
        self.deliveries.insert(delivery.delivery_id.clone(), delivery);
    }

    async fn event(&self, event_id: &str) -> Option<WebhookEvent> {
        self.events.get(event_id).map(|e| e.clone())
    }

    async fn endpoint(&self, endpoint_id: &str) -> Option<WebhookEndpoint> {
        self.endpoints.get(endpoint_id).map(|e| e.clone())
    }

    async fn update_endpoint(&self, endpoint: WebhookEndpoint) {
        self.endpoints.insert(endpoint.endpoint_id.clone(), endpoint);
    }

    async fn due_deliveries(&self, now: DateTime<Utc>) -> Vec<WebhookDelivery> {
        self.deliveries
            .iter()
            .filter(|d| d.status == DeliveryStatus::Pending && d.next_attempt_at <= now)
            .map(|d| d.clone())
            .collect()
    }
}

/// Build the envelope, persist it, fan out one delivery per matching
/// active endpoint, and attempt one inline delivery each (spec §4.7).
/// Never returns an error to the caller — delivery failures are swallowed
/// and left for the retry cron (`delivery::run_retry_tick`).
pub async fn emit<S: WebhookStore>(
    store: &S,
    http_client: &reqwest::Client,
    account_id: &str,
    event_type: &str,
    data: Value,
) {
    let event = WebhookEvent {
        id: identifiers::event_id(),
        event_type: event_type.to_string(),
        created_at: Utc::now(),
        account_id: account_id.to_string(),
        data,
    };

    if !store.save_event(event.clone()).await {
        return;
    }

    let endpoints = store.endpoints_for_account(account_id).await;
    let now = Utc::now();
    for endpoint in endpoints.iter().filter(|e| e.subscribes_to(event_type)) {
        let mut delivery = WebhookDelivery::new(&event.id, &endpoint.endpoint_id, now);
        store.save_delivery(delivery.clone()).await;

        // Inline attempt (spec §4.7 step 3); any failure is swallowed here
        // and left for the retry cron (`delivery::run_retry_tick`).
        let _ = delivery::attempt_delivery(http_client, endpoint, &event, &mut delivery).await;
        store.update_delivery(delivery).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_is_idempotent_per_event_id_at_the_store_layer() {
        let store = InMemoryWebhookStore::new();
        let event = WebhookEvent {
            id: "evt-fixed".to_string(),
            event_type: "checkpoint.created".to_string(),
            created_at: Utc::now(),
            account_id: "acct-1".to_string(),
            data: serde_json::json!({}),
        };
        assert!(store.save_event(event.clone()).await);
        assert!(!store.save_event(event).await);
    }

    #[tokio::test]
    async fn endpoint_with_empty_event_types_subscribes_to_everything() {
        let endpoint = WebhookEndpoint::new("acct-1", "https://example.com/hook", "whsec_x");
        assert!(endpoint.subscribes_to("checkpoint.created"));
        assert!(endpoint.subscribes_to("anything.else"));
    }

    #[tokio::test]
    async fn endpoint_with_explicit_event_types_filters() {
        let mut endpoint = WebhookEndpoint::new("acct-1", "https://example.com/hook", "whsec_x");
        endpoint.event_types = vec!["checkpoint.created".to_string()];
        assert!(endpoint.subscribes_to("checkpoint.created"));
        assert!(!endpoint.subscribes_to("endpoint.disabled"));
    }

    #[tokio::test]
    async fn inactive_endpoint_never_subscribes() {
        let mut endpoint = WebhookEndpoint::new("acct-1", "https://example.com/hook", "whsec_x");
        endpoint.is_active = false;
        assert!(!endpoint.subscribes_to("checkpoint.created"));
    }
}
