//! The wire-format of the signature header end to end, plus `emit`'s
//! store-level fan-out and idempotency behaviour — integration coverage
//! that sits above `signature.rs`'s and `mod.rs`'s in-module unit tests,
//! which only exercise sign/verify and `subscribes_to` in isolation.

use aip_gateway::webhook::signature;
use aip_gateway::webhook::{emit, InMemoryWebhookStore, WebhookEndpoint, WebhookStore};

#[test]
fn the_delivery_header_value_is_literally_sha256_equals_v1_equals_hex() {
    let sig = signature::sign("whsec_test", 1_700_000_000, r#"{"id":"evt-1"}"#);
    let header_value = format!("sha256={}", sig);

    assert!(header_value.starts_with("sha256=v1="));
    let hex_part = header_value.strip_prefix("sha256=v1=").unwrap();
    assert_eq!(hex_part.len(), 64);
    assert!(hex_part.chars().all(|c| c.is_ascii_hexdigit()));
}

#[tokio::test]
async fn emit_fans_out_to_every_subscribed_endpoint_and_skips_the_rest() {
    let store = InMemoryWebhookStore::new();
    let client = reqwest::Client::new();

    let mut matching_a = WebhookEndpoint::new("acct-1", "https://127.0.0.1:1/hook", "whsec_a");
    matching_a.event_types = vec!["checkpoint.created".to_string()];
    let mut matching_b = WebhookEndpoint::new("acct-1", "https://127.0.0.1:1/hook", "whsec_b");
    matching_b.event_types = Vec::new(); // subscribes to everything
    let mut non_matching = WebhookEndpoint::new("acct-1", "https://127.0.0.1:1/hook", "whsec_c");
    non_matching.event_types = vec!["endpoint.disabled".to_string()];
    let mut other_account = WebhookEndpoint::new("acct-2", "https://127.0.0.1:1/hook", "whsec_d");
    other_account.event_types = Vec::new();

    store.register_endpoint(matching_a.clone());
    store.register_endpoint(matching_b.clone());
    store.register_endpoint(non_matching.clone());
    store.register_endpoint(other_account.clone());

    emit(&store, &client, "acct-1", "checkpoint.created", serde_json::json!({"verdict": "clear"})).await;

    // Connection to 127.0.0.1:1 is refused immediately, so delivery fails,
    // but the store must still reflect one delivery row per matching
    // endpoint for this account, with the attempt recorded.
    let a_deliveries: Vec<_> = store
        .due_deliveries(chrono::Utc::now() + chrono::Duration::seconds(1))
        .await
        .into_iter()
        .filter(|d| d.endpoint_id == matching_a.endpoint_id)
        .collect();
    let b_deliveries: Vec<_> = store
        .due_deliveries(chrono::Utc::now() + chrono::Duration::seconds(1))
        .await
        .into_iter()
        .filter(|d| d.endpoint_id == matching_b.endpoint_id)
        .collect();
    let non_matching_deliveries: Vec<_> = store
        .due_deliveries(chrono::Utc::now() + chrono::Duration::seconds(1))
        .await
        .into_iter()
        .filter(|d| d.endpoint_id == non_matching.endpoint_id)
        .collect();
    let other_account_deliveries: Vec<_> = store
        .due_deliveries(chrono::Utc::now() + chrono::Duration::seconds(1))
        .await
        .into_iter()
        .filter(|d| d.endpoint_id == other_account.endpoint_id)
        .collect();

    assert_eq!(a_deliveries.len(), 1);
    assert_eq!(a_deliveries[0].attempt_count, 1);
    assert_eq!(b_deliveries.len(), 1);
    assert!(non_matching_deliveries.is_empty());
    assert!(other_account_deliveries.is_empty());
}

#[tokio::test]
async fn emit_is_a_no_op_the_second_time_for_the_same_logical_event() {
    // emit() always mints a fresh event id internally, so idempotency here
    // is demonstrated at the store layer directly: re-saving an event with
    // an id that already exists must not re-trigger delivery creation.
    let store = InMemoryWebhookStore::new();
    let endpoint = WebhookEndpoint::new("acct-1", "https://127.0.0.1:1/hook", "whsec_a");
    store.register_endpoint(endpoint.clone());

    let event = aip_gateway::webhook::WebhookEvent {
        id: "evt-fixed-1".to_string(),
        event_type: "checkpoint.created".to_string(),
        created_at: chrono::Utc::now(),
        account_id: "acct-1".to_string(),
        data: serde_json::json!({}),
    };
    assert!(store.save_event(event.clone()).await);
    assert!(!store.save_event(event).await);
}
