//! Webhook HTTP delivery and the retry cron tick (spec §4.7, §5).

use std::time::Duration;

use chrono::Utc;

use super::{signature, DeliveryStatus, WebhookDelivery, WebhookEndpoint, WebhookEvent, WebhookStore};
use crate::config::GatewayConfig;
use crate::error::WebhookError;

/// Short per-attempt timeout (spec §5: "each webhook attempt short-timeout").
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Protocol version surfaced in the `X-AIP-Version` header.
const PROTOCOL_VERSION: &str = "1";

fn validate_url(url: &str) -> Result<(), WebhookError> {
    if !url.starts_with("https://") {
        return Err(WebhookError::InvalidEndpointUrl(url.to_string()));
    }
    Ok(())
}

/// Perform a single delivery attempt and update `delivery` in place with
/// the outcome. Returns `Ok(())` on a 2xx response, `Err` otherwise — the
/// caller decides whether to persist-and-move-on (inline path) or
/// schedule a retry (cron path).
pub async fn attempt_delivery(
    client: &reqwest::Client,
    endpoint: &WebhookEndpoint,
    event: &WebhookEvent,
    delivery: &mut WebhookDelivery,
) -> Result<(), WebhookError> {
    delivery.attempt_count += 1;

    if let Err(e) = validate_url(&endpoint.url) {
        delivery.status = DeliveryStatus::Failed;
        delivery.last_error = Some(e.to_string());
        return Err(e);
    }

    let raw_body = match serde_json::to_string(event) {
        Ok(body) => body,
        Err(e) => {
            let err = WebhookError::DeliveryFailed {
                status: None,
                message: e.to_string(),
            };
            delivery.status = DeliveryStatus::Failed;
            delivery.last_error = Some(err.to_string());
            return Err(err);
        }
    };
    let timestamp = Utc::now().timestamp();
    let sig = signature::sign(&endpoint.secret, timestamp, &raw_body);

    let send = client
        .post(&endpoint.url)
        .header("Content-Type", "application/json")
        .header("X-AIP-Signature", format!("sha256={}", sig))
        .header("X-AIP-Version", PROTOCOL_VERSION)
        .body(raw_body);

    let attempt = tokio::time::timeout(ATTEMPT_TIMEOUT, send.send()).await;

    let result = match attempt {
        Ok(Ok(response)) if response.status().is_success() => {
            delivery.status = DeliveryStatus::Success;
            delivery.last_error = None;
            Ok(())
        }
        Ok(Ok(response)) => {
            let status = response.status().as_u16();
            let err = WebhookError::DeliveryFailed {
                status: Some(status),
                message: format!("non-2xx response: {}", status),
            };
            delivery.last_error = Some(err.to_string());
            Err(err)
        }
        Ok(Err(e)) => {
            let err = WebhookError::DeliveryFailed {
                status: None,
                message: e.to_string(),
            };
            delivery.last_error = Some(err.to_string());
            Err(err)
        }
        Err(_) => {
            let err = WebhookError::DeliveryFailed {
                status: None,
                message: "attempt timed out".to_string(),
            };
            delivery.last_error = Some(err.to_string());
            Err(err)
        }
    };

    if let Err(ref e) = result {
        if log::log_enabled!(log::Level::Warn) {
            log::warn!("webhook delivery {} to endpoint {} failed (attempt {}): {}", delivery.delivery_id, endpoint.endpoint_id, delivery.attempt_count, e);
        }
    }
    result
}

/// The ~1/minute retry cron tick (spec §4.7 "Retry"): re-attempt every due
/// delivery, advance its schedule slot, and disable the endpoint once its
/// failure streak crosses the configured threshold. A successful delivery
/// resets `consecutive_failures` to zero.
pub async fn run_retry_tick<S: WebhookStore>(store: &S, client: &reqwest::Client, config: &GatewayConfig) {
    let now = Utc::now();
    for mut delivery in store.due_deliveries(now).await {
        let (Some(event), Some(mut endpoint)) = (
            store.event(&delivery.event_id).await,
            store.endpoint(&delivery.endpoint_id).await,
        ) else {
            continue;
        };

        let result = attempt_delivery(client, &endpoint, &event, &mut delivery).await;

        match result {
            Ok(()) => {
                endpoint.consecutive_failures = 0;
                store.update_endpoint(endpoint).await;
            }
            Err(_) => {
                if super::retry::is_exhausted(&config.webhook_retry_schedule, delivery.attempt_count) {
                    delivery.status = DeliveryStatus::GaveUp;
                    endpoint.consecutive_failures += 1;
                    if endpoint.consecutive_failures >= config.webhook_disable_threshold {
                        endpoint.is_active = false;
                        endpoint.disabled_reason =
                            Some(format!("{} consecutive delivery failures", endpoint.consecutive_failures));
                    }
                    store.update_endpoint(endpoint).await;
                } else if let Some(delay) =
                    super::retry::next_delay(&config.webhook_retry_schedule, delivery.attempt_count)
                {
                    delivery.next_attempt_at = now + chrono::Duration::from_std(delay).unwrap_or_default();
                }
            }
        }

        store.update_delivery(delivery).await;
    }
}
