//! Admission control: credential extraction and the cached quota decision
//! (spec §4.1 steps 1-3).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::http::HeaderMap;
use dashmap::DashMap;

use crate::quota::{self, Decision, QuotaContext};

/// Pull the provider-shaped credential out of whichever header the client
/// used, in the order spec §4.1 lists them. `Authorization: Bearer …` is
/// unwrapped to the bare token.
pub fn extract_credential(headers: &HeaderMap) -> Option<String> {
    if let Some(v) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        return Some(v.to_string());
    }
    if let Some(v) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        if let Some(token) = v.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
    }
    if let Some(v) = headers.get("x-goog-api-key").and_then(|v| v.to_str().ok()) {
        return Some(v.to_string());
    }
    None
}

/// The operator's billing identity, carried on a separate header and
/// validated independently of the provider credential (spec §4.1).
pub fn extract_billing_key(headers: &HeaderMap) -> Option<String> {
    headers.get("x-mnemom-api-key").and_then(|v| v.to_str().ok()).map(|s| s.to_string())
}

/// The external stored-procedure call the gateway resolves a [`QuotaContext`]
/// through (spec §4.1 step 2, §1 Non-goals: the billing backend itself is
/// external). Any implementation that can fail or time out belongs behind
/// this trait; the cache in front of it is what makes that safe to call on
/// every request.
#[async_trait]
pub trait QuotaResolver: Send + Sync {
    async fn resolve(&self, agent_id: &str, billing_key: Option<&str>) -> Option<QuotaContext>;
}

/// A resolver that always yields the free-tier default, for deployments with
/// no billing backend configured at all.
pub struct FreeTierResolver;

#[async_trait]
impl QuotaResolver for FreeTierResolver {
    async fn resolve(&self, _agent_id: &str, _billing_key: Option<&str>) -> Option<QuotaContext> {
        Some(quota::free_tier_default())
    }
}

/// Lossy 5-minute cache keyed by `quota:agent:<id>` or `quota:mk:<hash>`
/// (spec §4.1 step 2). A miss or a resolver failure both fall through to
/// the free-tier default rather than failing the request.
pub struct QuotaCache {
    ttl: Duration,
    entries: DashMap<String, (QuotaContext, Instant)>,
}

impl QuotaCache {
    pub fn new(ttl: Duration) -> Self {
        QuotaCache {
            ttl,
            entries: DashMap::new(),
        }
    }

    fn cache_key(agent_id: &str, billing_key: Option<&str>) -> String {
        match billing_key {
            Some(mk) => format!("quota:mk:{}", mk),
            None => format!("quota:agent:{}", agent_id),
        }
    }

    /// Resolve the quota context for `agent_id`, serving a fresh cache entry
    /// when available and otherwise calling through to `resolver`. Never
    /// returns an error — worst case is the free-tier default.
    pub async fn resolve(
        &self,
        resolver: &dyn QuotaResolver,
        agent_id: &str,
        billing_key: Option<&str>,
    ) -> QuotaContext {
        let key = Self::cache_key(agent_id, billing_key);
        if let Some(entry) = self.entries.get(&key) {
            if entry.1.elapsed() < self.ttl {
                return entry.0.clone();
            }
        }

        let resolved = resolver.resolve(agent_id, billing_key).await.unwrap_or_else(quota::free_tier_default);
        self.entries.insert(key, (resolved.clone(), Instant::now()));
        resolved
    }

    /// Drop the cached entry for an agent so the next request re-resolves
    /// (spec §4.6: auto-containment "purge any cached quota context").
    pub fn purge(&self, agent_id: &str, billing_key: Option<&str>) {
        self.entries.remove(&Self::cache_key(agent_id, billing_key));
    }
}

/// Whether a rejection should surface as a billing refusal (402) or a
/// containment refusal (403) (spec §4.1 step 3).
pub fn reject_status_code(decision: &Decision) -> Option<u16> {
    match decision {
        Decision::Reject(reason) => Some(if reason.is_containment() { 403 } else { 402 }),
        _ => None,
    }
}
