//! Response header construction (spec §4.1 response-path, §7).

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::integrity::verdict::Action;
use crate::integrity::IntegritySignal;
use crate::quota::{self, Decision, QuotaContext};

fn insert(headers: &mut HeaderMap, name: &'static str, value: impl AsRef<str>) {
    if let Ok(v) = HeaderValue::from_str(value.as_ref()) {
        headers.insert(HeaderName::from_static(name), v);
    }
}

fn action_as_str(action: Action) -> &'static str {
    match action {
        Action::Continue => "continue",
        Action::LogAndContinue => "log_and_continue",
        Action::WarnUser => "warn_user",
        Action::DenyAndEscalate => "deny_and_escalate",
    }
}

/// `x-smoltbot-agent` / `x-smoltbot-session`, added to every proxied
/// response regardless of AIP outcome.
pub fn identity_headers(agent_id: &str, session_id: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    insert(&mut headers, "x-smoltbot-agent", agent_id);
    insert(&mut headers, "x-smoltbot-session", session_id);
    headers
}

pub fn verdict_disabled() -> HeaderMap {
    let mut headers = HeaderMap::new();
    insert(&mut headers, "x-aip-verdict", "disabled");
    headers
}

pub fn verdict_skipped() -> HeaderMap {
    let mut headers = HeaderMap::new();
    insert(&mut headers, "x-aip-verdict", "skipped");
    headers
}

pub fn verdict_pending() -> HeaderMap {
    let mut headers = HeaderMap::new();
    insert(&mut headers, "x-aip-verdict", "pending");
    headers
}

pub fn verdict_error() -> HeaderMap {
    let mut headers = HeaderMap::new();
    insert(&mut headers, "x-aip-verdict", "error");
    headers
}

/// The full set of `X-AIP-*` headers for a completed, inline-analysed
/// interaction (spec §4.1 response-path, buffered branch).
pub struct CertificateInfo<'a> {
    pub certificate_id: &'a str,
    pub chain_hash: &'a str,
}

pub fn integrity_headers(
    signal: &IntegritySignal,
    synthetic: bool,
    source_hybrid: bool,
    certificate: Option<CertificateInfo<'_>>,
    nudge_count: usize,
) -> HeaderMap {
    let mut headers = HeaderMap::new();
    insert(&mut headers, "x-aip-verdict", signal.checkpoint.verdict.as_str());
    insert(&mut headers, "x-aip-checkpoint-id", &signal.checkpoint.checkpoint_id);
    insert(&mut headers, "x-aip-action", action_as_str(signal.recommended_action));
    insert(&mut headers, "x-aip-proceed", if signal.proceed { "true" } else { "false" });
    insert(&mut headers, "x-aip-nudge-count", nudge_count.to_string());

    if synthetic {
        insert(&mut headers, "x-aip-synthetic", "true");
    }
    if source_hybrid {
        insert(&mut headers, "x-aip-source", "hybrid");
    }
    if let Some(cert) = certificate {
        insert(&mut headers, "x-aip-certificate-id", cert.certificate_id);
        insert(&mut headers, "x-aip-chain-hash", cert.chain_hash);
    }

    headers
}

pub fn enforcement_header(mode: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    insert(&mut headers, "x-aip-enforcement", mode);
    headers
}

/// Set `x-aip-nudge-count` directly on an already-built header map, used by
/// the streaming response path where the full [`integrity_headers`] set
/// isn't available yet (analysis runs in the background).
pub fn insert_nudge_count(headers: &mut HeaderMap, count: usize) {
    insert(headers, "x-aip-nudge-count", count.to_string());
}

/// Quota-decision headers merged onto the response regardless of outcome
/// (spec §4.8, §7).
pub fn quota_headers(ctx: &QuotaContext, decision: &Decision) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(percent) = quota::usage_percent(ctx) {
        insert(&mut headers, "x-mnemom-usage-percent", percent.to_string());
    }
    match decision {
        Decision::Warn(quota::WarnReason::QuotaExceeded) => {
            insert(&mut headers, "x-mnemom-usage-warning", "quota_exceeded");
        }
        Decision::Warn(quota::WarnReason::ApproachingQuota) => {
            insert(&mut headers, "x-mnemom-usage-warning", "approaching_quota");
        }
        Decision::Reject(_) | Decision::Allow => {}
    }
    headers
}

pub fn merge(into: &mut HeaderMap, from: HeaderMap) {
    for (name, value) in from.iter() {
        into.insert(name.clone(), value.clone());
    }
}
