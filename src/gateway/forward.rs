//! Upstream request construction: URL rebasing and the `cf-aig-*`
//! metadata headers carried through to the observer (spec §4.1 step 5,
//! §4.5).

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;

use crate::config::UpstreamUrls;
use crate::providers::Provider;

/// Rebase `/anthropic/v1/messages` (the path past the provider prefix)
/// onto the matching upstream base URL.
pub fn upstream_url(upstream: &UpstreamUrls, provider: Provider, rest_of_path: &str, query: Option<&str>) -> String {
    let base = match provider {
        Provider::Anthropic => &upstream.anthropic,
        Provider::Openai => &upstream.openai,
        Provider::Gemini => &upstream.gemini,
    };
    let path = rest_of_path.trim_start_matches('/');
    let mut url = format!("{}/{}", base.trim_end_matches('/'), path);
    if let Some(q) = query {
        if !q.is_empty() {
            url.push('?');
            url.push_str(q);
        }
    }
    url
}

/// Headers from the inbound request worth forwarding upstream, minus the
/// hop-by-hop and gateway-internal ones that must not leak through
/// (spec §4.1 step 5: forward the client's own credential header
/// untouched, drop everything the gateway itself added or consumed).
const DROPPED_INBOUND_HEADERS: &[&str] = &["host", "content-length", "x-mnemom-api-key"];

/// `account_token` is the caller's own AI Gateway authorization (spec
/// §4.1 step 5), distinct from the provider credential header which is
/// preserved untouched by the loop above.
pub fn build_upstream_headers(inbound: &axum::http::HeaderMap, trace_id: &str, account_token: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in inbound.iter() {
        if DROPPED_INBOUND_HEADERS.contains(&name.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            headers.insert(name, value);
        }
    }
    headers.insert(
        "cf-aig-metadata",
        HeaderValue::from_str(&format!(r#"{{"trace_id":"{}"}}"#, trace_id)).unwrap(),
    );
    let auth_value = format!("Bearer {}", account_token.unwrap_or(""));
    if let Ok(value) = HeaderValue::from_str(&auth_value) {
        headers.insert("cf-aig-authorization", value);
    }
    headers
}

/// The method forwarded upstream is always whatever the client sent;
/// this crate only proxies the request bodies it understands (`POST`),
/// but every other method is passed through unmodified too.
pub fn forward_method(method: &axum::http::Method) -> Method {
    Method::from_bytes(method.as_str().as_bytes()).unwrap_or(Method::POST)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_url_rebases_path_onto_provider_base() {
        let upstream = UpstreamUrls::default();
        let url = upstream_url(&upstream, Provider::Anthropic, "/v1/messages", None);
        assert_eq!(url, "https://api.anthropic.com/v1/messages");
    }

    #[test]
    fn upstream_url_preserves_query_string() {
        let upstream = UpstreamUrls::default();
        let url = upstream_url(&upstream, Provider::Gemini, "/v1beta/models/gemini-2.5-flash:generateContent", Some("key=abc"));
        assert!(url.ends_with(":generateContent?key=abc"));
    }

    #[test]
    fn build_upstream_headers_drops_billing_key_and_host() {
        let mut inbound = axum::http::HeaderMap::new();
        inbound.insert("host", axum::http::HeaderValue::from_static("gateway.local"));
        inbound.insert("x-mnemom-api-key", axum::http::HeaderValue::from_static("mk-secret"));
        inbound.insert("x-api-key", axum::http::HeaderValue::from_static("sk-ant-abc"));
        let out = build_upstream_headers(&inbound, "tr-abc123de", Some("mk-secret"));
        assert!(out.get("host").is_none());
        assert!(out.get("x-mnemom-api-key").is_none());
        assert!(out.get("x-api-key").is_some());
        assert!(out.get("cf-aig-metadata").is_some());
        assert_eq!(out.get("cf-aig-authorization").unwrap(), "Bearer mk-secret");
    }

    #[test]
    fn build_upstream_headers_sends_an_empty_bearer_without_an_account_token() {
        let inbound = axum::http::HeaderMap::new();
        let out = build_upstream_headers(&inbound, "tr-abc123de", None);
        assert_eq!(out.get("cf-aig-authorization").unwrap(), "Bearer ");
    }
}
