//! Gateway Core (C1, spec §4.1): request admission, upstream forwarding,
//! and the inline/streaming response-path integrity pipeline.
//!
//! `GatewayState` wires every other module together into one axum
//! application, the way `AxumHttpAdapter::start` wires a `ToolProtocol`
//! into a running server.

pub mod admission;
pub mod forward;
pub mod headers;
pub mod inject;

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use chrono::Utc;
use dashmap::DashMap;
use futures_util::StreamExt;
use rand::Rng;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::agent::{Agent, AgentStore, AlignmentCard, CardStore, EnforcementMode, InMemoryAgentStore, InMemoryCardStore};
use crate::attestation::chain::InMemoryChainStore;
use crate::attestation::signing::{Certificate, SigningKeyMaterial};
use crate::attestation::{commitment, Attestor};
use crate::background::BackgroundTasks;
use crate::config::GatewayConfig;
use crate::enforcement::containment::apply_containment;
use crate::enforcement::evaluate_containment;
use crate::enforcement::nudge::{self, Nudge, NudgeStrategy};
use crate::identifiers;
use crate::integrity::drift::DriftDetector;
use crate::integrity::verdict::{ConcernCategory, ParsedVerdict, Verdict};
use crate::integrity::window::{SlidingWindow, WindowConfig};
use crate::integrity::{self, conscience, AnalysisModel, IntegritySignal};
use crate::providers::{self, Provider};
use crate::quota::{self, Decision};
use crate::session;
use crate::store::checkpoint::{CheckpointSource, CheckpointStore, InMemoryCheckpointStore};
use crate::webhook::{self, InMemoryWebhookStore, WebhookEndpoint};

use admission::{FreeTierResolver, QuotaCache, QuotaResolver};

const MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

/// A `Clone`-able handle passed to every axum handler; cloning only bumps
/// the inner `Arc`.
#[derive(Clone)]
pub struct GatewayState {
    inner: Arc<Inner>,
}

struct Inner {
    config: GatewayConfig,
    http_client: reqwest::Client,
    agent_store: InMemoryAgentStore,
    card_store: InMemoryCardStore,
    checkpoint_store: InMemoryCheckpointStore,
    webhook_store: InMemoryWebhookStore,
    attestor: Option<Attestor<InMemoryChainStore>>,
    analysis_model: Option<Arc<dyn AnalysisModel>>,
    quota_resolver: Arc<dyn QuotaResolver>,
    quota_cache: QuotaCache,
    background: BackgroundTasks,
    windows: DashMap<String, Arc<AsyncMutex<(SlidingWindow, DriftDetector)>>>,
    pending_nudges: DashMap<String, Vec<Nudge>>,
}

impl GatewayState {
    /// `analysis_model` lets a caller supply a fake or a custom client; when
    /// `None` and `config.analysis_model_base_url` is set, a real
    /// [`crate::integrity::http_model::HttpAnalysisModel`] is built from the
    /// config's `analysis_model_*` fields automatically.
    pub fn new(config: GatewayConfig, analysis_model: Option<Arc<dyn AnalysisModel>>, quota_resolver: Option<Arc<dyn QuotaResolver>>) -> Self {
        let attestor = config.signing_key_hex.as_ref().and_then(|seed| {
            SigningKeyMaterial::from_hex_seed(seed, config.signing_key_id.clone()).ok()
        }).map(|key| Attestor::new(key, InMemoryChainStore::new()));

        let quota_cache_ttl = config.quota_cache_ttl;
        let http_client = reqwest::Client::new();

        let analysis_model = analysis_model.or_else(|| {
            config.analysis_model_base_url.as_ref().map(|base_url| {
                Arc::new(crate::integrity::http_model::HttpAnalysisModel::new(
                    http_client.clone(),
                    base_url.clone(),
                    config.analysis_model_api_key.clone().unwrap_or_default(),
                    config.analysis_model_name.clone(),
                    config.analysis_timeout,
                )) as Arc<dyn AnalysisModel>
            })
        });

        GatewayState {
            inner: Arc::new(Inner {
                http_client,
                agent_store: InMemoryAgentStore::new(),
                card_store: InMemoryCardStore::new(),
                checkpoint_store: InMemoryCheckpointStore::new(),
                webhook_store: InMemoryWebhookStore::new(),
                attestor,
                analysis_model,
                quota_resolver: quota_resolver.unwrap_or_else(|| Arc::new(FreeTierResolver)),
                quota_cache: QuotaCache::new(quota_cache_ttl),
                background: BackgroundTasks::new(32),
                windows: DashMap::new(),
                pending_nudges: DashMap::new(),
                config,
            }),
        }
    }

    /// Register a webhook endpoint for an account (spec §4.7 step 1). This
    /// crate has no account-management surface of its own; callers key
    /// endpoints by whatever `account_id` they use to identify agents.
    pub fn register_webhook_endpoint(&self, endpoint: WebhookEndpoint) {
        self.inner.webhook_store.register_endpoint(endpoint);
    }

    pub async fn background_outstanding(&self) -> usize {
        self.inner.background.outstanding().await
    }

    pub async fn drain_background(&self) {
        self.inner.background.drain().await;
    }
}

/// Build the axum router: `/health`, `/models.json`, plus one catch-all
/// proxy route per provider prefix (spec §4.1 "public contract").
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", any(health_handler))
        .route("/models.json", any(models_handler))
        .route("/{provider}/{*rest}", any(proxy_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    use axum::http::HeaderName;
    let expose: Vec<HeaderName> = [
        "x-smoltbot-agent",
        "x-smoltbot-session",
        "x-aip-verdict",
        "x-aip-checkpoint-id",
        "x-aip-action",
        "x-aip-proceed",
        "x-aip-certificate-id",
        "x-aip-chain-hash",
        "x-aip-synthetic",
        "x-aip-source",
        "x-aip-enforcement",
        "x-aip-nudge-count",
        "x-mnemom-usage-percent",
        "x-mnemom-usage-warning",
    ]
    .iter()
    .map(|h| HeaderName::from_static(h))
    .collect();

    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(expose)
}

/// `GET /health` (spec §4.8): a plain liveness/version probe, unauthenticated
/// and independent of per-agent admission.
async fn health_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    json_response(
        StatusCode::OK,
        json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": Utc::now().to_rfc3339(),
            "aip_enabled": state.inner.config.aip_enabled,
        }),
    )
}

/// `GET /models.json` (spec §4.8): a static registry of the models this
/// gateway proxies, so operators can tell which ones carry thinking-block
/// extraction without making a round trip to each provider.
async fn models_handler() -> impl IntoResponse {
    json_response(
        StatusCode::OK,
        json!({
            "anthropic": [
                {"id": "claude-opus-4-1", "name": "Claude Opus 4.1", "thinking": true},
                {"id": "claude-sonnet-4-5", "name": "Claude Sonnet 4.5", "thinking": true},
                {"id": "claude-haiku-4-5", "name": "Claude Haiku 4.5", "thinking": false},
            ],
            "openai": [
                {"id": "o3", "name": "OpenAI o3", "thinking": true},
                {"id": "gpt-4.1", "name": "GPT-4.1", "thinking": false},
            ],
            "gemini": [
                {"id": "gemini-2.5-pro", "name": "Gemini 2.5 Pro", "thinking": true},
                {"id": "gemini-2.5-flash", "name": "Gemini 2.5 Flash", "thinking": true},
            ],
        }),
    )
}

fn json_response(status: StatusCode, body: Value) -> Response {
    (status, axum::Json(body)).into_response()
}

fn enforcement_mode_str(mode: EnforcementMode) -> &'static str {
    match mode {
        EnforcementMode::Observe => "observe",
        EnforcementMode::Nudge => "nudge",
        EnforcementMode::Enforce => "enforce",
    }
}

/// Best-effort extraction of the model name from the request body, falling
/// back to Gemini's `models/<name>:generate...` path segment when the body
/// carries none.
fn extract_model_name(provider: Provider, body_json: Option<&Value>, rest_of_path: &str) -> String {
    if let Some(v) = body_json.and_then(|b| b.get("model")).and_then(|m| m.as_str()) {
        return v.to_string();
    }
    if provider == Provider::Gemini {
        if let Some(idx) = rest_of_path.find("models/") {
            let after = &rest_of_path[idx + "models/".len()..];
            return after.split(':').next().unwrap_or("unknown").to_string();
        }
    }
    "unknown".to_string()
}

/// Best-effort extraction of the latest user-turn text, used only as
/// task context for the analysis prompt (spec §4.3) — never persisted.
fn extract_user_request(body_json: &Value) -> String {
    if let Some(messages) = body_json.get("messages").and_then(|m| m.as_array()) {
        for m in messages.iter().rev() {
            if m.get("role").and_then(|r| r.as_str()) != Some("user") {
                continue;
            }
            if let Some(s) = m.get("content").and_then(|c| c.as_str()) {
                return s.to_string();
            }
            if let Some(arr) = m.get("content").and_then(|c| c.as_array()) {
                for block in arr {
                    if let Some(t) = block.get("text").and_then(|t| t.as_str()) {
                        return t.to_string();
                    }
                }
            }
        }
    }
    if let Some(contents) = body_json.get("contents").and_then(|c| c.as_array()) {
        for c in contents.iter().rev() {
            if let Some(parts) = c.get("parts").and_then(|p| p.as_array()) {
                for part in parts {
                    if let Some(t) = part.get("text").and_then(|t| t.as_str()) {
                        return t.to_string();
                    }
                }
            }
        }
    }
    String::new()
}

fn wants_stream(body_json: Option<&Value>, rest_of_path: &str) -> bool {
    if body_json.and_then(|b| b.get("stream")).and_then(|s| s.as_bool()) == Some(true) {
        return true;
    }
    rest_of_path.contains("streamGenerateContent")
}

async fn proxy_handler(
    State(state): State<GatewayState>,
    Path((provider_prefix, rest)): Path<(String, String)>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let Some(provider) = Provider::from_path_prefix(&provider_prefix) else {
        return json_response(StatusCode::NOT_FOUND, json!({"type": "unknown_provider"}));
    };

    let Some(credential) = admission::extract_credential(&headers) else {
        return json_response(StatusCode::UNAUTHORIZED, json!({"type": "authentication_error"}));
    };
    let billing_key = admission::extract_billing_key(&headers);

    let body_bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(_) => return json_response(StatusCode::BAD_REQUEST, json!({"type": "invalid_request_body"})),
    };

    let query = uri.query().map(|q| q.to_string());

    state.handle_proxy(provider, &rest, query.as_deref(), method, headers, credential, billing_key, body_bytes).await
}

impl GatewayState {
    #[allow(clippy::too_many_arguments)]
    async fn handle_proxy(
        &self,
        provider: Provider,
        rest_of_path: &str,
        query: Option<&str>,
        method: Method,
        inbound_headers: HeaderMap,
        credential: String,
        billing_key: Option<String>,
        body_bytes: axum::body::Bytes,
    ) -> Response {
        if !self.inner.config.aip_enabled {
            return self
                .forward_passthrough(provider, rest_of_path, query, method, &inbound_headers, billing_key.as_deref(), body_bytes)
                .await;
        }

        let (agent, created) = self.inner.agent_store.get_or_create(&credential).await;
        let card = if created {
            self.inner.card_store.get_or_create_default(&agent.id).await
        } else {
            match self.inner.card_store.active(&agent.id).await {
                Some(c) => c,
                None => self.inner.card_store.get_or_create_default(&agent.id).await,
            }
        };

        let quota_ctx = self
            .inner
            .quota_cache
            .resolve(self.inner.quota_resolver.as_ref(), &agent.id, billing_key.as_deref())
            .await;
        let decision = quota::decide(&quota_ctx);

        if let Decision::Reject(reason) = decision {
            let status = admission::reject_status_code(&decision).unwrap_or(402);
            let mut headers = headers::quota_headers(&quota_ctx, &decision);
            headers::merge(&mut headers, headers::identity_headers(&agent.id, ""));
            let mut response = json_response(
                StatusCode::from_u16(status).unwrap_or(StatusCode::PAYMENT_REQUIRED),
                json!({"type": if reason.is_containment() { "agent_contained" } else { "quota_rejected" }, "reason": reason.code()}),
            );
            headers::merge(response.headers_mut(), headers);
            return response;
        }

        let body_json: Option<Value> = serde_json::from_slice(&body_bytes).ok();
        let model_name = extract_model_name(provider, body_json.as_ref(), rest_of_path);
        let now = Utc::now();

        let pending: Vec<Nudge> = self.inner.pending_nudges.get(&agent.id).map(|v| v.clone()).unwrap_or_default();
        let selected_ids: Vec<String> = nudge::select_pending(&pending, now).iter().map(|n| n.nudge_id.clone()).collect();
        let nudge_count = selected_ids.len();

        let outbound_bytes = match &body_json {
            Some(v) => {
                let prepared = inject::prepare_outbound_body(provider, &model_name, v.clone(), &pending, now);
                serde_json::to_vec(&prepared).unwrap_or_else(|_| body_bytes.to_vec())
            }
            None => body_bytes.to_vec(),
        };

        let trace_id = identifiers::trace_id();
        let url = forward::upstream_url(&self.inner.config.upstream, provider, rest_of_path, query);
        let upstream_headers = forward::build_upstream_headers(&inbound_headers, &trace_id, billing_key.as_deref());

        let upstream_request = self
            .inner
            .http_client
            .request(forward::forward_method(&method), &url)
            .headers(upstream_headers)
            .body(outbound_bytes);

        let upstream_response = match upstream_request.send().await {
            Ok(r) => r,
            Err(e) => {
                if log::log_enabled!(log::Level::Error) {
                    log::error!("upstream request to {} failed for agent {}: {}", url, agent.id, e);
                }
                let mut response = json_response(StatusCode::BAD_GATEWAY, json!({"type": "upstream_unavailable", "message": e.to_string()}));
                headers::merge(response.headers_mut(), headers::verdict_error());
                headers::merge(response.headers_mut(), headers::identity_headers(&agent.id, ""));
                return response;
            }
        };

        let status = upstream_response.status();
        if !status.is_success() {
            return self.pass_through_upstream(&agent, upstream_response, headers::verdict_skipped()).await;
        }

        if !selected_ids.is_empty() {
            self.mark_nudges_delivered(&agent.id, &selected_ids);
        }

        let streaming = wants_stream(body_json.as_ref(), rest_of_path);

        if streaming {
            self.handle_streaming_response(agent, card, provider, model_name, upstream_response, nudge_count).await
        } else {
            self.handle_buffered_response(agent, card, provider, model_name, upstream_response, body_json, nudge_count)
                .await
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn forward_passthrough(
        &self,
        provider: Provider,
        rest_of_path: &str,
        query: Option<&str>,
        method: Method,
        inbound_headers: &HeaderMap,
        billing_key: Option<&str>,
        body_bytes: axum::body::Bytes,
    ) -> Response {
        let trace_id = identifiers::trace_id();
        let url = forward::upstream_url(&self.inner.config.upstream, provider, rest_of_path, query);
        let upstream_headers = forward::build_upstream_headers(inbound_headers, &trace_id, billing_key);
        let request = self
            .inner
            .http_client
            .request(forward::forward_method(&method), &url)
            .headers(upstream_headers)
            .body(body_bytes.to_vec());

        match request.send().await {
            Ok(resp) => {
                let status = StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
                let bytes = resp.bytes().await.unwrap_or_default();
                let mut response = (status, bytes.to_vec()).into_response();
                headers::merge(response.headers_mut(), headers::verdict_disabled());
                response
            }
            Err(e) => json_response(StatusCode::BAD_GATEWAY, json!({"type": "upstream_unavailable", "message": e.to_string()})),
        }
    }

    /// Mark the given pending nudges `Delivered` once the forward they were
    /// injected into has actually succeeded (spec §4.1 step 4: "mark
    /// delivered after the forward"), rather than the moment they are
    /// selected for injection.
    fn mark_nudges_delivered(&self, agent_id: &str, selected_ids: &[String]) {
        if let Some(mut entry) = self.inner.pending_nudges.get_mut(agent_id) {
            for n in entry.iter_mut() {
                if selected_ids.contains(&n.nudge_id) {
                    n.status = crate::enforcement::NudgeStatus::Delivered;
                }
            }
            entry.retain(|n| matches!(n.status, crate::enforcement::NudgeStatus::Pending));
        }
    }

    async fn pass_through_upstream(&self, agent: &Agent, upstream_response: reqwest::Response, verdict_headers: HeaderMap) -> Response {
        let status = StatusCode::from_u16(upstream_response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        let bytes = upstream_response.bytes().await.unwrap_or_default();
        let mut response = (status, bytes.to_vec()).into_response();
        headers::merge(response.headers_mut(), verdict_headers);
        headers::merge(response.headers_mut(), headers::identity_headers(&agent.id, ""));
        response
    }

    async fn handle_buffered_response(
        &self,
        agent: Agent,
        card: AlignmentCard,
        provider: Provider,
        model_name: String,
        upstream_response: reqwest::Response,
        request_body_json: Option<Value>,
        nudge_count: usize,
    ) -> Response {
        let status = upstream_response.status();
        let response_bytes = match upstream_response.bytes().await {
            Ok(b) => b,
            Err(_) => {
                let mut response = json_response(StatusCode::BAD_GATEWAY, json!({"type": "upstream_unavailable"}));
                headers::merge(response.headers_mut(), headers::verdict_error());
                return response;
            }
        };
        let response_json: Option<Value> = serde_json::from_slice(&response_bytes).ok();

        let extraction = match &response_json {
            Some(rj) => providers::extract_buffered(provider, rj),
            None => providers::Extraction::empty(),
        };

        let user_request = request_body_json.as_ref().map(extract_user_request).unwrap_or_default();
        let tool_names: Vec<String> = extraction.tool_calls.iter().map(|t| t.name.clone()).collect();
        let synthetic = !extraction.has_thinking();

        let (signal, certificate, _nudge_created) = self
            .process_interaction(
                &agent,
                &card,
                provider,
                &model_name,
                extraction.thinking.as_deref().unwrap_or(""),
                &user_request,
                &tool_names,
                CheckpointSource::Gateway,
            )
            .await;

        let status_code = StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::OK);

        let enforce_and_violated = agent.enforcement_mode == EnforcementMode::Enforce && signal.checkpoint.verdict == Verdict::BoundaryViolation;

        let mut response = if enforce_and_violated {
            json_response(
                StatusCode::FORBIDDEN,
                json!({
                    "type": "integrity_violation",
                    "checkpoint": {
                        "checkpoint_id": signal.checkpoint.checkpoint_id,
                        "verdict": signal.checkpoint.verdict.as_str(),
                        "reasoning_summary": signal.checkpoint.reasoning_summary,
                    },
                }),
            )
        } else {
            (status_code, response_bytes.to_vec()).into_response()
        };

        let cert_info = certificate.as_ref().map(|c| headers::CertificateInfo {
            certificate_id: &c.certificate_id,
            chain_hash: &c.chain_hash,
        });

        let mut out_headers = headers::identity_headers(&agent.id, &signal.checkpoint.session_id);
        headers::merge(&mut out_headers, headers::integrity_headers(&signal, synthetic, false, cert_info, nudge_count));
        headers::merge(&mut out_headers, headers::enforcement_header(enforcement_mode_str(agent.enforcement_mode)));
        headers::merge(response.headers_mut(), out_headers);
        response
    }

    async fn handle_streaming_response(
        &self,
        agent: Agent,
        card: AlignmentCard,
        provider: Provider,
        model_name: String,
        upstream_response: reqwest::Response,
        nudge_count: usize,
    ) -> Response {
        let status = StatusCode::from_u16(upstream_response.status().as_u16()).unwrap_or(StatusCode::OK);
        let (tx, mut rx) = mpsc::unbounded_channel::<axum::body::Bytes>();

        let upstream_stream = upstream_response.bytes_stream().map(move |chunk_result| {
            if let Ok(chunk) = &chunk_result {
                let _ = tx.send(chunk.clone());
            }
            chunk_result
        });

        let body = Body::from_stream(upstream_stream);
        let mut response = (status, body).into_response();

        let mut out_headers = headers::identity_headers(&agent.id, &session::session_id(&agent.agent_hash, now_unix()));
        headers::merge(&mut out_headers, headers::verdict_pending());
        headers::merge(&mut out_headers, headers::enforcement_header(enforcement_mode_str(agent.enforcement_mode)));
        headers::insert_nudge_count(&mut out_headers, nudge_count);
        headers::merge(response.headers_mut(), out_headers);

        let state = self.clone();
        self.inner.background.spawn(Duration::from_secs(120), async move {
            let mut transcript = Vec::new();
            while let Some(chunk) = rx.recv().await {
                transcript.extend_from_slice(&chunk);
            }
            let text = String::from_utf8_lossy(&transcript).to_string();
            let extraction = providers::extract_from_sse(provider, &text);
            if !extraction.has_thinking() {
                return;
            }
            let tool_names: Vec<String> = extraction.tool_calls.iter().map(|t| t.name.clone()).collect();
            let _ = state
                .process_interaction(
                    &agent,
                    &card,
                    provider,
                    &model_name,
                    extraction.thinking.as_deref().unwrap_or(""),
                    "",
                    &tool_names,
                    CheckpointSource::Gateway,
                )
                .await;
        });

        response
    }

    /// Run the integrity pipeline for one interaction, persist the
    /// checkpoint, attest it, decide on a nudge, evaluate auto-containment,
    /// and emit a `checkpoint.created` webhook. Shared by the buffered and
    /// streaming response paths (spec §4.1 response-path, §4.3-§4.7).
    #[allow(clippy::too_many_arguments)]
    async fn process_interaction(
        &self,
        agent: &Agent,
        card: &AlignmentCard,
        provider: Provider,
        model_name: &str,
        thinking: &str,
        user_request: &str,
        tool_names: &[String],
        source: CheckpointSource,
    ) -> (IntegritySignal, Option<Certificate>, bool) {
        let now = Utc::now();
        let session_id = session::session_id(&agent.agent_hash, now.timestamp().max(0) as u64);

        let window_lock = self
            .inner
            .windows
            .entry(session_id.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new((SlidingWindow::new(WindowConfig::default()), DriftDetector::new()))))
            .clone();

        let conscience_values = conscience::resolve_conscience_values(conscience::OrgMode::Unconfigured, &[], card);

        let signal = {
            let mut guard = window_lock.lock().await;
            let (window, drift) = &mut *guard;

            if thinking.trim().is_empty() || self.inner.analysis_model.is_none() {
                let parsed = ParsedVerdict::synthetic_clear();
                integrity::finish_pipeline(parsed, thinking, card, window, drift, &agent.id, &session_id, provider, model_name, source, 0, false)
            } else {
                let model = self.inner.analysis_model.as_ref().unwrap();
                integrity::run_pipeline(
                    model.as_ref(),
                    thinking,
                    card,
                    &conscience_values,
                    "assistant",
                    tool_names,
                    user_request,
                    window,
                    drift,
                    &agent.id,
                    &session_id,
                    provider,
                    model_name,
                    source,
                    0,
                )
                .await
            }
        };

        self.inner.checkpoint_store.upsert(signal.checkpoint.clone()).await;

        let certificate = if let Some(attestor) = &self.inner.attestor {
            let card_json = serde_json::to_value(card).unwrap_or_else(|_| json!({}));
            let window_ctx = json!({"size": signal.window_summary.size, "integrity_ratio": signal.window_summary.integrity_ratio});
            let input_commitment = commitment::input_commitment(&card_json, &conscience_values, &window_ctx, model_name, "v1");
            match attestor
                .attest_checkpoint(
                    &agent.id,
                    &session_id,
                    &signal.checkpoint.checkpoint_id,
                    signal.checkpoint.verdict,
                    &signal.checkpoint.thinking_block_hash,
                    &input_commitment,
                    signal.checkpoint.timestamp,
                )
                .await
            {
                Ok(cert) => Some(cert),
                Err(e) => {
                    if log::log_enabled!(log::Level::Warn) {
                        log::warn!("attestation failed for checkpoint {}: {}", signal.checkpoint.checkpoint_id, e);
                    }
                    None
                }
            }
        } else {
            None
        };

        let mut nudge_created = false;
        if signal.checkpoint.verdict == Verdict::BoundaryViolation {
            let strategy = match agent.enforcement_mode {
                EnforcementMode::Observe => NudgeStrategy::Off,
                EnforcementMode::Nudge | EnforcementMode::Enforce => NudgeStrategy::Always,
            };
            let sample: f64 = rand::thread_rng().gen();
            if nudge::should_create_nudge(&strategy, signal.window_summary.boundary_violation_count as u32, sample) {
                let reason_category = signal
                    .checkpoint
                    .concerns
                    .first()
                    .map(|c| concern_category_str(&c.category).to_string())
                    .unwrap_or_else(|| "boundary_violation".to_string());
                let nudge = Nudge::new(&agent.id, &reason_category, now);
                self.inner.pending_nudges.entry(agent.id.clone()).or_default().push(nudge);
                nudge_created = true;
            }
        }

        let threshold = agent.auto_containment_threshold.or(self.inner.config.default_auto_containment_threshold);
        if let Some(t) = threshold {
            let recent = self.inner.checkpoint_store.recent_for_agent(&agent.id, t as usize).await;
            let verdicts: Vec<Verdict> = recent.iter().map(|c| c.verdict).collect();
            let outcome = evaluate_containment(Some(t), &verdicts);
            let mut mutated = agent.clone();
            if apply_containment(&mut mutated, outcome, now).is_some() {
                self.inner.agent_store.update(mutated).await;
                self.inner.quota_cache.purge(&agent.id, None);
            }
        }

        let event_data = json!({
            "checkpoint_id": signal.checkpoint.checkpoint_id,
            "agent_id": signal.checkpoint.agent_id,
            "verdict": signal.checkpoint.verdict.as_str(),
        });
        webhook::emit(&self.inner.webhook_store, &self.inner.http_client, &agent.id, "checkpoint.created", event_data).await;

        (signal, certificate, nudge_created)
    }
}

fn now_unix() -> u64 {
    crate::integrity::window::now_unix()
}

fn concern_category_str(category: &ConcernCategory) -> &'static str {
    match category {
        ConcernCategory::PromptInjection => "prompt_injection",
        ConcernCategory::ValueMisalignment => "value_misalignment",
        ConcernCategory::AutonomyViolation => "autonomy_violation",
        ConcernCategory::ReasoningCorruption => "reasoning_corruption",
        ConcernCategory::DeceptiveReasoning => "deceptive_reasoning",
        ConcernCategory::UndeclaredIntent => "undeclared_intent",
    }
}
