//! Gateway configuration.
//!
//! No TOML, YAML, or other config-file parsing dependency is introduced
//! here, matching this codebase's established minimalism (see the
//! original `CloudLLMConfig`): configuration is either built
//! programmatically via [`GatewayConfigBuilder`] or loaded from
//! environment variables via [`GatewayConfig::from_env`].

use std::env;
use std::time::Duration;

/// Fixed retry delay schedule for webhook delivery (spec §4.7).
pub const DEFAULT_WEBHOOK_RETRY_SCHEDULE: &[Duration] = &[
    Duration::from_secs(1),
    Duration::from_secs(5),
    Duration::from_secs(30),
    Duration::from_secs(120),
    Duration::from_secs(600),
];

/// Upstream base URLs for each supported provider.
#[derive(Debug, Clone)]
pub struct UpstreamUrls {
    pub anthropic: String,
    pub openai: String,
    pub gemini: String,
}

impl Default for UpstreamUrls {
    fn default() -> Self {
        UpstreamUrls {
            anthropic: "https://api.anthropic.com".to_string(),
            openai: "https://api.openai.com".to_string(),
            gemini: "https://generativelanguage.googleapis.com".to_string(),
        }
    }
}

/// Top-level gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Master kill switch; when false the gateway passes every request
    /// through untouched with `X-AIP-Verdict: disabled`.
    pub aip_enabled: bool,
    /// Upstream base URLs, overridable for local testing against a mock.
    pub upstream: UpstreamUrls,
    /// Base URL of the smaller analysis model endpoint (OpenAI-compatible).
    pub analysis_model_base_url: Option<String>,
    /// API key for the analysis model endpoint.
    pub analysis_model_api_key: Option<String>,
    /// Model identifier used for analysis calls (e.g. a "haiku"-class model).
    pub analysis_model_name: String,
    /// Hex-encoded Ed25519 signing key seed (32 bytes). `None` disables attestation.
    pub signing_key_hex: Option<String>,
    /// Identifier surfaced alongside signatures for future key rotation.
    pub signing_key_id: String,
    /// TTL for the quota decision cache.
    pub quota_cache_ttl: Duration,
    /// Timeout for a single analysis model call.
    pub analysis_timeout: Duration,
    /// Timeout for a hybrid (observer-delegated) analysis call.
    pub hybrid_analysis_timeout: Duration,
    /// Number of consecutive endpoint delivery failures before auto-disable.
    pub webhook_disable_threshold: u32,
    /// Retry delay schedule for webhook delivery.
    pub webhook_retry_schedule: Vec<Duration>,
    /// Default auto-containment threshold applied to new agents (0 disables it).
    pub default_auto_containment_threshold: Option<u32>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            aip_enabled: true,
            upstream: UpstreamUrls::default(),
            analysis_model_base_url: None,
            analysis_model_api_key: None,
            analysis_model_name: "claude-haiku-4-5".to_string(),
            signing_key_hex: None,
            signing_key_id: "default".to_string(),
            quota_cache_ttl: Duration::from_secs(300),
            analysis_timeout: Duration::from_secs(8),
            hybrid_analysis_timeout: Duration::from_secs(10),
            webhook_disable_threshold: 10,
            webhook_retry_schedule: DEFAULT_WEBHOOK_RETRY_SCHEDULE.to_vec(),
            default_auto_containment_threshold: None,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from `AIP_*` environment variables, falling back
    /// to [`Default`] for anything unset. A missing or malformed value
    /// never panics — this function never fails the process at startup.
    pub fn from_env() -> Self {
        let mut cfg = GatewayConfig::default();

        if let Ok(v) = env::var("AIP_ENABLED") {
            cfg.aip_enabled = v != "0" && v.to_lowercase() != "false";
        }
        if let Ok(v) = env::var("AIP_ANTHROPIC_BASE_URL") {
            cfg.upstream.anthropic = v;
        }
        if let Ok(v) = env::var("AIP_OPENAI_BASE_URL") {
            cfg.upstream.openai = v;
        }
        if let Ok(v) = env::var("AIP_GEMINI_BASE_URL") {
            cfg.upstream.gemini = v;
        }
        if let Ok(v) = env::var("AIP_ANALYSIS_MODEL_BASE_URL") {
            cfg.analysis_model_base_url = Some(v);
        }
        if let Ok(v) = env::var("AIP_ANALYSIS_MODEL_API_KEY") {
            cfg.analysis_model_api_key = Some(v);
        }
        if let Ok(v) = env::var("AIP_ANALYSIS_MODEL_NAME") {
            cfg.analysis_model_name = v;
        }
        if let Ok(v) = env::var("AIP_SIGNING_KEY_HEX") {
            cfg.signing_key_hex = Some(v);
        }
        if let Ok(v) = env::var("AIP_SIGNING_KEY_ID") {
            cfg.signing_key_id = v;
        }
        if let Ok(v) = env::var("AIP_QUOTA_CACHE_TTL_SECS") {
            if let Ok(secs) = v.parse::<u64>() {
                cfg.quota_cache_ttl = Duration::from_secs(secs);
            }
        }
        if let Ok(v) = env::var("AIP_WEBHOOK_DISABLE_THRESHOLD") {
            if let Ok(n) = v.parse::<u32>() {
                cfg.webhook_disable_threshold = n;
            }
        }
        if let Ok(v) = env::var("AIP_DEFAULT_AUTO_CONTAINMENT_THRESHOLD") {
            cfg.default_auto_containment_threshold = v.parse::<u32>().ok();
        }

        cfg
    }

    /// Whether the attestation layer is enabled: a signing key is present.
    /// Per-account feature flag overrides are applied by the caller on top
    /// of this process-level gate (spec §4.4).
    pub fn attestation_enabled(&self) -> bool {
        self.signing_key_hex.is_some()
    }
}

/// Fluent builder mirroring this codebase's `MCPServerBuilder` idiom, used
/// mainly by tests that want to construct a [`GatewayConfig`] without
/// touching the process environment.
#[derive(Debug, Clone, Default)]
pub struct GatewayConfigBuilder {
    inner: GatewayConfig,
}

impl GatewayConfigBuilder {
    pub fn new() -> Self {
        GatewayConfigBuilder {
            inner: GatewayConfig::default(),
        }
    }

    pub fn aip_enabled(mut self, enabled: bool) -> Self {
        self.inner.aip_enabled = enabled;
        self
    }

    pub fn upstream(mut self, upstream: UpstreamUrls) -> Self {
        self.inner.upstream = upstream;
        self
    }

    pub fn analysis_model(mut self, base_url: impl Into<String>, api_key: impl Into<String>, name: impl Into<String>) -> Self {
        self.inner.analysis_model_base_url = Some(base_url.into());
        self.inner.analysis_model_api_key = Some(api_key.into());
        self.inner.analysis_model_name = name.into();
        self
    }

    pub fn signing_key(mut self, key_hex: impl Into<String>, key_id: impl Into<String>) -> Self {
        self.inner.signing_key_hex = Some(key_hex.into());
        self.inner.signing_key_id = key_id.into();
        self
    }

    pub fn webhook_disable_threshold(mut self, threshold: u32) -> Self {
        self.inner.webhook_disable_threshold = threshold;
        self
    }

    pub fn default_auto_containment_threshold(mut self, threshold: Option<u32>) -> Self {
        self.inner.default_auto_containment_threshold = threshold;
        self
    }

    pub fn build(self) -> GatewayConfig {
        self.inner
    }
}
