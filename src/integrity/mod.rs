//! Integrity Engine (C3, spec §4.3).

pub mod conscience;
pub mod drift;
pub mod http_model;
pub mod prompt;
pub mod verdict;
pub mod window;

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::agent::AlignmentCard;
use crate::error::IntegrityError;
use crate::identifiers;
use crate::providers::Provider;
use crate::store::checkpoint::{
    AnalysisMetadata, CheckpointSource, IntegrityCheckpoint, WindowPosition,
};
use verdict::{Action, ParsedVerdict, Verdict};
use window::{SlidingWindow, WindowSummary};

/// Evidence is truncated to this many characters wherever it is persisted
/// or forwarded downstream (adopted from the original project's zkVM
/// shared-types module; see SPEC_FULL.md §C).
pub const MAX_EVIDENCE_LENGTH: usize = 200;

/// Pluggable analysis model client, mirroring this codebase's
/// `ClientWrapper` trait-object pattern for provider abstraction: callers
/// supply any implementation (a real HTTP-backed "haiku"-class model, or a
/// deterministic fake for tests).
#[async_trait]
pub trait AnalysisModel: Send + Sync {
    /// Send the system/user prompt pair and return the raw reply text.
    async fn analyze(&self, system_prompt: &str, user_prompt: &str) -> Result<String, IntegrityError>;

    fn model_name(&self) -> &str;
}

/// `{checkpoint, window_summary, proceed, recommended_action}` (spec §4.3).
#[derive(Debug, Clone)]
pub struct IntegritySignal {
    pub checkpoint: IntegrityCheckpoint,
    pub window_summary: WindowSummary,
    pub proceed: bool,
    pub recommended_action: Action,
}

/// SHA-256 hex of the normalised (trimmed) thinking text.
pub fn thinking_block_hash(thinking: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(thinking.trim().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[allow(clippy::too_many_arguments)]
/// Run the full integrity pipeline (spec §4.3) for one interaction, given
/// already-extracted reasoning text. On any analysis-model failure this
/// returns a synthetic-clear [`ParsedVerdict`] (fail-open) rather than
/// propagating the error — callers at the gateway boundary never see an
/// `Err` from this function.
pub async fn run_pipeline(
    model: &dyn AnalysisModel,
    thinking: &str,
    card: &AlignmentCard,
    conscience_values: &[String],
    role: &str,
    tool_names: &[String],
    user_request: &str,
    window: &mut SlidingWindow,
    drift: &mut drift::DriftDetector,
    agent_id: &str,
    session_id: &str,
    provider: Provider,
    model_name: &str,
    source: CheckpointSource,
    analysis_duration_ms: u64,
) -> IntegritySignal {
    let window_summary_before = window.summary(drift.is_active());

    let built_prompt = prompt::build_prompt(
        thinking,
        card,
        conscience_values,
        role,
        tool_names,
        user_request,
        &window_summary_before,
    );

    let parsed = match model.analyze(&built_prompt.system, &built_prompt.user).await {
        Ok(raw) => verdict::parse_analysis_reply(&raw).unwrap_or_else(|_| ParsedVerdict::synthetic_clear()),
        Err(_) => ParsedVerdict::synthetic_clear(),
    };

    finish_pipeline(
        parsed,
        thinking,
        card,
        window,
        drift,
        agent_id,
        session_id,
        provider,
        model_name,
        source,
        analysis_duration_ms,
        built_prompt.truncated,
    )
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn finish_pipeline(
    parsed: ParsedVerdict,
    thinking: &str,
    card: &AlignmentCard,
    window: &mut SlidingWindow,
    drift: &mut drift::DriftDetector,
    agent_id: &str,
    session_id: &str,
    provider: Provider,
    model_name: &str,
    source: CheckpointSource,
    analysis_duration_ms: u64,
    truncated: bool,
) -> IntegritySignal {
    let now = window::now_unix();
    let index_before = window.len();
    window.push(parsed.verdict, now);
    let window_summary = window.summary(false);
    let drift_active = drift.record(parsed.verdict, window_summary.integrity_ratio);
    let window_summary = window.summary(drift_active);

    let hash = thinking_block_hash(thinking);
    let original_tokens = thinking.split_whitespace().count();

    let checkpoint = IntegrityCheckpoint {
        checkpoint_id: identifiers::checkpoint_id(),
        agent_id: agent_id.to_string(),
        card_id: card.card_id.clone(),
        session_id: session_id.to_string(),
        timestamp: Utc::now(),
        provider,
        model: model_name.to_string(),
        thinking_block_hash: hash,
        verdict: parsed.verdict,
        concerns: parsed.concerns,
        reasoning_summary: parsed.reasoning_summary,
        conscience_context: parsed.conscience_context,
        window_position: WindowPosition {
            index: index_before,
            window_size: window_summary.size,
        },
        analysis_metadata: AnalysisMetadata {
            analysis_model: model_name.to_string(),
            analysis_duration_ms,
            tokens_original: original_tokens,
            tokens_analyzed: if truncated { original_tokens.min(2000) } else { original_tokens },
            truncated,
            extraction_confidence: parsed.extraction_confidence,
        },
        linked_trace_id: None,
        source,
    };

    IntegritySignal {
        proceed: checkpoint.verdict.proceed(),
        recommended_action: checkpoint.verdict.recommended_action(),
        checkpoint,
        window_summary,
    }
}

/// A deterministic fake [`AnalysisModel`] returning a fixed verdict,
/// usable both by this crate's own tests and by downstream integration
/// tests that don't want to depend on a live analysis endpoint.
pub struct FixedVerdictModel {
    pub reply: String,
}

#[async_trait]
impl AnalysisModel for FixedVerdictModel {
    async fn analyze(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String, IntegrityError> {
        Ok(self.reply.clone())
    }

    fn model_name(&self) -> &str {
        "fixed-verdict-fake"
    }
}
