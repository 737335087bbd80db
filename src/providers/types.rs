//! Shared provider-adapter output types (spec §4.2).
//!
//! Provider adapter output is a discriminated union rather than an
//! inheritance hierarchy; represented here as a tagged enum, per the
//! cross-language rearrangement guidance in spec §9.

use serde::{Deserialize, Serialize};

/// A single block extracted from a provider-native response: reasoning,
/// visible text, or a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractedBlock {
    Thinking { content: String },
    Text { content: String },
    ToolUse {
        name: String,
        arguments: serde_json::Value,
    },
}

/// The complete result of extracting reasoning from one interaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// `thinking` blocks joined by `\n\n---\n\n`, or `None` if no reasoning was present.
    pub thinking: Option<String>,
    /// Concatenated visible text.
    pub text: String,
    /// Tool calls the model requested.
    pub tool_calls: Vec<ToolCall>,
    /// 0.0-1.0 confidence that extraction reflects the true reasoning content.
    pub confidence: f64,
    /// Approximate token count of the original (pre-truncation) reasoning text.
    pub original_tokens: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: serde_json::Value,
}

impl Extraction {
    /// Whether any reasoning was found at all.
    pub fn has_thinking(&self) -> bool {
        self.thinking.as_ref().is_some_and(|t| !t.is_empty())
    }

    /// An extraction representing "no thinking found" — the adapters'
    /// documented resilient-parsing fallback, never a hard failure.
    pub fn empty() -> Self {
        Extraction::default()
    }
}

/// The wire-level provider identifier used in headers and checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Anthropic,
    Openai,
    Gemini,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::Openai => "openai",
            Provider::Gemini => "gemini",
        }
    }

    pub fn from_path_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "anthropic" => Some(Provider::Anthropic),
            "openai" => Some(Provider::Openai),
            "gemini" => Some(Provider::Gemini),
            _ => None,
        }
    }
}
