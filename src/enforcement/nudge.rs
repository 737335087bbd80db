//! Nudges (spec §4.6).
//!
//! A nudge is a pending, PII-free notice spliced into the system prompt of
//! an agent's next request after a `boundary_violation` checkpoint, when
//! the agent's enforcement mode calls for it.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::identifiers;

/// Lifetime after which an undelivered nudge expires (spec §4.6).
pub const NUDGE_LIFETIME_HOURS: i64 = 4;

/// Maximum number of pending nudges injected into a single request.
pub const MAX_NUDGES_PER_REQUEST: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NudgeStatus {
    Pending,
    Delivered,
    Expired,
}

/// Nudge delivery strategy, evaluated at nudge-creation time (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum NudgeStrategy {
    Always,
    Sampling { nudge_rate: f64 },
    Threshold { violations_required: u32 },
    Off,
}

impl Default for NudgeStrategy {
    fn default() -> Self {
        NudgeStrategy::Always
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nudge {
    pub nudge_id: String,
    pub agent_id: String,
    pub reason_category: String,
    pub created_at: DateTime<Utc>,
    pub status: NudgeStatus,
}

impl Nudge {
    pub fn new(agent_id: &str, reason_category: &str, now: DateTime<Utc>) -> Self {
        Nudge {
            nudge_id: identifiers::nudge_id(),
            agent_id: agent_id.to_string(),
            reason_category: reason_category.to_string(),
            created_at: now,
            status: NudgeStatus::Pending,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > ChronoDuration::hours(NUDGE_LIFETIME_HOURS)
    }

    /// A generic, PII-free notice text (spec §5: "only category-level
    /// summaries are allowed" — never the raw thinking or evidence).
    pub fn notice_text(&self) -> String {
        format!(
            "A prior response of yours was flagged for {}. Review your declared values and operating boundaries before continuing.",
            self.reason_category.replace('_', " ")
        )
    }
}

/// Decide, at nudge-creation time, whether a nudge should actually be
/// created for this violation given the agent's strategy and the number
/// of violations already seen this session.
pub fn should_create_nudge(strategy: &NudgeStrategy, violations_this_session: u32, sample: f64) -> bool {
    match strategy {
        NudgeStrategy::Always => true,
        NudgeStrategy::Off => false,
        NudgeStrategy::Sampling { nudge_rate } => sample < *nudge_rate,
        NudgeStrategy::Threshold { violations_required } => violations_this_session >= *violations_required,
    }
}

/// Select up to [`MAX_NUDGES_PER_REQUEST`] pending, unexpired nudges for
/// an agent (spec §4.1 step 4), oldest first.
pub fn select_pending(nudges: &[Nudge], now: DateTime<Utc>) -> Vec<&Nudge> {
    let mut pending: Vec<&Nudge> = nudges
        .iter()
        .filter(|n| matches!(n.status, NudgeStatus::Pending) && !n.is_expired(now))
        .collect();
    pending.sort_by_key(|n| n.created_at);
    pending.truncate(MAX_NUDGES_PER_REQUEST);
    pending
}

/// Splice selected nudge notices into a provider's request body in its
/// own idiom (spec §4.1 step 4): Anthropic appends to `system`, OpenAI
/// prepends a `role: system` message, Gemini is a no-op (skipped).
pub fn splice_into_anthropic_system(existing_system: Option<&str>, notices: &[String]) -> String {
    let joined = notices.join(" ");
    match existing_system {
        Some(existing) if !existing.is_empty() => format!("{}\n\n{}", existing, joined),
        _ => joined,
    }
}

pub fn splice_into_openai_messages(notices: &[String]) -> Option<serde_json::Value> {
    if notices.is_empty() {
        return None;
    }
    Some(serde_json::json!({
        "role": "system",
        "content": notices.join(" "),
    }))
}
