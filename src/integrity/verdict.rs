//! Closed-set verdict/concern types and verdict parsing (spec §3, §4.3).
//!
//! The enum shapes here are adopted from the one surviving fragment of the
//! original project's source (a zkVM guest's shared types module), since
//! that file's `ConcernCategory`/`Severity`/`Verdict` definitions are
//! exactly the closed sets spec.md describes in prose. Only the type
//! shapes are reused; this module has nothing to do with proof systems.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::MAX_EVIDENCE_LENGTH;
use crate::error::IntegrityError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcernCategory {
    PromptInjection,
    ValueMisalignment,
    AutonomyViolation,
    ReasoningCorruption,
    DeceptiveReasoning,
    UndeclaredIntent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Concern {
    pub category: ConcernCategory,
    pub severity: Severity,
    pub description: String,
    #[serde(default)]
    pub evidence: String,
    #[serde(default)]
    pub relevant_card_field: Option<String>,
    #[serde(default)]
    pub relevant_conscience_value: Option<String>,
}

impl Concern {
    /// Truncate `evidence` to [`MAX_EVIDENCE_LENGTH`] before this concern is
    /// ever persisted or surfaced (spec §5: "only category-level summaries").
    pub fn truncate_evidence(mut self) -> Self {
        if self.evidence.chars().count() > MAX_EVIDENCE_LENGTH {
            self.evidence = self.evidence.chars().take(MAX_EVIDENCE_LENGTH).collect();
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Clear,
    ReviewNeeded,
    BoundaryViolation,
}

impl Verdict {
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s {
            "clear" => Some(Verdict::Clear),
            "review_needed" => Some(Verdict::ReviewNeeded),
            "boundary_violation" => Some(Verdict::BoundaryViolation),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Clear => "clear",
            Verdict::ReviewNeeded => "review_needed",
            Verdict::BoundaryViolation => "boundary_violation",
        }
    }
}

/// Recommended enforcement action. The original source's `PauseForReview`
/// variant is exposed on the wire as `warn_user` per spec §4.3's public
/// `recommended_action` enum; see DESIGN.md for the naming reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Continue,
    LogAndContinue,
    #[serde(rename = "warn_user")]
    WarnUser,
    DenyAndEscalate,
}

impl Verdict {
    /// `clear -> continue/proceed=true`, `review_needed ->
    /// log_and_continue/proceed=true`, `boundary_violation ->
    /// deny_and_escalate/proceed=false` (spec §4.3 Signal mapping).
    pub fn recommended_action(&self) -> Action {
        match self {
            Verdict::Clear => Action::Continue,
            Verdict::ReviewNeeded => Action::LogAndContinue,
            Verdict::BoundaryViolation => Action::DenyAndEscalate,
        }
    }

    pub fn proceed(&self) -> bool {
        !matches!(self, Verdict::BoundaryViolation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationDepth {
    Surface,
    Standard,
    Deep,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConscienceContext {
    pub values_checked: Vec<String>,
    pub conflicts: Vec<String>,
    pub supports: Vec<String>,
    pub considerations: Vec<String>,
    pub consultation_depth: ConsultationDepth,
}

impl Default for ConscienceContext {
    fn default() -> Self {
        ConscienceContext {
            values_checked: Vec::new(),
            conflicts: Vec::new(),
            supports: Vec::new(),
            considerations: Vec::new(),
            consultation_depth: ConsultationDepth::Surface,
        }
    }
}

/// The analysis model's raw JSON reply, parsed but not yet trusted: the
/// `verdict` string is re-derived from the parsed concerns/context rather
/// than taken at face value in the original project, but spec.md treats
/// the string as authoritative once validated against the closed set —
/// see DESIGN.md Open Questions.
///
/// `concerns` is deserialized as raw JSON values rather than `Vec<Concern>`
/// directly: a single concern carrying a category outside the closed set
/// must not fail the whole reply (spec §4.3 "drop unknown categories only
/// by reporting a parse warning"), and `serde`'s derive has no per-element
/// skip-on-error behavior for a `Vec<T>` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReply {
    pub verdict: String,
    #[serde(default)]
    pub concerns: Vec<Value>,
    #[serde(default)]
    pub reasoning_summary: String,
    #[serde(default)]
    pub conscience_context: ConscienceContext,
}

/// A fully parsed and validated verdict, ready to become part of a checkpoint.
#[derive(Debug, Clone)]
pub struct ParsedVerdict {
    pub verdict: Verdict,
    pub concerns: Vec<Concern>,
    pub reasoning_summary: String,
    pub conscience_context: ConscienceContext,
    pub extraction_confidence: f64,
}

impl ParsedVerdict {
    /// The fail-open synthetic-clear fallback (spec §4.3): used whenever the
    /// analysis model's reply cannot be parsed at all.
    pub fn synthetic_clear() -> Self {
        ParsedVerdict {
            verdict: Verdict::Clear,
            concerns: Vec::new(),
            reasoning_summary: "synthetic clear: analysis reply unparseable".to_string(),
            conscience_context: ConscienceContext::default(),
            extraction_confidence: 0.0,
        }
    }
}

/// Extract the largest `{...}` substring from `raw` and parse it as an
/// [`AnalysisReply`], validating the verdict against the closed set.
/// Unknown concern categories are reported as a parse warning (dropped,
/// logged) without failing the whole checkpoint; total parse failure
/// returns `Err` so the caller can fall back to [`ParsedVerdict::synthetic_clear`].
pub fn parse_analysis_reply(raw: &str) -> Result<ParsedVerdict, IntegrityError> {
    let json_slice = largest_brace_substring(raw)
        .ok_or_else(|| IntegrityError::VerdictParseFailed("no JSON object found".to_string()))?;

    let reply: AnalysisReply = serde_json::from_str(json_slice)
        .map_err(|e| IntegrityError::VerdictParseFailed(e.to_string()))?;

    let verdict = Verdict::from_str_loose(&reply.verdict).ok_or_else(|| {
        IntegrityError::VerdictParseFailed(format!("unknown verdict: {}", reply.verdict))
    })?;

    let mut concerns: Vec<Concern> = Vec::with_capacity(reply.concerns.len());
    for raw_concern in reply.concerns {
        match serde_json::from_value::<Concern>(raw_concern) {
            Ok(concern) => concerns.push(concern.truncate_evidence()),
            Err(e) => {
                if log::log_enabled!(log::Level::Warn) {
                    log::warn!("dropping unparseable concern in analysis reply: {}", e);
                }
            }
        }
    }

    Ok(ParsedVerdict {
        verdict,
        concerns,
        reasoning_summary: reply.reasoning_summary,
        conscience_context: reply.conscience_context,
        extraction_confidence: 1.0,
    })
}

/// Find the largest substring bounded by a matching pair of `{`/`}`,
/// tolerating surrounding prose the analysis model may have emitted.
fn largest_brace_substring(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&raw[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_clear_reply() {
        let raw = r#"Here is my analysis: {"verdict":"clear","concerns":[],"reasoning_summary":"Aligned","conscience_context":{"values_checked":["accuracy"],"conflicts":[],"supports":["accuracy"],"considerations":[],"consultation_depth":"standard"}}"#;
        let parsed = parse_analysis_reply(raw).unwrap();
        assert_eq!(parsed.verdict, Verdict::Clear);
        assert_eq!(parsed.verdict.recommended_action(), Action::Continue);
        assert!(parsed.verdict.proceed());
    }

    #[test]
    fn boundary_violation_maps_to_deny_and_escalate() {
        let raw = r#"{"verdict":"boundary_violation","concerns":[{"category":"autonomy_violation","severity":"critical","description":"ran rm -rf anyway","evidence":"..."}],"reasoning_summary":"bad"}"#;
        let parsed = parse_analysis_reply(raw).unwrap();
        assert_eq!(parsed.verdict.recommended_action(), Action::DenyAndEscalate);
        assert!(!parsed.verdict.proceed());
        assert_eq!(parsed.concerns[0].category, ConcernCategory::AutonomyViolation);
    }

    #[test]
    fn unparseable_reply_yields_error_not_panic() {
        let err = parse_analysis_reply("not json at all").unwrap_err();
        assert!(matches!(err, IntegrityError::VerdictParseFailed(_)));
    }

    #[test]
    fn unknown_verdict_string_is_rejected() {
        let raw = r#"{"verdict":"maybe","concerns":[]}"#;
        assert!(parse_analysis_reply(raw).is_err());
    }

    #[test]
    fn a_concern_with_an_unknown_category_is_dropped_but_the_rest_of_the_reply_survives() {
        let raw = r#"{"verdict":"boundary_violation","concerns":[
            {"category":"time_travel_paradox","severity":"critical","description":"bogus category"},
            {"category":"autonomy_violation","severity":"high","description":"ran rm -rf anyway"}
        ],"reasoning_summary":"mixed reply"}"#;
        let parsed = parse_analysis_reply(raw).unwrap();
        assert_eq!(parsed.verdict, Verdict::BoundaryViolation);
        assert_eq!(parsed.concerns.len(), 1);
        assert_eq!(parsed.concerns[0].category, ConcernCategory::AutonomyViolation);
        assert_eq!(parsed.reasoning_summary, "mixed reply");
    }

    #[test]
    fn evidence_is_truncated_to_max_length() {
        let long_evidence = "x".repeat(MAX_EVIDENCE_LENGTH + 50);
        let concern = Concern {
            category: ConcernCategory::UndeclaredIntent,
            severity: Severity::Low,
            description: "desc".to_string(),
            evidence: long_evidence,
            relevant_card_field: None,
            relevant_conscience_value: None,
        }
        .truncate_evidence();
        assert_eq!(concern.evidence.chars().count(), MAX_EVIDENCE_LENGTH);
    }

    #[test]
    fn synthetic_clear_has_zero_confidence() {
        let synthetic = ParsedVerdict::synthetic_clear();
        assert_eq!(synthetic.verdict, Verdict::Clear);
        assert_eq!(synthetic.extraction_confidence, 0.0);
    }
}
