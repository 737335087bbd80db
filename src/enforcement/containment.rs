//! Auto-containment (spec §4.6): an agent with `auto_containment_threshold
//! = N` is automatically paused once its N most recent checkpoints are all
//! `boundary_violation`, without waiting for a human to review anything.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::{Agent, ContainmentStatus};
use crate::integrity::verdict::Verdict;

/// `{action: auto_pause, actor: system, reason, previous_status, new_status}`
/// (spec §4.6), written whenever auto-containment actually transitions an
/// agent's status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub action: String,
    pub actor: String,
    pub reason: String,
    pub previous_status: ContainmentStatus,
    pub new_status: ContainmentStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainmentOutcome {
    NoAction,
    Pause { reason: String },
}

/// Pure evaluation over the most-recent-first verdict history (spec §4.6).
/// An agent with no threshold configured, or fewer checkpoints than the
/// threshold, is never auto-contained — this is the fail-open default.
pub fn evaluate_containment(threshold: Option<u32>, recent_verdicts_newest_first: &[Verdict]) -> ContainmentOutcome {
    let Some(threshold) = threshold else {
        return ContainmentOutcome::NoAction;
    };
    let threshold = threshold as usize;
    if threshold == 0 || recent_verdicts_newest_first.len() < threshold {
        return ContainmentOutcome::NoAction;
    }

    let window = &recent_verdicts_newest_first[..threshold];
    if window.iter().all(|v| *v == Verdict::BoundaryViolation) {
        ContainmentOutcome::Pause {
            reason: format!(
                "{} consecutive boundary_violation checkpoints (threshold {})",
                threshold, threshold
            ),
        }
    } else {
        ContainmentOutcome::NoAction
    }
}

/// Apply a [`ContainmentOutcome`] to `agent` in place. Returns the audit
/// record when a transition actually happened; `None` for a no-op (nothing
/// to pause, or the agent is already paused/killed — auto-containment never
/// promotes status, only demotes it).
pub fn apply_containment(agent: &mut Agent, outcome: ContainmentOutcome, now: DateTime<Utc>) -> Option<AuditRecord> {
    let ContainmentOutcome::Pause { reason } = outcome else {
        return None;
    };
    if agent.containment_status != ContainmentStatus::Active {
        return None;
    }

    let previous_status = agent.containment_status;
    agent.containment_status = ContainmentStatus::Paused;

    Some(AuditRecord {
        action: "auto_pause".to_string(),
        actor: "system".to_string(),
        reason,
        previous_status,
        new_status: agent.containment_status,
        timestamp: now,
    })
}
