//! Enforcement (spec §4.6): nudges and auto-containment, the two ways the
//! gateway acts on a `boundary_violation` verdict without human review.

pub mod containment;
pub mod nudge;

pub use containment::{evaluate_containment, ContainmentOutcome};
pub use nudge::{Nudge, NudgeStatus, NudgeStrategy};
