//! Quota Decision contract (spec §4.8).
//!
//! The decision function is pure: no I/O, no clock reads beyond what the
//! caller passes in. The gateway resolves a [`QuotaContext`] through an
//! external stored-procedure call with a lossy 5-minute cache (spec §5);
//! this module only evaluates the already-resolved context against the
//! priority-ordered table.

use serde::{Deserialize, Serialize};

use crate::agent::ContainmentStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingModel {
    None,
    PerCheck,
    Subscription,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Free,
    Developer,
    Team,
    Enterprise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
    PastDue,
}

/// Everything the quota decision needs, resolved ahead of time by the
/// gateway's single stored-procedure call (spec §4.1 step 2). Fields not
/// consulted by the decision table are still carried so the caller can
/// merge them into response headers or pass them to downstream callers.
#[derive(Debug, Clone)]
pub struct QuotaContext {
    pub plan: PlanTier,
    pub billing_model: BillingModel,
    pub subscription_status: SubscriptionStatus,
    pub included_checks: u64,
    pub check_count_this_period: u64,
    pub overage_threshold: u64,
    pub is_suspended: bool,
    pub containment_status: ContainmentStatus,
    /// Days elapsed since `past_due_since`, only meaningful when
    /// `subscription_status == PastDue`.
    pub days_past_due: Option<u64>,
}

/// Grace window for a developer-plan subscription that has gone past due
/// before the account is rejected (spec §4.8).
pub const PAST_DUE_GRACE_DAYS: u64 = 7;

/// Usage ratio thresholds that trigger warnings ahead of a hard reject.
pub const QUOTA_EXCEEDED_RATIO: f64 = 1.0;
pub const APPROACHING_QUOTA_RATIO: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Warn(WarnReason),
    Reject(RejectReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarnReason {
    QuotaExceeded,
    ApproachingQuota,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    AccountSuspended,
    AgentPaused,
    AgentKilled,
    SubscriptionCanceled,
    PastDue,
    OverageThresholdExceeded,
}

impl RejectReason {
    /// The machine-readable code carried in the rejection body (spec §4.1: `reject <reason>`).
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::AccountSuspended => "account_suspended",
            RejectReason::AgentPaused => "agent_paused",
            RejectReason::AgentKilled => "agent_killed",
            RejectReason::SubscriptionCanceled => "subscription_canceled",
            RejectReason::PastDue => "past_due",
            RejectReason::OverageThresholdExceeded => "overage_threshold_exceeded",
        }
    }

    /// Whether this reason is a billing refusal (402) or a containment
    /// refusal (403) — the gateway's response-path distinguishes the two
    /// (spec §4.1 step 3).
    pub fn is_containment(&self) -> bool {
        matches!(self, RejectReason::AgentPaused | RejectReason::AgentKilled)
    }
}

/// Evaluate the priority-ordered quota decision table (spec §4.8).
pub fn decide(ctx: &QuotaContext) -> Decision {
    if ctx.is_suspended {
        return Decision::Reject(RejectReason::AccountSuspended);
    }
    match ctx.containment_status {
        ContainmentStatus::Paused => return Decision::Reject(RejectReason::AgentPaused),
        ContainmentStatus::Killed => return Decision::Reject(RejectReason::AgentKilled),
        ContainmentStatus::Active => {}
    }
    if ctx.plan == PlanTier::Free || ctx.billing_model == BillingModel::None {
        return Decision::Allow;
    }
    if ctx.plan == PlanTier::Enterprise {
        return Decision::Allow;
    }
    if ctx.subscription_status == SubscriptionStatus::Canceled {
        return Decision::Reject(RejectReason::SubscriptionCanceled);
    }
    if ctx.subscription_status == SubscriptionStatus::PastDue {
        if ctx.plan == PlanTier::Team {
            return Decision::Reject(RejectReason::PastDue);
        }
        if ctx.plan == PlanTier::Developer {
            let days = ctx.days_past_due.unwrap_or(0);
            if days > PAST_DUE_GRACE_DAYS {
                return Decision::Reject(RejectReason::PastDue);
            }
            return Decision::Allow;
        }
    }

    if ctx.included_checks > 0 {
        let ratio = ctx.check_count_this_period as f64 / ctx.included_checks as f64;
        if ctx.check_count_this_period >= ctx.overage_threshold {
            return Decision::Reject(RejectReason::OverageThresholdExceeded);
        }
        if ratio >= QUOTA_EXCEEDED_RATIO {
            return Decision::Warn(WarnReason::QuotaExceeded);
        }
        if ratio >= APPROACHING_QUOTA_RATIO {
            return Decision::Warn(WarnReason::ApproachingQuota);
        }
    }

    Decision::Allow
}

/// Usage-percent header value, when `included_checks > 0`.
pub fn usage_percent(ctx: &QuotaContext) -> Option<u32> {
    if ctx.included_checks == 0 {
        return None;
    }
    Some(((ctx.check_count_this_period as f64 / ctx.included_checks as f64) * 100.0).round() as u32)
}

/// The free-tier default used whenever quota resolution fails or misses
/// cache (spec §4.1 step 2: "never a hard fail").
pub fn free_tier_default() -> QuotaContext {
    QuotaContext {
        plan: PlanTier::Free,
        billing_model: BillingModel::None,
        subscription_status: SubscriptionStatus::Active,
        included_checks: 0,
        check_count_this_period: 0,
        overage_threshold: 0,
        is_suspended: false,
        containment_status: ContainmentStatus::Active,
        days_past_due: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> QuotaContext {
        QuotaContext {
            plan: PlanTier::Developer,
            billing_model: BillingModel::Subscription,
            subscription_status: SubscriptionStatus::Active,
            included_checks: 100,
            check_count_this_period: 0,
            overage_threshold: 120,
            is_suspended: false,
            containment_status: ContainmentStatus::Active,
            days_past_due: None,
        }
    }

    #[test]
    fn suspended_account_is_rejected_above_all_else() {
        let mut ctx = base();
        ctx.is_suspended = true;
        ctx.containment_status = ContainmentStatus::Paused;
        assert_eq!(decide(&ctx), Decision::Reject(RejectReason::AccountSuspended));
    }

    #[test]
    fn contained_agent_is_rejected() {
        let mut ctx = base();
        ctx.containment_status = ContainmentStatus::Paused;
        assert_eq!(decide(&ctx), Decision::Reject(RejectReason::AgentPaused));
    }

    #[test]
    fn free_plan_always_allows() {
        let mut ctx = base();
        ctx.plan = PlanTier::Free;
        ctx.check_count_this_period = 10_000;
        assert_eq!(decide(&ctx), Decision::Allow);
    }

    #[test]
    fn enterprise_plan_always_allows() {
        let mut ctx = base();
        ctx.plan = PlanTier::Enterprise;
        ctx.check_count_this_period = 10_000;
        assert_eq!(decide(&ctx), Decision::Allow);
    }

    #[test]
    fn canceled_subscription_is_rejected() {
        let mut ctx = base();
        ctx.subscription_status = SubscriptionStatus::Canceled;
        assert_eq!(decide(&ctx), Decision::Reject(RejectReason::SubscriptionCanceled));
    }

    #[test]
    fn past_due_team_plan_is_rejected_immediately() {
        let mut ctx = base();
        ctx.plan = PlanTier::Team;
        ctx.subscription_status = SubscriptionStatus::PastDue;
        ctx.days_past_due = Some(1);
        assert_eq!(decide(&ctx), Decision::Reject(RejectReason::PastDue));
    }

    #[test]
    fn past_due_developer_within_grace_allows() {
        let mut ctx = base();
        ctx.subscription_status = SubscriptionStatus::PastDue;
        ctx.days_past_due = Some(3);
        assert_eq!(decide(&ctx), Decision::Allow);
    }

    #[test]
    fn past_due_developer_past_grace_rejects() {
        let mut ctx = base();
        ctx.subscription_status = SubscriptionStatus::PastDue;
        ctx.days_past_due = Some(8);
        assert_eq!(decide(&ctx), Decision::Reject(RejectReason::PastDue));
    }

    #[test]
    fn over_threshold_count_rejects() {
        let mut ctx = base();
        ctx.check_count_this_period = 120;
        assert_eq!(decide(&ctx), Decision::Reject(RejectReason::OverageThresholdExceeded));
    }

    #[test]
    fn at_full_quota_warns_quota_exceeded() {
        let mut ctx = base();
        ctx.check_count_this_period = 100;
        assert_eq!(decide(&ctx), Decision::Warn(WarnReason::QuotaExceeded));
    }

    #[test]
    fn at_eighty_percent_warns_approaching_quota() {
        let mut ctx = base();
        ctx.check_count_this_period = 80;
        assert_eq!(decide(&ctx), Decision::Warn(WarnReason::ApproachingQuota));
    }

    #[test]
    fn below_threshold_allows() {
        let mut ctx = base();
        ctx.check_count_this_period = 10;
        assert_eq!(decide(&ctx), Decision::Allow);
    }

    #[test]
    fn usage_percent_is_none_without_included_checks() {
        let mut ctx = base();
        ctx.included_checks = 0;
        assert_eq!(usage_percent(&ctx), None);
    }

    #[test]
    fn usage_percent_rounds_to_nearest_whole_number() {
        let mut ctx = base();
        ctx.check_count_this_period = 33;
        assert_eq!(usage_percent(&ctx), Some(33));
    }
}
