//! Agent identity and alignment card data model (spec §3).

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

use crate::identifiers;

/// How aggressively the gateway reacts to boundary violations for an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementMode {
    Observe,
    Nudge,
    Enforce,
}

/// Whether an agent may currently make requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainmentStatus {
    Active,
    Paused,
    Killed,
}

/// A unique agent identity, derived from the credential it authenticates with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// `smolt-<hash8>`.
    pub id: String,
    /// First 8-16 hex chars of SHA-256(api_key).
    pub agent_hash: String,
    pub enforcement_mode: EnforcementMode,
    pub containment_status: ContainmentStatus,
    pub auto_containment_threshold: Option<u32>,
}

/// Compute the agent hash from a raw credential, truncated to `len` hex chars.
///
/// Spec §3 allows 8-16 hex characters; the gateway uses 16 for the stored
/// `agent_hash` and 8 for the derived `id` suffix.
pub fn credential_hash(credential: &str, len: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(credential.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..len.min(digest.len())].to_string()
}

impl Agent {
    /// Derive (but do not persist) a brand new agent record for a credential
    /// seen for the first time. Callers are responsible for the "insert
    /// returning representation, create a default card" step described in
    /// spec §4.1 step 1; this constructs the in-memory shape only.
    pub fn new_for_credential(credential: &str) -> Self {
        let agent_hash = credential_hash(credential, 16);
        let id = identifiers::agent_id(&agent_hash[..8]);
        Agent {
            id,
            agent_hash,
            enforcement_mode: EnforcementMode::Observe,
            containment_status: ContainmentStatus::Active,
            auto_containment_threshold: None,
        }
    }

    pub fn is_contained(&self) -> bool {
        !matches!(self.containment_status, ContainmentStatus::Active)
    }
}

/// A single declared value, with optional priority/description.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct DeclaredValue {
    pub name: String,
    pub priority: Option<i32>,
    pub description: Option<String>,
}

/// `{condition, action, reason?}` — fires enforcement actions on a condition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EscalationTrigger {
    pub condition: String,
    pub action: String,
    pub reason: Option<String>,
}

/// The declared values and autonomy envelope for an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignmentCard {
    pub card_id: String,
    pub agent_id: String,
    pub declared_values: Vec<DeclaredValue>,
    pub bounded_actions: BTreeSet<String>,
    pub forbidden_actions: BTreeSet<String>,
    pub escalation_triggers: Vec<EscalationTrigger>,
    pub role: Option<String>,
    pub description: Option<String>,
    /// Carried through from whichever card contributed the principal identity
    /// on merge (agent card wins, per spec §3).
    pub principal: Option<String>,
    pub audit_commitment: Option<String>,
}

impl AlignmentCard {
    /// A minimal card created lazily for a brand new agent.
    pub fn default_for_agent(agent_id: &str) -> Self {
        AlignmentCard {
            card_id: format!("ac-{}", &agent_id[agent_id.len().saturating_sub(8)..]),
            agent_id: agent_id.to_string(),
            declared_values: Vec::new(),
            bounded_actions: BTreeSet::new(),
            forbidden_actions: BTreeSet::new(),
            escalation_triggers: Vec::new(),
            role: None,
            description: None,
            principal: None,
            audit_commitment: None,
        }
    }

    /// Merge an organisation-level template card with an agent-level card.
    ///
    /// Rule (spec §3): union over `declared_values`, union over
    /// `forbidden_actions`, concat over `escalation_triggers` (org first),
    /// agent card wins for `principal` and `audit_commitment`.
    pub fn merge(org: &AlignmentCard, agent: &AlignmentCard) -> AlignmentCard {
        let mut declared_values = org.declared_values.clone();
        for v in &agent.declared_values {
            if !declared_values.contains(v) {
                declared_values.push(v.clone());
            }
        }

        let bounded_actions: BTreeSet<String> = org
            .bounded_actions
            .union(&agent.bounded_actions)
            .cloned()
            .collect();
        let forbidden_actions: BTreeSet<String> = org
            .forbidden_actions
            .union(&agent.forbidden_actions)
            .cloned()
            .collect();

        let mut escalation_triggers = org.escalation_triggers.clone();
        escalation_triggers.extend(agent.escalation_triggers.clone());

        AlignmentCard {
            card_id: agent.card_id.clone(),
            agent_id: agent.agent_id.clone(),
            declared_values,
            bounded_actions,
            forbidden_actions,
            escalation_triggers,
            role: agent.role.clone().or_else(|| org.role.clone()),
            description: agent.description.clone().or_else(|| org.description.clone()),
            principal: agent.principal.clone(),
            audit_commitment: agent.audit_commitment.clone(),
        }
    }

    /// A compact, PII-free summary suitable for inclusion in an analysis
    /// prompt (spec §4.3 "the alignment card summary").
    pub fn summary(&self) -> String {
        let values: Vec<&str> = self.declared_values.iter().map(|v| v.name.as_str()).collect();
        format!(
            "role={} values=[{}] bounded={} forbidden={}",
            self.role.as_deref().unwrap_or("unspecified"),
            values.join(", "),
            self.bounded_actions.len(),
            self.forbidden_actions.len(),
        )
    }
}

/// The agent-identity persistence contract the gateway consumes (spec §1
/// Non-goals: the persistence layer itself is external). This crate
/// provides the trait plus an in-memory reference implementation suitable
/// for a single-process deployment or tests.
#[async_trait]
pub trait AgentStore: Send + Sync {
    /// Look up an agent by its credential, or lazily create one (spec §4.1
    /// step 1). Returns the agent and whether it was newly created — a
    /// fresh agent also needs a default alignment card minted by the caller.
    async fn get_or_create(&self, credential: &str) -> (Agent, bool);

    async fn get(&self, agent_id: &str) -> Option<Agent>;

    async fn update(&self, agent: Agent);
}

#[derive(Default)]
pub struct InMemoryAgentStore {
    by_hash: DashMap<String, Agent>,
}

impl InMemoryAgentStore {
    pub fn new() -> Self {
        InMemoryAgentStore::default()
    }
}

#[async_trait]
impl AgentStore for InMemoryAgentStore {
    async fn get_or_create(&self, credential: &str) -> (Agent, bool) {
        let hash = credential_hash(credential, 16);
        if let Some(existing) = self.by_hash.get(&hash) {
            return (existing.clone(), false);
        }
        let agent = Agent::new_for_credential(credential);
        self.by_hash.insert(hash, agent.clone());
        (agent, true)
    }

    async fn get(&self, agent_id: &str) -> Option<Agent> {
        self.by_hash.iter().find(|e| e.id == agent_id).map(|e| e.clone())
    }

    async fn update(&self, agent: Agent) {
        self.by_hash.insert(agent.agent_hash.clone(), agent);
    }
}

/// The active-alignment-card persistence contract (spec §3: "exactly one
/// card is active per agent at any instant"). Same Non-goals carve-out as
/// [`AgentStore`].
#[async_trait]
pub trait CardStore: Send + Sync {
    async fn get_or_create_default(&self, agent_id: &str) -> AlignmentCard;

    async fn active(&self, agent_id: &str) -> Option<AlignmentCard>;

    async fn set_active(&self, card: AlignmentCard);
}

#[derive(Default)]
pub struct InMemoryCardStore {
    by_agent: DashMap<String, AlignmentCard>,
}

impl InMemoryCardStore {
    pub fn new() -> Self {
        InMemoryCardStore::default()
    }
}

#[async_trait]
impl CardStore for InMemoryCardStore {
    async fn get_or_create_default(&self, agent_id: &str) -> AlignmentCard {
        if let Some(existing) = self.by_agent.get(agent_id) {
            return existing.clone();
        }
        let card = AlignmentCard::default_for_agent(agent_id);
        self.by_agent.insert(agent_id.to_string(), card.clone());
        card
    }

    async fn active(&self, agent_id: &str) -> Option<AlignmentCard> {
        self.by_agent.get(agent_id).map(|c| c.clone())
    }

    async fn set_active(&self, card: AlignmentCard) {
        self.by_agent.insert(card.agent_id.clone(), card);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn agent_store_creates_once_then_reuses() {
        let store = InMemoryAgentStore::new();
        let (a, created_a) = store.get_or_create("sk-ant-abc").await;
        let (b, created_b) = store.get_or_create("sk-ant-abc").await;
        assert!(created_a);
        assert!(!created_b);
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn card_store_mints_a_default_card_once() {
        let store = InMemoryCardStore::new();
        let first = store.get_or_create_default("smolt-1").await;
        let second = store.get_or_create_default("smolt-1").await;
        assert_eq!(first.card_id, second.card_id);
    }

    #[test]
    fn credential_hash_is_stable_and_truncated() {
        let a = credential_hash("sk-ant-abc123", 16);
        let b = credential_hash("sk-ant-abc123", 16);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn new_agent_derives_id_from_hash_prefix() {
        let agent = Agent::new_for_credential("sk-ant-abc123");
        assert!(agent.id.starts_with("smolt-"));
        assert_eq!(&agent.id[6..], &agent.agent_hash[..8]);
        assert_eq!(agent.containment_status, ContainmentStatus::Active);
    }

    #[test]
    fn merge_unions_values_and_forbidden_actions_org_first_escalations() {
        let org = AlignmentCard {
            card_id: "ac-org".into(),
            agent_id: "smolt-1".into(),
            declared_values: vec![DeclaredValue {
                name: "honesty".into(),
                priority: Some(1),
                description: None,
            }],
            bounded_actions: BTreeSet::from(["send_email".to_string()]),
            forbidden_actions: BTreeSet::from(["delete_prod_db".to_string()]),
            escalation_triggers: vec![EscalationTrigger {
                condition: "org-wide".into(),
                action: "pause".into(),
                reason: None,
            }],
            role: Some("org-default".into()),
            description: None,
            principal: Some("org".into()),
            audit_commitment: Some("org-commit".into()),
        };
        let agent = AlignmentCard {
            card_id: "ac-agent".into(),
            agent_id: "smolt-1".into(),
            declared_values: vec![DeclaredValue {
                name: "curiosity".into(),
                priority: None,
                description: None,
            }],
            bounded_actions: BTreeSet::new(),
            forbidden_actions: BTreeSet::from(["rm_rf".to_string()]),
            escalation_triggers: vec![EscalationTrigger {
                condition: "agent-specific".into(),
                action: "nudge".into(),
                reason: None,
            }],
            role: None,
            description: None,
            principal: Some("agent".into()),
            audit_commitment: Some("agent-commit".into()),
        };

        let merged = AlignmentCard::merge(&org, &agent);
        assert_eq!(merged.declared_values.len(), 2);
        assert_eq!(merged.forbidden_actions.len(), 2);
        assert_eq!(merged.escalation_triggers[0].condition, "org-wide");
        assert_eq!(merged.escalation_triggers[1].condition, "agent-specific");
        assert_eq!(merged.principal, Some("agent".into()));
        assert_eq!(merged.audit_commitment, Some("agent-commit".into()));
    }
}
