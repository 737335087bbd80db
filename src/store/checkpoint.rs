//! The Integrity Checkpoint record and its idempotent store contract
//! (spec §3, §4.5).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::integrity::verdict::{Concern, ConscienceContext, Verdict};
use crate::providers::Provider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationDepthAlias {
    Surface,
    Standard,
    Deep,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowPosition {
    pub index: usize,
    pub window_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    pub analysis_model: String,
    pub analysis_duration_ms: u64,
    pub tokens_original: usize,
    pub tokens_analyzed: usize,
    pub truncated: bool,
    pub extraction_confidence: f64,
}

/// Where a checkpoint originated: real-time gateway analysis, background
/// post-log processing, or delegated (hybrid) analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointSource {
    Gateway,
    Observer,
    Hybrid,
}

/// The core per-interaction record (spec §3). Immutable once created;
/// upsert by `checkpoint_id` is merge-duplicates, not overwrite (see
/// [`CheckpointStore::upsert`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityCheckpoint {
    pub checkpoint_id: String,
    pub agent_id: String,
    pub card_id: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub provider: Provider,
    pub model: String,
    pub thinking_block_hash: String,
    pub verdict: Verdict,
    pub concerns: Vec<Concern>,
    pub reasoning_summary: String,
    pub conscience_context: ConscienceContext,
    pub window_position: WindowPosition,
    pub analysis_metadata: AnalysisMetadata,
    pub linked_trace_id: Option<String>,
    pub source: CheckpointSource,
}

/// The idempotent upsert + query contract a real deployment's persistence
/// layer must satisfy. This crate provides only this trait and an
/// in-memory reference implementation for tests; a production store is an
/// external collaborator (spec §1 Non-goals).
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Insert or merge-update a checkpoint, keyed by `checkpoint_id`. Must
    /// be a true no-op (not a duplicate row) when called twice with an
    /// identical checkpoint — the deduplication invariant in spec §4.5.
    async fn upsert(&self, checkpoint: IntegrityCheckpoint) -> IntegrityCheckpoint;

    /// Fetch the most recent checkpoint for an (agent, session), used by
    /// the observer to decide whether a gateway checkpoint already exists
    /// (spec §4.5 step 6).
    async fn latest_for_session(&self, agent_id: &str, session_id: &str) -> Option<IntegrityCheckpoint>;

    async fn get(&self, checkpoint_id: &str) -> Option<IntegrityCheckpoint>;

    /// The `n` most recent checkpoints for an agent across every session,
    /// most-recent-first. Used by auto-containment (spec §4.6) to look back
    /// across the agent's whole recent history, not just one session.
    async fn recent_for_agent(&self, agent_id: &str, n: usize) -> Vec<IntegrityCheckpoint>;
}

/// In-memory reference [`CheckpointStore`], suitable for tests and for a
/// single-process deployment with no durability requirement.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: dashmap::DashMap<String, IntegrityCheckpoint>,
    by_session: dashmap::DashMap<String, Vec<String>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        InMemoryCheckpointStore::default()
    }

    fn session_key(agent_id: &str, session_id: &str) -> String {
        format!("{}/{}", agent_id, session_id)
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn upsert(&self, checkpoint: IntegrityCheckpoint) -> IntegrityCheckpoint {
        let key = Self::session_key(&checkpoint.agent_id, &checkpoint.session_id);
        if !self.checkpoints.contains_key(&checkpoint.checkpoint_id) {
            self.by_session
                .entry(key)
                .or_default()
                .push(checkpoint.checkpoint_id.clone());
        }
        self.checkpoints
            .insert(checkpoint.checkpoint_id.clone(), checkpoint.clone());
        checkpoint
    }

    async fn latest_for_session(&self, agent_id: &str, session_id: &str) -> Option<IntegrityCheckpoint> {
        let key = Self::session_key(agent_id, session_id);
        let ids = self.by_session.get(&key)?;
        let last_id = ids.last()?.clone();
        drop(ids);
        self.checkpoints.get(&last_id).map(|r| r.clone())
    }

    async fn get(&self, checkpoint_id: &str) -> Option<IntegrityCheckpoint> {
        self.checkpoints.get(checkpoint_id).map(|r| r.clone())
    }

    async fn recent_for_agent(&self, agent_id: &str, n: usize) -> Vec<IntegrityCheckpoint> {
        let mut matching: Vec<IntegrityCheckpoint> = self
            .checkpoints
            .iter()
            .filter(|e| e.agent_id == agent_id)
            .map(|e| e.clone())
            .collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matching.truncate(n);
        matching
    }
}
