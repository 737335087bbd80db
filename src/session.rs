//! Session identity (spec §3).
//!
//! Sessions are derived, not stored: a session is simply an hour-bucketed
//! grouping of an agent's checkpoints.

/// Derive `<agent_hash>-<floor(unix_seconds / 3600)>`.
pub fn session_id(agent_hash: &str, unix_seconds: u64) -> String {
    format!("{}-{}", agent_hash, unix_seconds / 3600)
}
