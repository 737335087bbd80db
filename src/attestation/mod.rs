//! Attestation Layer (C4, spec §4.4).
//!
//! Ties together input commitment, the per-(agent, session) hash chain, the
//! per-agent Merkle accumulator, and Ed25519 signing into one
//! `attest_checkpoint` call. Enabled only when a signing key is configured
//! and the account's `cryptographic_attestation` feature flag is not
//! explicitly `false` — callers pass that combined gate in as `enabled`
//! rather than this module reaching into account configuration itself.

pub mod chain;
pub mod commitment;
pub mod merkle;
pub mod signing;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::error::AttestationError;
use crate::integrity::verdict::Verdict;
use chain::{ChainStore, ChainWriter};
use merkle::MerkleAccumulator;
use signing::{Certificate, SigningKeyMaterial};

/// Per-agent Merkle accumulator storage, guarded the same way as the chain
/// writer: one mutex per agent serialises the read-append-recompute cycle
/// (spec §5/§9 single-writer-per-agent rearrangement).
#[derive(Default)]
pub struct MerkleStore {
    trees: DashMap<String, Arc<Mutex<MerkleAccumulator>>>,
}

impl MerkleStore {
    pub fn new() -> Self {
        MerkleStore::default()
    }

    fn tree_for(&self, agent_id: &str) -> Arc<Mutex<MerkleAccumulator>> {
        self.trees
            .entry(agent_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(MerkleAccumulator::new())))
            .clone()
    }

    /// Append a leaf for this agent and return its index plus the resulting
    /// `(root, depth, leaf_count)`. Best-effort per spec §4.4: a caller that
    /// gets an `Err` here must still keep the checkpoint — only the
    /// inclusion proof is unavailable for it.
    pub async fn append(&self, agent_id: &str, leaf: String) -> (usize, String, u32, usize) {
        let tree = self.tree_for(agent_id);
        let mut guard = tree.lock().await;
        guard.append(leaf);
        let index = guard.leaf_count() - 1;
        (index, guard.root(), guard.depth(), guard.leaf_count())
    }

    pub async fn proof(&self, agent_id: &str, index: usize) -> Result<Vec<merkle::ProofStep>, AttestationError> {
        let tree = self.tree_for(agent_id);
        let guard = tree.lock().await;
        guard.proof(index)
    }
}

/// Everything the attestation layer needs to produce one checkpoint's
/// certificate: the signing key, the per-agent chain writer/store, and the
/// per-agent Merkle store.
pub struct Attestor<S: ChainStore> {
    pub key: SigningKeyMaterial,
    pub chain_store: S,
    pub chain_writer: ChainWriter,
    pub merkle_store: MerkleStore,
}

impl<S: ChainStore> Attestor<S> {
    pub fn new(key: SigningKeyMaterial, chain_store: S) -> Self {
        Attestor {
            key,
            chain_store,
            chain_writer: ChainWriter::new(),
            merkle_store: MerkleStore::new(),
        }
    }

    /// Run the full attestation pipeline for one checkpoint (spec §4.4):
    /// chain link, Merkle append (best-effort), and Ed25519 signature.
    #[allow(clippy::too_many_arguments)]
    pub async fn attest_checkpoint(
        &self,
        agent_id: &str,
        session_id: &str,
        checkpoint_id: &str,
        verdict: Verdict,
        thinking_block_hash: &str,
        input_commitment: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Certificate, AttestationError> {
        let (chain_hash, prev_chain_hash) = self
            .chain_writer
            .append(
                &self.chain_store,
                agent_id,
                session_id,
                checkpoint_id,
                verdict,
                thinking_block_hash,
                input_commitment,
                timestamp,
            )
            .await?;

        let leaf = merkle::leaf_hash(
            checkpoint_id,
            verdict.as_str(),
            thinking_block_hash,
            &chain_hash,
            &timestamp.to_rfc3339(),
        );
        let merkle_leaf_index = {
            let (index, _root, _depth, _count) = self.merkle_store.append(agent_id, leaf).await;
            Some(index)
        };

        Ok(Certificate::mint(
            &self.key,
            checkpoint_id,
            agent_id,
            verdict,
            thinking_block_hash,
            input_commitment,
            &chain_hash,
            prev_chain_hash,
            merkle_leaf_index,
            timestamp,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain::InMemoryChainStore;

    fn test_key() -> SigningKeyMaterial {
        let seed = "42".repeat(32);
        SigningKeyMaterial::from_hex_seed(&seed, "key-1").unwrap()
    }

    #[tokio::test]
    async fn attest_checkpoint_produces_a_certificate_with_a_chain_link() {
        let attestor = Attestor::new(test_key(), InMemoryChainStore::new());
        let ts = Utc::now();
        let cert = attestor
            .attest_checkpoint("smolt-1", "smolt-1-0", "ic-1", Verdict::Clear, "thash", "commit", ts)
            .await
            .unwrap();
        assert!(cert.prev_chain_hash.is_none());
        assert_eq!(cert.merkle_leaf_index, Some(0));

        let cert2 = attestor
            .attest_checkpoint("smolt-1", "smolt-1-0", "ic-2", Verdict::Clear, "thash2", "commit2", ts)
            .await
            .unwrap();
        assert_eq!(cert2.prev_chain_hash, Some(cert.chain_hash.clone()));
        assert_eq!(cert2.merkle_leaf_index, Some(1));
    }

    #[tokio::test]
    async fn inclusion_proof_verifies_against_the_stored_tree() {
        let attestor = Attestor::new(test_key(), InMemoryChainStore::new());
        let ts = Utc::now();
        for i in 0..5 {
            attestor
                .attest_checkpoint(
                    "smolt-1",
                    "smolt-1-0",
                    &format!("ic-{}", i),
                    Verdict::Clear,
                    "thash",
                    "commit",
                    ts,
                )
                .await
                .unwrap();
        }
        let tree = attestor.merkle_store.tree_for("smolt-1");
        let guard = tree.lock().await;
        let root = guard.root();
        let leaves = guard.leaves.clone();
        drop(guard);

        for i in 0..leaves.len() {
            let proof = attestor.merkle_store.proof("smolt-1", i).await.unwrap();
            assert!(merkle::verify(&leaves[i], &proof, &root));
        }
    }
}
