//! Cross-session and cross-agent integration coverage for the attestation
//! hash chain, layered on top of the `Attestor` entry point rather than
//! `ChainWriter` directly (already covered by the in-module unit tests).

use aip_gateway::attestation::chain::InMemoryChainStore;
use aip_gateway::attestation::signing::SigningKeyMaterial;
use aip_gateway::attestation::Attestor;
use aip_gateway::integrity::verdict::Verdict;

fn test_key() -> SigningKeyMaterial {
    SigningKeyMaterial::from_hex_seed(&"ab".repeat(32), "key-chain-tests").unwrap()
}

#[tokio::test]
async fn distinct_sessions_for_the_same_agent_chain_independently() {
    let attestor = Attestor::new(test_key(), InMemoryChainStore::new());
    let ts = chrono::Utc::now();

    let a = attestor
        .attest_checkpoint("smolt-1", "smolt-1-0", "ic-1", Verdict::Clear, "th1", "c1", ts)
        .await
        .unwrap();
    let b = attestor
        .attest_checkpoint("smolt-1", "smolt-1-1", "ic-2", Verdict::Clear, "th2", "c2", ts)
        .await
        .unwrap();

    assert!(a.prev_chain_hash.is_none());
    assert!(b.prev_chain_hash.is_none());
    assert_ne!(a.chain_hash, b.chain_hash);
}

#[tokio::test]
async fn distinct_agents_never_share_a_chain_or_a_merkle_tree() {
    let attestor = Attestor::new(test_key(), InMemoryChainStore::new());
    let ts = chrono::Utc::now();

    let a1 = attestor
        .attest_checkpoint("smolt-a", "smolt-a-0", "ic-1", Verdict::Clear, "th", "c", ts)
        .await
        .unwrap();
    let b1 = attestor
        .attest_checkpoint("smolt-b", "smolt-b-0", "ic-1", Verdict::Clear, "th", "c", ts)
        .await
        .unwrap();

    assert!(a1.prev_chain_hash.is_none());
    assert!(b1.prev_chain_hash.is_none());
    assert_eq!(a1.merkle_leaf_index, Some(0));
    assert_eq!(b1.merkle_leaf_index, Some(0));
}

#[tokio::test]
async fn a_boundary_violation_checkpoint_still_links_into_the_chain() {
    let attestor = Attestor::new(test_key(), InMemoryChainStore::new());
    let ts = chrono::Utc::now();

    let clear = attestor
        .attest_checkpoint("smolt-1", "smolt-1-0", "ic-1", Verdict::Clear, "th1", "c1", ts)
        .await
        .unwrap();
    let violation = attestor
        .attest_checkpoint(
            "smolt-1",
            "smolt-1-0",
            "ic-2",
            Verdict::BoundaryViolation,
            "th2",
            "c2",
            ts,
        )
        .await
        .unwrap();

    assert_eq!(violation.prev_chain_hash, Some(clear.chain_hash));
    assert_eq!(violation.merkle_leaf_index, Some(1));
}
