//! Per-agent Merkle accumulator with O(log N) inclusion proofs (spec §3, §4.4).
//!
//! **Preserved compatibility decision** (spec §9 ambiguity): node hashing
//! concatenates the two sibling hex strings as ASCII text and hashes the
//! resulting bytes — it does *not* hex-decode the siblings to raw bytes
//! first. This is the documented-as-unusual convention of the original
//! project; it is kept exactly so that inclusion proofs stay verifiable
//! against already-issued certificates. See DESIGN.md.

use sha2::{Digest, Sha256};

use crate::error::AttestationError;

/// SHA-256 over the hex-string concatenation `left || right` (ASCII bytes
/// of the hex text, not the decoded binary — see module docs).
fn node_hash(left: &str, right: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// SHA-256 of `checkpoint_id | verdict | thinking_block_hash | chain_hash | timestamp`.
pub fn leaf_hash(
    checkpoint_id: &str,
    verdict: &str,
    thinking_block_hash: &str,
    chain_hash: &str,
    timestamp: &str,
) -> String {
    let canonical = format!(
        "{}|{}|{}|{}|{}",
        checkpoint_id, verdict, thinking_block_hash, chain_hash, timestamp
    );
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Left,
    Right,
}

#[derive(Debug, Clone)]
pub struct ProofStep {
    pub sibling: String,
    pub position: Position,
}

/// `{root, depth, leaf_count, leaves}` — persisted via idempotent upsert
/// by the caller; this type is the pure, recomputable-from-leaves value.
#[derive(Debug, Clone, Default)]
pub struct MerkleAccumulator {
    pub leaves: Vec<String>,
}

impl MerkleAccumulator {
    pub fn new() -> Self {
        MerkleAccumulator::default()
    }

    pub fn append(&mut self, leaf: String) {
        self.leaves.push(leaf);
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// `ceil(log2(leaf_count))`, `0` for an empty or single-leaf tree.
    pub fn depth(&self) -> u32 {
        let n = self.leaves.len();
        if n <= 1 {
            0
        } else {
            (usize::BITS - (n - 1).leading_zeros()) as u32
        }
    }

    /// Empty string for a zero-leaf tree (spec §8 boundary behaviour); the
    /// single leaf itself for a one-leaf tree; otherwise the recursively
    /// computed root, duplicating the odd node at each level before pairing.
    pub fn root(&self) -> String {
        if self.leaves.is_empty() {
            return String::new();
        }
        let mut level = self.leaves.clone();
        while level.len() > 1 {
            level = pair_level(&level);
        }
        level.into_iter().next().unwrap_or_default()
    }

    /// Walk levels bottom-up: at each level, if `i` is even the sibling is
    /// `i+1` with position `right`; otherwise `i-1` with position `left`.
    /// The odd trailing element of a level is duplicated *before* sibling
    /// selection, matching [`MerkleAccumulator::root`]'s folding.
    pub fn proof(&self, index: usize) -> Result<Vec<ProofStep>, AttestationError> {
        if self.leaves.is_empty() {
            return Err(AttestationError::MerkleEmpty);
        }
        if index >= self.leaves.len() {
            return Err(AttestationError::MerkleIndexOutOfRange(index));
        }

        let mut proof = Vec::new();
        let mut level = self.leaves.clone();
        let mut i = index;

        while level.len() > 1 {
            let padded = pad_odd(&level);
            if i % 2 == 0 {
                proof.push(ProofStep {
                    sibling: padded[i + 1].clone(),
                    position: Position::Right,
                });
            } else {
                proof.push(ProofStep {
                    sibling: padded[i - 1].clone(),
                    position: Position::Left,
                });
            }
            level = pair_level(&level);
            i /= 2;
        }

        Ok(proof)
    }
}

/// Duplicate the last element of `level` if its length is odd.
fn pad_odd(level: &[String]) -> Vec<String> {
    let mut padded = level.to_vec();
    if padded.len() % 2 == 1 {
        let last = padded.last().unwrap().clone();
        padded.push(last);
    }
    padded
}

/// Pair up one level into the next, applying the odd-duplication rule.
fn pair_level(level: &[String]) -> Vec<String> {
    let padded = pad_odd(level);
    padded
        .chunks(2)
        .map(|pair| node_hash(&pair[0], &pair[1]))
        .collect()
}

/// Fold `leaf` with each proof step in order and compare to `root`.
pub fn verify(leaf: &str, proof: &[ProofStep], root: &str) -> bool {
    let mut running = leaf.to_string();
    for step in proof {
        running = match step.position {
            Position::Right => node_hash(&running, &step.sibling),
            Position::Left => node_hash(&step.sibling, &running),
        };
    }
    running == root
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tree_has_empty_root_and_zero_depth() {
        let acc = MerkleAccumulator::new();
        assert_eq!(acc.root(), "");
        assert_eq!(acc.depth(), 0);
    }

    #[test]
    fn empty_tree_proof_is_an_error() {
        let acc = MerkleAccumulator::new();
        assert!(matches!(acc.proof(0), Err(AttestationError::MerkleEmpty)));
    }

    #[test]
    fn single_leaf_tree_root_equals_the_leaf_with_zero_siblings() {
        let mut acc = MerkleAccumulator::new();
        acc.append("h1".to_string());
        assert_eq!(acc.root(), "h1");
        let proof = acc.proof(0).unwrap();
        assert!(proof.is_empty());
        assert!(verify("h1", &proof, &acc.root()));
    }

    #[test]
    fn three_leaf_worked_example_from_spec() {
        // Leaves [h1, h2, h3] (odd-fringe). Level 1: pair (h1,h2) -> A;
        // duplicate h3 -> pair (h3,h3) -> B. Level 2 [A,B] pairs once ->
        // root = node(A,B). Proof for leaf 0 (h1): [(h2,right), (B,right)].
        let mut acc = MerkleAccumulator::new();
        acc.append("h1".to_string());
        acc.append("h2".to_string());
        acc.append("h3".to_string());

        let a = node_hash("h1", "h2");
        let b = node_hash("h3", "h3");
        let root = node_hash(&a, &b);
        assert_eq!(acc.root(), root);

        let proof = acc.proof(0).unwrap();
        assert_eq!(proof.len(), 2);
        assert_eq!(proof[0].sibling, "h2");
        assert_eq!(proof[0].position, Position::Right);
        assert_eq!(proof[1].sibling, b);
        assert_eq!(proof[1].position, Position::Right);
        assert!(verify("h1", &proof, &acc.root()));
    }

    #[test]
    fn every_leaf_in_random_sequences_verifies() {
        for n in [1usize, 2, 3, 5, 8, 13, 64, 200, 1024] {
            let mut acc = MerkleAccumulator::new();
            for i in 0..n {
                acc.append(leaf_hash(&format!("ic-{}", i), "clear", "th", "ch", "ts"));
            }
            let root = acc.root();
            for i in 0..n {
                let proof = acc.proof(i).unwrap();
                assert!(verify(&acc.leaves[i], &proof, &root), "leaf {} of {} failed", i, n);
            }
        }
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let mut acc = MerkleAccumulator::new();
        acc.append("h1".to_string());
        assert!(matches!(acc.proof(5), Err(AttestationError::MerkleIndexOutOfRange(5))));
    }

    #[test]
    fn node_hash_concatenates_hex_text_not_decoded_bytes() {
        // Guards the preserved-compatibility convention: hashing "h1h2" as
        // ASCII must differ from hashing the decoded bytes of "h1"+"h2"
        // (which wouldn't even be valid hex here, but the point is we
        // never attempt hex-decoding at all).
        let direct = node_hash("aa", "bb");
        let mut hasher = Sha256::new();
        hasher.update(b"aabb");
        let expected = format!("{:x}", hasher.finalize());
        assert_eq!(direct, expected);
    }
}
