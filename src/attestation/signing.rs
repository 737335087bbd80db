//! Ed25519 signing over the certificate payload (spec §4.4).
//!
//! The signing key is a process-level secret (spec §5): it is constructed
//! once from configuration and never logged or echoed back in an error
//! message. `verify_strict` is used on the read path, following the
//! weak-key-attack-resistant pattern in `vex-persist`'s audit store.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::error::AttestationError;
use crate::integrity::verdict::Verdict;

/// A loaded Ed25519 signing key plus the `signing_key_id` surfaced alongside
/// every signature for future key rotation.
pub struct SigningKeyMaterial {
    key: SigningKey,
    pub key_id: String,
}

impl SigningKeyMaterial {
    /// Parse a 32-byte hex-encoded seed into a usable signing key.
    pub fn from_hex_seed(hex_seed: &str, key_id: impl Into<String>) -> Result<Self, AttestationError> {
        let bytes = hex::decode(hex_seed).map_err(|_| AttestationError::SigningKeyAbsent)?;
        let seed: [u8; 32] = bytes.try_into().map_err(|_| AttestationError::SigningKeyAbsent)?;
        Ok(SigningKeyMaterial {
            key: SigningKey::from_bytes(&seed),
            key_id: key_id.into(),
        })
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }
}

/// The canonical byte sequence signed for every checkpoint (spec §4.4):
/// `{checkpoint_id, agent_id, verdict, thinking_block_hash, input_commitment,
/// chain_hash, timestamp}`, serialised with sorted keys.
pub fn signing_payload(
    checkpoint_id: &str,
    agent_id: &str,
    verdict: Verdict,
    thinking_block_hash: &str,
    input_commitment: &str,
    chain_hash: &str,
    timestamp: DateTime<Utc>,
) -> Vec<u8> {
    let value = json!({
        "agent_id": agent_id,
        "chain_hash": chain_hash,
        "checkpoint_id": checkpoint_id,
        "input_commitment": input_commitment,
        "thinking_block_hash": thinking_block_hash,
        "timestamp": timestamp.to_rfc3339(),
        "verdict": verdict.as_str(),
    });
    super::commitment::canonicalize(&value).into_bytes()
}

/// Sign the payload and return the base-64 signature.
pub fn sign(key: &SigningKeyMaterial, payload: &[u8]) -> String {
    let signature = key.key.sign(payload);
    BASE64.encode(signature.to_bytes())
}

/// Verify a base-64 signature against a payload and public key.
pub fn verify(verifying_key: &VerifyingKey, payload: &[u8], signature_b64: &str) -> bool {
    let Ok(sig_bytes) = BASE64.decode(signature_b64) else {
        return false;
    };
    let Ok(sig_array): Result<[u8; 64], _> = sig_bytes.try_into() else {
        return false;
    };
    let signature = ed25519_dalek::Signature::from_bytes(&sig_array);
    verifying_key.verify_strict(payload, &signature).is_ok()
}

/// A minted per-checkpoint certificate bundling the fields spec §4.4
/// requires be surfaced with a checkpoint.
#[derive(Debug, Clone)]
pub struct Certificate {
    pub certificate_id: String,
    pub input_commitment: String,
    pub chain_hash: String,
    pub prev_chain_hash: Option<String>,
    pub merkle_leaf_index: Option<usize>,
    pub signature: String,
    pub signing_key_id: String,
}

impl Certificate {
    #[allow(clippy::too_many_arguments)]
    pub fn mint(
        key: &SigningKeyMaterial,
        checkpoint_id: &str,
        agent_id: &str,
        verdict: Verdict,
        thinking_block_hash: &str,
        input_commitment: &str,
        chain_hash: &str,
        prev_chain_hash: Option<String>,
        merkle_leaf_index: Option<usize>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let payload = signing_payload(
            checkpoint_id,
            agent_id,
            verdict,
            thinking_block_hash,
            input_commitment,
            chain_hash,
            timestamp,
        );
        let signature = sign(key, &payload);
        Certificate {
            certificate_id: format!("cert-{}", sha256_hex(&payload)[..12].to_string()),
            input_commitment: input_commitment.to_string(),
            chain_hash: chain_hash.to_string(),
            prev_chain_hash,
            merkle_leaf_index,
            signature,
            signing_key_id: key.key_id.clone(),
        }
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
