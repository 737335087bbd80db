//! Crate-wide error types.
//!
//! Each subsystem gets its own small, cloneable error enum with a hand
//! written `Display` impl rather than a derive-macro crate — the same
//! shape used throughout this codebase's protocol layers.

use std::fmt;

/// Errors raised while admitting or forwarding a request through the gateway.
#[derive(Debug, Clone)]
pub enum GatewayError {
    /// No provider-shaped credential header was present on the request.
    MissingCredential,
    /// The `/<provider>/*` prefix did not match a known upstream.
    UnknownProvider(String),
    /// The upstream could not be reached at all (connect/timeout failure).
    UpstreamUnavailable(String),
    /// The agent's containment status forbids this request.
    ContainmentActive(String),
    /// The quota decision rejected this request for a billing reason.
    BillingRejected(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::MissingCredential => write!(f, "missing provider credential header"),
            GatewayError::UnknownProvider(p) => write!(f, "unknown provider prefix: {}", p),
            GatewayError::UpstreamUnavailable(msg) => write!(f, "upstream unavailable: {}", msg),
            GatewayError::ContainmentActive(reason) => {
                write!(f, "agent contained: {}", reason)
            }
            GatewayError::BillingRejected(reason) => write!(f, "billing rejected: {}", reason),
        }
    }
}

impl std::error::Error for GatewayError {}

/// Errors raised while running the integrity analysis pipeline.
#[derive(Debug, Clone)]
pub enum IntegrityError {
    /// The analysis model did not respond within its timeout budget.
    AnalysisTimeout,
    /// The analysis model endpoint could not be reached.
    AnalysisUnreachable(String),
    /// The analysis model's reply could not be parsed into a verdict.
    VerdictParseFailed(String),
}

impl fmt::Display for IntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityError::AnalysisTimeout => write!(f, "analysis model call timed out"),
            IntegrityError::AnalysisUnreachable(msg) => {
                write!(f, "analysis model unreachable: {}", msg)
            }
            IntegrityError::VerdictParseFailed(msg) => {
                write!(f, "verdict parse failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for IntegrityError {}

/// Errors raised by the attestation layer (signing, chaining, Merkle append).
#[derive(Debug, Clone)]
pub enum AttestationError {
    /// No Ed25519 signing key was configured.
    SigningKeyAbsent,
    /// This checkpoint lost the race for the next chain slot and was abandoned.
    ChainRaceLost,
    /// An inclusion proof was requested against an empty Merkle tree.
    MerkleEmpty,
    /// An inclusion proof was requested for a leaf index past the end of the tree.
    MerkleIndexOutOfRange(usize),
}

impl fmt::Display for AttestationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttestationError::SigningKeyAbsent => write!(f, "no signing key configured"),
            AttestationError::ChainRaceLost => {
                write!(f, "lost race for next chain slot, checkpoint abandoned")
            }
            AttestationError::MerkleEmpty => write!(f, "merkle tree has no leaves"),
            AttestationError::MerkleIndexOutOfRange(i) => {
                write!(f, "merkle leaf index {} out of range", i)
            }
        }
    }
}

impl std::error::Error for AttestationError {}

/// Errors raised while delivering a webhook.
#[derive(Debug, Clone)]
pub enum WebhookError {
    /// The endpoint URL failed validation (must be HTTPS).
    InvalidEndpointUrl(String),
    /// The HTTP attempt completed but was not a 2xx, or failed outright.
    DeliveryFailed {
        status: Option<u16>,
        message: String,
    },
}

impl fmt::Display for WebhookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebhookError::InvalidEndpointUrl(url) => {
                write!(f, "invalid webhook endpoint url: {}", url)
            }
            WebhookError::DeliveryFailed { status, message } => match status {
                Some(code) => write!(f, "delivery failed with status {}: {}", code, message),
                None => write!(f, "delivery failed: {}", message),
            },
        }
    }
}

impl std::error::Error for WebhookError {}
