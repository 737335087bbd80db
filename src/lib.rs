// src/lib.rs

//! `aip-gateway`: a transparent integrity proxy for LLM inference.
//!
//! A provider-shaped reverse proxy sits in front of Anthropic/OpenAI/Gemini,
//! extracts each response's reasoning ("thinking") blocks, runs them through
//! an alignment-analysis pipeline, and emits signed, hash-chained integrity
//! checkpoints plus HMAC-signed webhook events. See [`gateway`] for the
//! entry point that wires every other module together.

pub mod agent;
pub mod attestation;
pub mod background;
pub mod config;
pub mod enforcement;
pub mod error;
pub mod gateway;
pub mod identifiers;
pub mod integrity;
pub mod providers;
pub mod quota;
pub mod session;
pub mod store;
pub mod webhook;

pub use gateway::{router, GatewayState};
