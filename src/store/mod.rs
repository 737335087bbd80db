//! Checkpoint Store & Post-hoc Observer (C5, spec §4.5).

pub mod checkpoint;
pub mod observer;

pub use checkpoint::{CheckpointSource, CheckpointStore, InMemoryCheckpointStore, IntegrityCheckpoint};
