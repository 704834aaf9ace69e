//! Coordinator registries of jobs and agents.
//!
//! Both are sharded concurrent maps: each mutation replaces or merges a
//! single key under that key's shard lock, so readers never observe a
//! half-applied update and no cross-key transaction is needed.

mod agents;
mod jobs;

pub use agents::{AgentRegistry, DEFAULT_LIVENESS_WINDOW};
pub use jobs::JobRegistry;
