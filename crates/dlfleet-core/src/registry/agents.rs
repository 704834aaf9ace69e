use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::time::Duration;

use crate::model::Agent;

/// Heartbeat age beyond which an agent is no longer listed as available.
pub const DEFAULT_LIVENESS_WINDOW: Duration = Duration::from_secs(120);

/// Latest heartbeat per agent. Availability is decided when listing; nothing
/// is ever marked dead or removed.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: DashMap<String, Agent>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole record for `agent_id`.
    pub fn upsert(&self, agent_id: &str, last_seen: DateTime<Utc>, current_downloads: u32) {
        self.agents.insert(
            agent_id.to_string(),
            Agent {
                agent_id: agent_id.to_string(),
                last_seen,
                current_downloads,
            },
        );
    }

    /// Agents seen within `max_age` of now, sorted by id.
    pub fn list_available(&self, max_age: Duration) -> Vec<Agent> {
        self.list_available_at(Utc::now(), max_age)
    }

    /// Agents with `last_seen >= now - max_age`, sorted by id.
    pub fn list_available_at(&self, now: DateTime<Utc>, max_age: Duration) -> Vec<Agent> {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let cutoff = now.checked_sub_signed(max_age).unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut agents: Vec<Agent> = self
            .agents
            .iter()
            .filter(|r| r.value().last_seen >= cutoff)
            .map(|r| r.value().clone())
            .collect();
        agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        agents
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
