use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last reported liveness and load of one download agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub agent_id: String,
    pub last_seen: DateTime<Utc>,
    pub current_downloads: u32,
}
