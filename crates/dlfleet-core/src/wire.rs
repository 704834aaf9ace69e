//! JSON messages carried on the bus channels.
//!
//! Field names are lowerCamelCase on the wire. Every message is keyed by the
//! id of the entity it describes (`download_id` or `agent_id`), which is what
//! gives per-job and per-agent ordering on a partitioned transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Published on the queue channel when a job is submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEvent {
    pub download_id: String,
    pub url: String,
    pub enqueued_at: DateTime<Utc>,
}

/// Status values an agent may report for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressStatus {
    Downloading,
    Completed,
    Failed,
}

/// Point-in-time progress report for one job, produced by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub download_id: String,
    pub agent_id: String,
    #[serde(default)]
    pub total_bytes: Option<u64>,
    pub downloaded_bytes: u64,
    pub bytes_per_second: f64,
    pub status: ProgressStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Periodic liveness and load report from one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatEvent {
    pub agent_id: String,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub current_downloads: u32,
}
