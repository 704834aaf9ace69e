use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::bus::{Channel, Consumer};
use crate::registry::AgentRegistry;
use crate::wire::HeartbeatEvent;

use super::{consume_json, IngestStats};

/// Replaces the agent record on every heartbeat.
pub async fn run_liveness_ingest(
    consumer: Box<dyn Consumer>,
    agents: Arc<AgentRegistry>,
    shutdown: CancellationToken,
) -> IngestStats {
    consume_json(Channel::Heartbeat, consumer, shutdown, |hb: HeartbeatEvent| {
        agents.upsert(&hb.agent_id, hb.last_seen, hb.current_downloads);
    })
    .await
}
