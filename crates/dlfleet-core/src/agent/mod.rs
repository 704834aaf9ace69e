//! Worker side: identity, download executor and heartbeat.

mod heartbeat;
mod identity;

pub mod executor;

pub use executor::{ActiveDownloads, DownloadExecutor, ExecutorSettings, JobOutcome};
pub use heartbeat::HeartbeatEmitter;
pub use identity::AgentId;

use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::bus::{Bus, BusError, Channel, StartFrom};
use crate::config::AgentConfig;

/// A started agent: its executor and heartbeat tasks.
pub struct RunningAgent {
    pub agent_id: AgentId,
    pub active: ActiveDownloads,
    tasks: JoinSet<()>,
}

impl RunningAgent {
    /// Waits for both tasks; they end once the shutdown token fires.
    pub async fn wait(mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(agent_id = %self.agent_id, error = %e, "agent task panicked");
            }
        }
    }
}

/// Joins the shared queue group and starts the executor and heartbeat.
pub async fn start_agent(
    bus: Arc<dyn Bus>,
    cfg: &AgentConfig,
    shutdown: CancellationToken,
) -> Result<RunningAgent, BusError> {
    let agent_id = AgentId::generate();
    let consumer = bus
        .subscribe(Channel::Queue, &cfg.queue_group, StartFrom::Earliest)
        .await?;
    let executor = Arc::new(DownloadExecutor::new(
        agent_id.clone(),
        Arc::clone(&bus),
        ExecutorSettings::from(cfg),
    ));
    let active = executor.active();
    let heartbeat = HeartbeatEmitter::new(agent_id.clone(), bus, active.clone(), cfg.heartbeat_interval());

    let mut tasks = JoinSet::new();
    tasks.spawn(executor.run(consumer, shutdown.clone()));
    tasks.spawn(heartbeat.run(shutdown));
    tracing::info!(agent_id = %agent_id, group = %cfg.queue_group, "agent started");

    Ok(RunningAgent {
        agent_id,
        active,
        tasks,
    })
}
