//! Periodic liveness + load report for this agent.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::bus::{publish_json, Bus, BusError, Channel};
use crate::wire::HeartbeatEvent;

use super::executor::ActiveDownloads;
use super::AgentId;

/// Sends one heartbeat at startup and then one per interval. A failed send
/// is logged; the schedule is not changed.
pub struct HeartbeatEmitter {
    agent_id: AgentId,
    bus: Arc<dyn Bus>,
    active: ActiveDownloads,
    interval: Duration,
}

impl HeartbeatEmitter {
    pub fn new(agent_id: AgentId, bus: Arc<dyn Bus>, active: ActiveDownloads, interval: Duration) -> Self {
        Self {
            agent_id,
            bus,
            active,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    pub fn heartbeat(&self) -> HeartbeatEvent {
        HeartbeatEvent {
            agent_id: self.agent_id.to_string(),
            last_seen: Utc::now(),
            current_downloads: self.active.current(),
        }
    }

    async fn send(&self) -> Result<(), BusError> {
        let hb = self.heartbeat();
        publish_json(self.bus.as_ref(), Channel::Heartbeat, self.agent_id.as_str(), &hb).await
    }

    /// Runs until `shutdown` is cancelled. No farewell message is sent.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(agent_id = %self.agent_id, interval_secs = self.interval.as_secs_f64(), "heartbeat started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.send().await {
                        tracing::warn!(agent_id = %self.agent_id, error = %e, "heartbeat send failed");
                    }
                }
            }
        }
        tracing::info!(agent_id = %self.agent_id, "heartbeat stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{MemoryBus, StartFrom};

    #[tokio::test(start_paused = true)]
    async fn first_beat_is_immediate_then_periodic() {
        let bus = MemoryBus::new();
        let mut consumer = bus
            .subscribe(Channel::Heartbeat, "coordinator", StartFrom::Latest)
            .await
            .unwrap();
        let active = ActiveDownloads::default();
        let emitter = HeartbeatEmitter::new(
            AgentId::from("node-1"),
            Arc::new(bus.clone()),
            active.clone(),
            Duration::from_secs(30),
        );
        let shutdown = CancellationToken::new();
        let start = tokio::time::Instant::now();
        let task = tokio::spawn(emitter.run(shutdown.clone()));

        let first = consumer.next().await.unwrap().unwrap();
        assert_eq!(first.key, "node-1");
        assert!(start.elapsed() < Duration::from_secs(1));
        let hb: HeartbeatEvent = serde_json::from_slice(&first.payload).unwrap();
        assert_eq!(hb.agent_id, "node-1");
        assert_eq!(hb.current_downloads, 0);

        let _second = consumer.next().await.unwrap().unwrap();
        assert!(start.elapsed() >= Duration::from_secs(30));

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn send_failures_do_not_stop_the_timer() {
        let bus = MemoryBus::new();
        bus.close();
        let emitter = HeartbeatEmitter::new(
            AgentId::from("node-2"),
            Arc::new(bus),
            ActiveDownloads::default(),
            Duration::from_secs(5),
        );
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(emitter.run(shutdown.clone()));
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!task.is_finished());
        shutdown.cancel();
        task.await.unwrap();
    }
}
