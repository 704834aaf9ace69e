//! Download executor: turns queued jobs into HTTP transfers and progress
//! events.
//!
//! Every queued job runs as its own task with no concurrency cap. Per job the
//! published sequence is `Downloading(0)`, zero or more periodic
//! `Downloading(n)` reports (at most one per `progress_interval`), then one
//! terminal `Completed` or `Failed`. A failure reports zero bytes whatever was
//! transferred before it. Shutdown cancels transfers without a terminal
//! event.

mod error;
mod fetch;
mod headers;
mod rate;

pub use error::{FailureKind, FetchError};

use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::bus::{publish_json, Bus, Channel, Consumer};
use crate::config::AgentConfig;
use crate::wire::{ProgressEvent, ProgressStatus, QueueEvent};

use self::fetch::TransferUpdate;
use super::AgentId;

/// Transfer tuning for one agent.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// Minimum spacing between periodic progress events.
    pub progress_interval: Duration,
    /// Overall limit for one transfer, headers to last byte.
    pub transfer_timeout: Duration,
    pub connect_timeout: Duration,
    /// Receive buffer size (bytes per read).
    pub buffer_size: usize,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

impl From<&AgentConfig> for ExecutorSettings {
    fn from(cfg: &AgentConfig) -> Self {
        Self {
            progress_interval: Duration::from_millis(cfg.progress_interval_ms),
            transfer_timeout: Duration::from_secs(cfg.transfer_timeout_secs),
            connect_timeout: Duration::from_secs(cfg.connect_timeout_secs),
            buffer_size: cfg.buffer_size,
        }
    }
}

/// Live count of jobs this agent is executing. Clones share the counter.
#[derive(Debug, Clone, Default)]
pub struct ActiveDownloads(Arc<AtomicUsize>);

impl ActiveDownloads {
    pub fn current(&self) -> u32 {
        self.0.load(Ordering::Relaxed) as u32
    }

    fn begin(&self) -> ActiveGuard {
        self.0.fetch_add(1, Ordering::Relaxed);
        ActiveGuard(Arc::clone(&self.0))
    }
}

/// Decrements the active count when the job ends, however it ends.
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// How one job ended, as seen by this agent.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed { bytes: u64 },
    Failed { message: String },
    Cancelled,
}

pub struct DownloadExecutor {
    agent_id: AgentId,
    bus: Arc<dyn Bus>,
    settings: ExecutorSettings,
    active: ActiveDownloads,
}

impl DownloadExecutor {
    pub fn new(agent_id: AgentId, bus: Arc<dyn Bus>, settings: ExecutorSettings) -> Self {
        Self {
            agent_id,
            bus,
            settings,
            active: ActiveDownloads::default(),
        }
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    /// Shared handle to the active-job counter (read by the heartbeat).
    pub fn active(&self) -> ActiveDownloads {
        self.active.clone()
    }

    /// Consumes queued jobs until `shutdown` fires or the bus closes,
    /// spawning one task per job. On shutdown, in-flight transfers are
    /// cancelled and awaited before returning.
    pub async fn run(self: Arc<Self>, mut consumer: Box<dyn Consumer>, shutdown: CancellationToken) {
        let mut running = JoinSet::new();
        tracing::info!(agent_id = %self.agent_id, "download executor started");
        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(joined) = running.join_next() => {
                    if let Err(e) = joined {
                        tracing::error!(agent_id = %self.agent_id, error = %e, "download task panicked");
                    }
                    continue;
                }
                next = consumer.next() => next,
            };
            match next {
                Ok(Some(msg)) => match serde_json::from_slice::<QueueEvent>(&msg.payload) {
                    Ok(job) => {
                        let this = Arc::clone(&self);
                        let cancel = shutdown.child_token();
                        running.spawn(async move {
                            this.execute(job, cancel).await;
                        });
                    }
                    Err(e) => {
                        tracing::warn!(key = %msg.key, error = %e, "malformed queue message dropped");
                    }
                },
                Ok(None) => {
                    tracing::info!(agent_id = %self.agent_id, "queue closed");
                    break;
                }
                Err(e) => tracing::warn!(agent_id = %self.agent_id, error = %e, "consume error"),
            }
        }
        drop(consumer);
        while let Some(joined) = running.join_next().await {
            if let Err(e) = joined {
                tracing::error!(agent_id = %self.agent_id, error = %e, "download task panicked");
            }
        }
        tracing::info!(agent_id = %self.agent_id, "download executor stopped");
    }

    /// Runs one job to its end and publishes its progress.
    pub async fn execute(&self, job: QueueEvent, cancel: CancellationToken) -> JobOutcome {
        let _active = self.active.begin();
        let id = job.download_id.as_str();
        tracing::info!(download_id = %id, url = %job.url, "starting download");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let transfer = tokio::task::spawn_blocking({
            let url = job.url.clone();
            let settings = self.settings.clone();
            let cancel = cancel.clone();
            move || fetch::fetch(&url, &settings, &cancel, tx)
        });

        while let Some(update) = rx.recv().await {
            let event = match update {
                TransferUpdate::Started { total_bytes } => {
                    self.event(id, ProgressStatus::Downloading, total_bytes, 0, 0.0, None)
                }
                TransferUpdate::Progress {
                    total_bytes,
                    downloaded,
                    bytes_per_second,
                } => self.event(
                    id,
                    ProgressStatus::Downloading,
                    total_bytes,
                    downloaded,
                    bytes_per_second,
                    None,
                ),
            };
            self.publish(&event).await;
        }

        let result = match transfer.await {
            Ok(result) => result,
            Err(e) => Err(FetchError::Task(e.to_string())),
        };

        match result {
            Ok(summary) => {
                let total = summary.total_bytes.unwrap_or(summary.downloaded);
                let event = self.event(
                    id,
                    ProgressStatus::Completed,
                    Some(total),
                    summary.downloaded,
                    summary.bytes_per_second,
                    None,
                );
                self.publish(&event).await;
                tracing::info!(download_id = %id, bytes = summary.downloaded, "download completed");
                JobOutcome::Completed {
                    bytes: summary.downloaded,
                }
            }
            Err(FetchError::Cancelled) => {
                tracing::info!(download_id = %id, "download cancelled by shutdown");
                JobOutcome::Cancelled
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(download_id = %id, kind = ?e.kind(), error = %message, "download failed");
                let event = self.event(id, ProgressStatus::Failed, None, 0, 0.0, Some(message.clone()));
                self.publish(&event).await;
                JobOutcome::Failed { message }
            }
        }
    }

    fn event(
        &self,
        download_id: &str,
        status: ProgressStatus,
        total_bytes: Option<u64>,
        downloaded_bytes: u64,
        bytes_per_second: f64,
        message: Option<String>,
    ) -> ProgressEvent {
        ProgressEvent {
            download_id: download_id.to_string(),
            agent_id: self.agent_id.to_string(),
            total_bytes,
            downloaded_bytes,
            bytes_per_second,
            status,
            message,
            timestamp: Some(Utc::now()),
        }
    }

    async fn publish(&self, event: &ProgressEvent) {
        if let Err(e) =
            publish_json(self.bus.as_ref(), Channel::Progress, &event.download_id, event).await
        {
            tracing::warn!(download_id = %event.download_id, status = ?event.status, error = %e, "progress publish failed");
        }
    }
}
