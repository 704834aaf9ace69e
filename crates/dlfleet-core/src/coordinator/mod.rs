//! Coordinator: owns the registries and the broadcast hub, runs the two
//! ingest loops and serves the HTTP API.

mod http;

pub use http::JobView;

use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::broadcast::BroadcastHub;
use crate::bus::{Bus, BusError, Channel, StartFrom};
use crate::config::CoordinatorConfig;
use crate::ingest::{run_liveness_ingest, run_progress_ingest, IngestStats};
use crate::registry::{AgentRegistry, JobRegistry};
use crate::submit::Submitter;

pub struct Coordinator {
    jobs: Arc<JobRegistry>,
    agents: Arc<AgentRegistry>,
    hub: Arc<BroadcastHub>,
    bus: Arc<dyn Bus>,
    submitter: Submitter,
    cfg: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(bus: Arc<dyn Bus>, cfg: CoordinatorConfig) -> Self {
        let jobs = Arc::new(JobRegistry::new());
        Self {
            submitter: Submitter::new(Arc::clone(&jobs), Arc::clone(&bus)),
            jobs,
            agents: Arc::new(AgentRegistry::new()),
            hub: BroadcastHub::new(),
            bus,
            cfg,
        }
    }

    pub fn jobs(&self) -> &Arc<JobRegistry> {
        &self.jobs
    }

    pub fn agents(&self) -> &Arc<AgentRegistry> {
        &self.agents
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    pub fn submitter(&self) -> &Submitter {
        &self.submitter
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.cfg
    }

    /// Joins the progress and heartbeat groups and spawns both ingest loops.
    /// They stop when `shutdown` fires or the bus closes.
    pub async fn start_ingest(&self, shutdown: CancellationToken) -> Result<JoinSet<IngestStats>, BusError> {
        let progress = self
            .bus
            .subscribe(Channel::Progress, &self.cfg.progress_group, StartFrom::Latest)
            .await?;
        let heartbeats = self
            .bus
            .subscribe(Channel::Heartbeat, &self.cfg.heartbeat_group, StartFrom::Latest)
            .await?;

        let mut loops = JoinSet::new();
        loops.spawn(run_progress_ingest(
            progress,
            Arc::clone(&self.jobs),
            Arc::clone(&self.hub),
            shutdown.clone(),
        ));
        loops.spawn(run_liveness_ingest(heartbeats, Arc::clone(&self.agents), shutdown));
        Ok(loops)
    }

    /// HTTP API over this coordinator's state. Open event streams end when
    /// `shutdown` fires.
    pub fn router(&self, shutdown: CancellationToken) -> axum::Router {
        http::router(http::AppState {
            jobs: Arc::clone(&self.jobs),
            agents: Arc::clone(&self.agents),
            hub: Arc::clone(&self.hub),
            submitter: self.submitter.clone(),
            liveness_window: self.cfg.liveness_window(),
            shutdown,
        })
    }

    /// Serves the HTTP API on `listener` until `shutdown` fires.
    pub async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) -> std::io::Result<()> {
        let router = self.router(shutdown.clone());
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, "coordinator API listening");
        }
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
    }
}
