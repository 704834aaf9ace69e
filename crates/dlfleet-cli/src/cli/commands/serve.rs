//! `dlfleet serve` – coordinator plus in-process agents over the memory bus.

use anyhow::{Context, Result};
use dlfleet_core::agent::start_agent;
use dlfleet_core::bus::{Bus, MemoryBus};
use dlfleet_core::config::FleetConfig;
use dlfleet_core::coordinator::Coordinator;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub async fn run_serve(cfg: &FleetConfig, listen: Option<String>, agents: usize) -> Result<()> {
    let mut coordinator_cfg = cfg.coordinator.clone();
    if let Some(addr) = listen {
        coordinator_cfg.listen_addr = addr;
    }

    let bus: Arc<dyn Bus> = Arc::new(MemoryBus::new());
    let shutdown = CancellationToken::new();

    let coordinator = Coordinator::new(Arc::clone(&bus), coordinator_cfg);
    let mut ingest = coordinator.start_ingest(shutdown.clone()).await?;

    let mut running = Vec::with_capacity(agents);
    for _ in 0..agents {
        running.push(start_agent(Arc::clone(&bus), &cfg.agent, shutdown.clone()).await?);
    }

    let addr = coordinator.config().listen_addr.clone();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {}", addr))?;
    println!("dlfleet coordinator listening on http://{} with {} agent(s)", addr, agents);

    let on_ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Ctrl-C received, shutting down");
                on_ctrl_c.cancel();
            }
            Err(e) => tracing::error!("cannot listen for Ctrl-C: {}", e),
        }
    });

    let served = coordinator.serve(listener, shutdown.clone()).await;
    shutdown.cancel();

    futures::future::join_all(running.into_iter().map(|agent| agent.wait())).await;
    while let Some(joined) = ingest.join_next().await {
        match joined {
            Ok(stats) => tracing::info!(
                applied = stats.applied,
                malformed = stats.malformed,
                transport_errors = stats.transport_errors,
                "ingest loop stopped"
            ),
            Err(e) => tracing::error!("ingest loop panicked: {}", e),
        }
    }

    served.context("coordinator API")?;
    Ok(())
}
