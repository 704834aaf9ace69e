//! `dlfleet fetch` – run one job through a local download executor.

use anyhow::{bail, Result};
use chrono::Utc;
use dlfleet_core::agent::{AgentId, DownloadExecutor, ExecutorSettings, JobOutcome};
use dlfleet_core::bus::{Bus, Channel, Consumer, MemoryBus, StartFrom};
use dlfleet_core::config::AgentConfig;
use dlfleet_core::submit::validate_url;
use dlfleet_core::wire::{ProgressEvent, ProgressStatus, QueueEvent};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub async fn run_fetch(cfg: &AgentConfig, url: &str) -> Result<()> {
    let url = validate_url(url)?;
    let bus = MemoryBus::new();
    let mut progress = bus
        .subscribe(Channel::Progress, "dlfleet-fetch", StartFrom::Latest)
        .await?;

    let printer = tokio::spawn(async move {
        while let Ok(Some(msg)) = progress.next().await {
            match serde_json::from_slice::<ProgressEvent>(&msg.payload) {
                Ok(event) => print_progress(&event),
                Err(e) => tracing::warn!("undecodable progress event: {}", e),
            }
        }
    });

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let executor = DownloadExecutor::new(
        AgentId::generate(),
        Arc::new(bus.clone()),
        ExecutorSettings::from(cfg),
    );
    let job = QueueEvent {
        download_id: "local".to_string(),
        url,
        enqueued_at: Utc::now(),
    };
    let outcome = executor.execute(job, cancel).await;

    bus.close();
    let _ = printer.await;

    match outcome {
        JobOutcome::Completed { bytes } => {
            tracing::info!("fetch completed: {} bytes", bytes);
            Ok(())
        }
        JobOutcome::Failed { message } => bail!("download failed: {}", message),
        JobOutcome::Cancelled => bail!("download cancelled"),
    }
}

fn print_progress(event: &ProgressEvent) {
    let done_mib = event.downloaded_bytes as f64 / 1_048_576.0;
    let rate_mib = event.bytes_per_second / 1_048_576.0;
    match (event.status, event.total_bytes) {
        (ProgressStatus::Failed, _) => {
            println!("  failed: {}", event.message.as_deref().unwrap_or("unknown error"));
        }
        (status, Some(total)) if total > 0 => {
            let pct = (100.0 * event.downloaded_bytes as f64 / total as f64).min(100.0);
            println!(
                "  {:?}: {:.1} / {:.1} MiB ({:.1}%)  {:.2} MiB/s",
                status,
                done_mib,
                total as f64 / 1_048_576.0,
                pct,
                rate_mib
            );
        }
        (status, _) => {
            println!("  {:?}: {:.1} MiB  {:.2} MiB/s", status, done_mib, rate_mib);
        }
    }
}
