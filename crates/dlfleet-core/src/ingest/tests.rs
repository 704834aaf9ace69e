//! Consume-loop tests against the in-memory bus and a scripted consumer.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::broadcast::BroadcastHub;
use crate::bus::{Bus, BusError, BusMessage, MemoryBus, StartFrom};
use crate::model::{Job, JobStatus};
use crate::registry::{AgentRegistry, JobRegistry, DEFAULT_LIVENESS_WINDOW};
use crate::wire::{HeartbeatEvent, ProgressEvent, ProgressStatus};

/// Replays a fixed script, then reports the bus as closed.
struct Scripted(VecDeque<Result<BusMessage, BusError>>);

#[async_trait]
impl Consumer for Scripted {
    async fn next(&mut self) -> Result<Option<BusMessage>, BusError> {
        match self.0.pop_front() {
            Some(Ok(msg)) => Ok(Some(msg)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

fn msg<T: serde::Serialize>(key: &str, value: &T) -> Result<BusMessage, BusError> {
    Ok(BusMessage {
        key: key.to_string(),
        payload: serde_json::to_vec(value).unwrap(),
    })
}

fn progress(id: &str, status: ProgressStatus, done: u64) -> ProgressEvent {
    ProgressEvent {
        download_id: id.into(),
        agent_id: "agent-1".into(),
        total_bytes: Some(1000),
        downloaded_bytes: done,
        bytes_per_second: 100.0,
        status,
        message: None,
        timestamp: Some(Utc::now()),
    }
}

#[tokio::test]
async fn progress_loop_survives_garbage_and_transport_errors() {
    let jobs = Arc::new(JobRegistry::new());
    jobs.insert(Job::queued("a", "http://example.com/a", Utc::now()));
    let hub = BroadcastHub::new();
    let mut observer = hub.subscribe();

    let script = Scripted(VecDeque::from(vec![
        Ok(BusMessage {
            key: "a".into(),
            payload: b"{not json".to_vec(),
        }),
        Err(BusError::Transient("broker unavailable".into())),
        msg("a", &progress("a", ProgressStatus::Downloading, 500)),
        msg("a", &progress("a", ProgressStatus::Completed, 1000)),
    ]));

    let stats = run_progress_ingest(
        Box::new(script),
        Arc::clone(&jobs),
        Arc::clone(&hub),
        CancellationToken::new(),
    )
    .await;

    assert_eq!(
        stats,
        IngestStats {
            applied: 2,
            malformed: 1,
            transport_errors: 1
        }
    );
    let job = jobs.get("a").unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.downloaded_bytes, 1000);
    assert_eq!(observer.recv().await.unwrap().downloaded_bytes, 500);
    assert_eq!(observer.recv().await.unwrap().status, ProgressStatus::Completed);
}

#[tokio::test]
async fn unknown_job_is_still_broadcast_but_not_stored() {
    let jobs = Arc::new(JobRegistry::new());
    let hub = BroadcastHub::new();
    let mut observer = hub.subscribe();
    let script = Scripted(VecDeque::from(vec![msg(
        "ghost",
        &progress("ghost", ProgressStatus::Downloading, 1),
    )]));

    run_progress_ingest(Box::new(script), Arc::clone(&jobs), hub, CancellationToken::new()).await;

    assert!(jobs.is_empty());
    assert_eq!(observer.recv().await.unwrap().download_id, "ghost");
}

#[tokio::test]
async fn registry_is_updated_before_broadcast() {
    let jobs = Arc::new(JobRegistry::new());
    jobs.insert(Job::queued("a", "http://example.com/a", Utc::now()));
    let hub = BroadcastHub::new();
    let mut observer = hub.subscribe();
    let bus = MemoryBus::new();
    let consumer = bus
        .subscribe(Channel::Progress, "coordinator", StartFrom::Latest)
        .await
        .unwrap();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(run_progress_ingest(
        consumer,
        Arc::clone(&jobs),
        Arc::clone(&hub),
        shutdown.clone(),
    ));

    for done in [100u64, 200, 300] {
        let payload = serde_json::to_vec(&progress("a", ProgressStatus::Downloading, done)).unwrap();
        bus.publish(Channel::Progress, "a", payload).await.unwrap();
    }
    for _ in 0..3 {
        let seen = observer.recv().await.unwrap();
        assert!(jobs.get("a").unwrap().downloaded_bytes >= seen.downloaded_bytes);
    }

    shutdown.cancel();
    let stats = task.await.unwrap();
    assert_eq!(stats.applied, 3);
}

#[tokio::test]
async fn liveness_loop_upserts_and_stops_on_cancel() {
    let agents = Arc::new(AgentRegistry::new());
    let bus = MemoryBus::new();
    let consumer = bus
        .subscribe(Channel::Heartbeat, "coordinator-agents", StartFrom::Latest)
        .await
        .unwrap();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(run_liveness_ingest(consumer, Arc::clone(&agents), shutdown.clone()));

    let hb = HeartbeatEvent {
        agent_id: "node-a".into(),
        last_seen: Utc::now(),
        current_downloads: 2,
    };
    bus.publish(Channel::Heartbeat, "node-a", serde_json::to_vec(&hb).unwrap())
        .await
        .unwrap();
    bus.publish(Channel::Heartbeat, "node-a", b"[]".to_vec()).await.unwrap();

    for _ in 0..100 {
        if !agents.is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    shutdown.cancel();
    let stats = task.await.unwrap();

    let listed = agents.list_available(DEFAULT_LIVENESS_WINDOW);
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].current_downloads, 2);
    assert_eq!(stats.applied, 1);
    assert_eq!(bus.members(Channel::Heartbeat, "coordinator-agents"), 0);
}
