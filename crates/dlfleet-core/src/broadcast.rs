//! Live fan-out of progress events to any number of observers.
//!
//! Every subscriber owns an unbounded single-consumer queue. Broadcasting
//! never blocks and never fails: closed queues are skipped and pruned. There
//! is no replay; a subscriber sees only events broadcast after it joined.
//! An observer that stops draining grows its queue without bound until it
//! disconnects.

use dashmap::DashMap;
use futures::Stream;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use crate::wire::ProgressEvent;

#[derive(Debug, Default)]
pub struct BroadcastHub {
    subscribers: DashMap<u64, mpsc::UnboundedSender<ProgressEvent>>,
    next_id: AtomicU64,
}

impl BroadcastHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a new observer. The returned stream yields every event
    /// broadcast from now on; dropping it unsubscribes.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.insert(id, tx);
        tracing::debug!(subscriber = id, "observer subscribed");
        Subscription {
            id,
            rx,
            hub: Arc::clone(self),
        }
    }

    /// Enqueues `event` for every current subscriber.
    pub fn broadcast(&self, event: &ProgressEvent) {
        let mut closed = Vec::new();
        for entry in self.subscribers.iter() {
            if entry.value().send(event.clone()).is_err() {
                closed.push(*entry.key());
            }
        }
        // Removal must happen after the iterator's shard guards are released.
        for id in closed {
            self.subscribers.remove(&id);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn unsubscribe(&self, id: u64) {
        if self.subscribers.remove(&id).is_some() {
            tracing::debug!(subscriber = id, "observer unsubscribed");
        }
    }
}

/// Live sequence of progress events for one observer.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
    hub: Arc<BroadcastHub>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the next event; `None` only if the hub pruned this queue.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }

    /// Events already queued, without waiting.
    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        self.rx.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = ProgressEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::ProgressStatus;
    use futures::StreamExt;

    fn event(n: u64) -> ProgressEvent {
        ProgressEvent {
            download_id: format!("job-{n}"),
            agent_id: "agent".into(),
            total_bytes: None,
            downloaded_bytes: n,
            bytes_per_second: 0.0,
            status: ProgressStatus::Downloading,
            message: None,
            timestamp: None,
        }
    }

    #[tokio::test]
    async fn late_subscriber_sees_no_history() {
        let hub = BroadcastHub::new();
        let mut early = hub.subscribe();
        hub.broadcast(&event(1));
        let mut late = hub.subscribe();
        hub.broadcast(&event(2));
        hub.broadcast(&event(3));

        assert_eq!(early.recv().await.unwrap().downloaded_bytes, 1);
        assert_eq!(early.recv().await.unwrap().downloaded_bytes, 2);
        assert_eq!(early.recv().await.unwrap().downloaded_bytes, 3);
        assert_eq!(late.recv().await.unwrap().downloaded_bytes, 2);
        assert_eq!(late.recv().await.unwrap().downloaded_bytes, 3);
        assert!(late.try_recv().is_none());
    }

    #[tokio::test]
    async fn dropping_subscription_unregisters() {
        let hub = BroadcastHub::new();
        let a = hub.subscribe();
        let _b = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);
        drop(a);
        assert_eq!(hub.subscriber_count(), 1);
        hub.broadcast(&event(1));
    }

    #[tokio::test]
    async fn broadcast_without_subscribers_is_fine() {
        let hub = BroadcastHub::new();
        hub.broadcast(&event(1));
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn slow_observer_buffers_everything() {
        let hub = BroadcastHub::new();
        let sub = hub.subscribe();
        for n in 0..10_000 {
            hub.broadcast(&event(n));
        }
        let got: Vec<u64> = sub.take(10_000).map(|e| e.downloaded_bytes).collect().await;
        assert_eq!(got, (0..10_000).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn concurrent_subscribe_and_broadcast() {
        let hub = BroadcastHub::new();
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let hub = Arc::clone(&hub);
            tasks.push(tokio::spawn(async move {
                for _ in 0..50 {
                    let sub = hub.subscribe();
                    tokio::task::yield_now().await;
                    drop(sub);
                }
            }));
        }
        for n in 0..500 {
            hub.broadcast(&event(n));
            tokio::task::yield_now().await;
        }
        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(hub.subscriber_count(), 0);
    }
}
