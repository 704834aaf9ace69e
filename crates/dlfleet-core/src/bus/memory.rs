//! In-process consumer-group bus.

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

use super::{Bus, BusError, BusMessage, Channel, Consumer, StartFrom};

/// In-memory [`Bus`] with consumer groups and per-key ordering.
///
/// Within a group, a message is routed to the member at `hash(key) % members`,
/// so all messages of one key reach the same member while membership is
/// stable. A member that leaves hands its undelivered messages back to the
/// group, which is how redelivery after a rebalance shows up here.
///
/// A channel no group has joined yet retains at most `retain_limit`
/// messages (oldest dropped first). Once a group has joined, a group with no
/// live member buffers without limit until a member returns.
#[derive(Clone)]
pub struct MemoryBus {
    state: Arc<Mutex<State>>,
}

/// Default cap on messages retained for a channel with no group.
pub const DEFAULT_RETAIN_LIMIT: usize = 10_000;

#[derive(Default)]
struct State {
    closed: bool,
    next_member: u64,
    retain_limit: usize,
    topics: HashMap<Channel, Topic>,
}

#[derive(Default)]
struct Topic {
    /// Messages published before any group joined.
    retained: VecDeque<BusMessage>,
    groups: HashMap<String, Group>,
}

#[derive(Default)]
struct Group {
    members: Vec<Member>,
    backlog: VecDeque<BusMessage>,
}

struct Member {
    id: u64,
    tx: mpsc::UnboundedSender<BusMessage>,
}

impl Group {
    fn deliver(&mut self, mut msg: BusMessage) {
        loop {
            if self.members.is_empty() {
                self.backlog.push_back(msg);
                return;
            }
            let idx = slot(&msg.key, self.members.len());
            match self.members[idx].tx.send(msg) {
                Ok(()) => return,
                Err(mpsc::error::SendError(returned)) => {
                    self.members.remove(idx);
                    msg = returned;
                }
            }
        }
    }

    fn flush_backlog(&mut self) {
        let pending: Vec<BusMessage> = self.backlog.drain(..).collect();
        for msg in pending {
            self.deliver(msg);
        }
    }
}

fn slot(key: &str, members: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % members as u64) as usize
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::with_retain_limit(DEFAULT_RETAIN_LIMIT)
    }

    /// Bus retaining at most `limit` messages per channel before any group joins.
    pub fn with_retain_limit(limit: usize) -> Self {
        let state = State {
            retain_limit: limit,
            ..State::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Ends every consumer stream and rejects further publishes.
    pub fn close(&self) {
        let mut state = lock(&self.state);
        state.closed = true;
        for topic in state.topics.values_mut() {
            for group in topic.groups.values_mut() {
                group.members.clear();
            }
        }
    }

    /// Number of live members in `group` on `channel`.
    pub fn members(&self, channel: Channel, group: &str) -> usize {
        lock(&self.state)
            .topics
            .get(&channel)
            .and_then(|t| t.groups.get(group))
            .map(|g| g.members.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Bus for MemoryBus {
    async fn publish(&self, channel: Channel, key: &str, payload: Vec<u8>) -> Result<(), BusError> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(BusError::Closed);
        }
        let retain_limit = state.retain_limit;
        let topic = state.topics.entry(channel).or_default();
        let msg = BusMessage {
            key: key.to_string(),
            payload,
        };
        if topic.groups.is_empty() {
            if retain_limit == 0 {
                return Ok(());
            }
            if topic.retained.len() >= retain_limit {
                topic.retained.pop_front();
                tracing::debug!(channel = %channel, limit = retain_limit, "retained buffer full, oldest message dropped");
            }
            topic.retained.push_back(msg);
            return Ok(());
        }
        for group in topic.groups.values_mut() {
            group.deliver(msg.clone());
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        channel: Channel,
        group: &str,
        start: StartFrom,
    ) -> Result<Box<dyn Consumer>, BusError> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(BusError::Closed);
        }
        let id = state.next_member;
        state.next_member += 1;

        let topic = state.topics.entry(channel).or_default();
        let first_group = topic.groups.is_empty();
        let retained = if first_group {
            std::mem::take(&mut topic.retained)
        } else {
            VecDeque::new()
        };
        let entry = topic.groups.entry(group.to_string()).or_default();
        if first_group && start == StartFrom::Earliest {
            entry.backlog.extend(retained);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        entry.members.push(Member { id, tx });
        entry.flush_backlog();
        tracing::debug!(channel = %channel, group, member = id, "consumer joined");

        Ok(Box::new(MemoryConsumer {
            id,
            channel,
            group: group.to_string(),
            rx,
            state: Arc::clone(&self.state),
        }))
    }
}

struct MemoryConsumer {
    id: u64,
    channel: Channel,
    group: String,
    rx: mpsc::UnboundedReceiver<BusMessage>,
    state: Arc<Mutex<State>>,
}

#[async_trait]
impl Consumer for MemoryConsumer {
    async fn next(&mut self) -> Result<Option<BusMessage>, BusError> {
        Ok(self.rx.recv().await)
    }
}

impl Drop for MemoryConsumer {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        let Some(group) = state
            .topics
            .get_mut(&self.channel)
            .and_then(|t| t.groups.get_mut(&self.group))
        else {
            return;
        };
        group.members.retain(|m| m.id != self.id);
        self.rx.close();
        while let Ok(msg) = self.rx.try_recv() {
            group.deliver(msg);
        }
        tracing::debug!(channel = %self.channel, group = %self.group, member = self.id, "consumer left");
    }
}
