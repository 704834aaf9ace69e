//! Message bus seam.
//!
//! The transport (partitioning, consumer groups, offset commits) lives
//! outside this crate; the coordinator and agents only see [`Bus`] and
//! [`Consumer`]. [`MemoryBus`] is the in-process implementation used by
//! `dlfleet serve` and the tests.

mod memory;

pub use memory::{MemoryBus, DEFAULT_RETAIN_LIMIT};

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

/// Logical channels carried by the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Job submissions, keyed by download id.
    Queue,
    /// Agent progress reports, keyed by download id.
    Progress,
    /// Agent liveness reports, keyed by agent id.
    Heartbeat,
}

impl Channel {
    /// Topic name on a partitioned broker.
    pub fn topic(self) -> &'static str {
        match self {
            Channel::Queue => "download-queue",
            Channel::Progress => "download-progress",
            Channel::Heartbeat => "agent-heartbeat",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.topic())
    }
}

/// Where a newly created consumer group starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartFrom {
    /// Also receive messages retained before the group existed.
    Earliest,
    /// Only messages published after the group joined.
    Latest,
}

/// One keyed message as delivered to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub key: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// Network or broker hiccup; the caller logs and carries on.
    #[error("transient bus error: {0}")]
    Transient(String),
    /// Payload could not be encoded for publishing.
    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),
    /// The bus has been shut down.
    #[error("bus closed")]
    Closed,
}

/// Ordered, at-least-once, key-partitioned publish/subscribe transport.
#[async_trait]
pub trait Bus: Send + Sync + 'static {
    /// Publishes `payload` on `channel`. Messages with the same key are
    /// delivered in publish order.
    async fn publish(&self, channel: Channel, key: &str, payload: Vec<u8>) -> Result<(), BusError>;

    /// Joins consumer `group` on `channel`. Each message reaches every group
    /// and exactly one live member within a group.
    async fn subscribe(
        &self,
        channel: Channel,
        group: &str,
        start: StartFrom,
    ) -> Result<Box<dyn Consumer>, BusError>;
}

/// Receiving half of a group membership. Dropping it leaves the group.
#[async_trait]
pub trait Consumer: Send {
    /// Next message; `Ok(None)` once the bus is closed.
    async fn next(&mut self) -> Result<Option<BusMessage>, BusError>;
}

/// Serializes `value` as JSON and publishes it keyed by `key`.
pub async fn publish_json<T: Serialize + ?Sized>(
    bus: &dyn Bus,
    channel: Channel,
    key: &str,
    value: &T,
) -> Result<(), BusError> {
    let payload = serde_json::to_vec(value)?;
    bus.publish(channel, key, payload).await
}
