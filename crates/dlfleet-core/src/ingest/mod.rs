//! Coordinator consume loops.
//!
//! Each loop owns one consumer handle and runs until the shutdown token is
//! cancelled or the bus closes. Undecodable messages and transport errors
//! are logged and skipped; nothing a message contains can stop a loop.

mod liveness;
mod progress;

pub use liveness::run_liveness_ingest;
pub use progress::run_progress_ingest;

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::bus::{Channel, Consumer};

/// Counters reported when a loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub applied: u64,
    pub malformed: u64,
    pub transport_errors: u64,
}

/// Decodes every message on `consumer` as `T` and hands it to `apply`.
pub async fn consume_json<T, F>(
    channel: Channel,
    mut consumer: Box<dyn Consumer>,
    shutdown: CancellationToken,
    mut apply: F,
) -> IngestStats
where
    T: DeserializeOwned,
    F: FnMut(T),
{
    let mut stats = IngestStats::default();
    tracing::info!(channel = %channel, "ingest loop started");
    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = consumer.next() => next,
        };
        match next {
            Ok(Some(msg)) => match serde_json::from_slice::<T>(&msg.payload) {
                Ok(event) => {
                    apply(event);
                    stats.applied += 1;
                }
                Err(e) => {
                    stats.malformed += 1;
                    tracing::warn!(channel = %channel, key = %msg.key, error = %e, "malformed message dropped");
                }
            },
            Ok(None) => {
                tracing::info!(channel = %channel, "bus closed");
                break;
            }
            Err(e) => {
                stats.transport_errors += 1;
                tracing::warn!(channel = %channel, error = %e, "consume error");
            }
        }
    }
    tracing::info!(
        channel = %channel,
        applied = stats.applied,
        malformed = stats.malformed,
        transport_errors = stats.transport_errors,
        "ingest loop stopped"
    );
    stats
}

#[cfg(test)]
mod tests;
