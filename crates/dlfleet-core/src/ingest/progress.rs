use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::broadcast::BroadcastHub;
use crate::bus::{Channel, Consumer};
use crate::registry::JobRegistry;
use crate::wire::ProgressEvent;

use super::{consume_json, IngestStats};

/// Applies progress events to the job registry, then forwards each one to
/// live observers. The registry is updated first so an observer that
/// re-fetches after an event sees state at least as new as the event.
pub async fn run_progress_ingest(
    consumer: Box<dyn Consumer>,
    jobs: Arc<JobRegistry>,
    hub: Arc<BroadcastHub>,
    shutdown: CancellationToken,
) -> IngestStats {
    consume_json(Channel::Progress, consumer, shutdown, |event: ProgressEvent| {
        jobs.apply_progress(&event);
        hub.broadcast(&event);
    })
    .await
}
