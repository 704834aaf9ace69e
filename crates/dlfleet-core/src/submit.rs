//! Job submission: validate the URL, register the job, enqueue it.

use chrono::Utc;
use std::sync::Arc;

use crate::bus::{publish_json, Bus, BusError, Channel};
use crate::model::Job;
use crate::registry::JobRegistry;
use crate::wire::QueueEvent;

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// Missing, unparsable or non-http(s) URL. Nothing was recorded.
    #[error("invalid or missing URL: {0}")]
    InvalidUrl(String),
    /// The job is registered but could not be enqueued.
    #[error("enqueue failed: {0}")]
    Bus(#[from] BusError),
}

/// Trims `raw` and accepts it only as an absolute http or https URL.
pub fn validate_url(raw: &str) -> Result<String, SubmitError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(SubmitError::InvalidUrl("empty".to_string()));
    }
    let parsed = url::Url::parse(trimmed).map_err(|e| SubmitError::InvalidUrl(format!("{trimmed}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(trimmed.to_string()),
        scheme => Err(SubmitError::InvalidUrl(format!("unsupported scheme '{scheme}'"))),
    }
}

/// Accepts download requests on behalf of the coordinator.
#[derive(Clone)]
pub struct Submitter {
    jobs: Arc<JobRegistry>,
    bus: Arc<dyn Bus>,
}

impl Submitter {
    pub fn new(jobs: Arc<JobRegistry>, bus: Arc<dyn Bus>) -> Self {
        Self { jobs, bus }
    }

    /// Registers a Queued job and publishes it on the queue channel, keyed by
    /// its id. Validation failures have no side effects.
    pub async fn submit(&self, raw_url: &str) -> Result<Job, SubmitError> {
        let url = validate_url(raw_url)?;
        let download_id = uuid::Uuid::new_v4().simple().to_string();
        let job = Job::queued(download_id.clone(), url.clone(), Utc::now());
        self.jobs.insert(job.clone());

        let event = QueueEvent {
            download_id: download_id.clone(),
            url,
            enqueued_at: job.enqueued_at,
        };
        publish_json(self.bus.as_ref(), Channel::Queue, &download_id, &event).await?;
        tracing::info!(download_id = %download_id, url = %job.url, "job submitted");
        Ok(job)
    }
}
