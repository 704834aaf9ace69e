//! Job record and its merge rule for incoming progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::wire::{ProgressEvent, ProgressStatus};

/// Lifecycle of a job: Queued -> Downloading -> Completed | Failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Downloading,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl From<ProgressStatus> for JobStatus {
    fn from(status: ProgressStatus) -> Self {
        match status {
            ProgressStatus::Downloading => JobStatus::Downloading,
            ProgressStatus::Completed => JobStatus::Completed,
            ProgressStatus::Failed => JobStatus::Failed,
        }
    }
}

/// Authoritative coordinator view of one submitted URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub download_id: String,
    pub url: String,
    pub status: JobStatus,
    pub enqueued_at: DateTime<Utc>,
    /// Unknown until an agent has seen the response headers.
    pub total_bytes: Option<u64>,
    pub downloaded_bytes: u64,
    pub bytes_per_second: f64,
    pub agent_id: Option<String>,
    pub error_message: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// New job at Queued with zeroed counters.
    pub fn queued(download_id: impl Into<String>, url: impl Into<String>, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            download_id: download_id.into(),
            url: url.into(),
            status: JobStatus::Queued,
            enqueued_at,
            total_bytes: None,
            downloaded_bytes: 0,
            bytes_per_second: 0.0,
            agent_id: None,
            error_message: None,
            completed_at: None,
        }
    }

    /// Percent complete in [0, 100]; 0 while the total size is unknown or zero.
    pub fn percent_complete(&self) -> f64 {
        match self.total_bytes {
            Some(total) if total > 0 => (100.0 * self.downloaded_bytes as f64 / total as f64).min(100.0),
            _ => 0.0,
        }
    }

    /// Merges a progress event into this record.
    ///
    /// Optional fields only override when present in the event; bytes, rate
    /// and status always override. `completed_at` is stamped with `now` on
    /// every terminal event, including redeliveries.
    pub fn apply(&mut self, event: &ProgressEvent, now: DateTime<Utc>) {
        if let Some(total) = event.total_bytes {
            self.total_bytes = Some(total);
        }
        self.downloaded_bytes = event.downloaded_bytes;
        self.bytes_per_second = event.bytes_per_second;
        self.status = event.status.into();
        if !event.agent_id.is_empty() {
            self.agent_id = Some(event.agent_id.clone());
        }
        if let Some(message) = &event.message {
            self.error_message = Some(message.clone());
        }
        if self.status.is_terminal() {
            self.completed_at = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn progress(status: ProgressStatus, total: Option<u64>, done: u64) -> ProgressEvent {
        ProgressEvent {
            download_id: "job-1".into(),
            agent_id: "host-abcd1234".into(),
            total_bytes: total,
            downloaded_bytes: done,
            bytes_per_second: 512.0,
            status,
            message: None,
            timestamp: None,
        }
    }

    #[test]
    fn percent_complete_unknown_total_is_zero() {
        let mut job = Job::queued("job-1", "http://example.com/a", Utc::now());
        job.downloaded_bytes = 300;
        assert_eq!(job.percent_complete(), 0.0);
        job.total_bytes = Some(0);
        assert_eq!(job.percent_complete(), 0.0);
    }

    #[test]
    fn percent_complete_is_capped() {
        let mut job = Job::queued("job-1", "http://example.com/a", Utc::now());
        job.total_bytes = Some(1000);
        job.downloaded_bytes = 250;
        assert!((job.percent_complete() - 25.0).abs() < 1e-9);
        job.downloaded_bytes = 1500;
        assert_eq!(job.percent_complete(), 100.0);
    }

    #[test]
    fn absent_total_keeps_stored_value() {
        let now = Utc::now();
        let mut job = Job::queued("job-1", "http://example.com/a", now);
        job.apply(&progress(ProgressStatus::Downloading, Some(1000), 0), now);
        job.apply(&progress(ProgressStatus::Downloading, None, 400), now);
        assert_eq!(job.total_bytes, Some(1000));
        assert_eq!(job.downloaded_bytes, 400);
        assert_eq!(job.status, JobStatus::Downloading);
        assert_eq!(job.agent_id.as_deref(), Some("host-abcd1234"));
        assert!(job.completed_at.is_none());
    }

    #[test]
    fn failure_resets_bytes_and_keeps_message() {
        let now = Utc::now();
        let mut job = Job::queued("job-1", "http://example.com/a", now);
        job.apply(&progress(ProgressStatus::Downloading, Some(1000), 700), now);
        let mut failed = progress(ProgressStatus::Failed, None, 0);
        failed.message = Some("Timeout was reached".into());
        failed.bytes_per_second = 0.0;
        job.apply(&failed, now);
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.downloaded_bytes, 0);
        assert_eq!(job.total_bytes, Some(1000));
        assert_eq!(job.error_message.as_deref(), Some("Timeout was reached"));
        assert_eq!(job.completed_at, Some(now));
    }

    #[test]
    fn terminal_redelivery_restamps_completed_at() {
        let first = Utc::now();
        let later = first + Duration::seconds(5);
        let mut job = Job::queued("job-1", "http://example.com/a", first);
        let done = progress(ProgressStatus::Completed, Some(10), 10);
        job.apply(&done, first);
        job.apply(&done, later);
        assert_eq!(job.completed_at, Some(later));
        assert_eq!(job.percent_complete(), 100.0);
    }
}
