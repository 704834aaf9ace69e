use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::model::Job;
use crate::wire::ProgressEvent;

/// In-memory map of every job this coordinator has accepted, keyed by
/// download id. Records live for the lifetime of the process.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: DashMap<String, Job>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a newly submitted job. Returns false (and changes nothing) if the
    /// id is already present.
    pub fn insert(&self, job: Job) -> bool {
        match self.jobs.entry(job.download_id.clone()) {
            Entry::Occupied(_) => {
                tracing::debug!(download_id = %job.download_id, "duplicate job id ignored");
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(job);
                true
            }
        }
    }

    pub fn get(&self, download_id: &str) -> Option<Job> {
        self.jobs.get(download_id).map(|r| r.value().clone())
    }

    /// All jobs, most recently enqueued first.
    pub fn list_all(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.iter().map(|r| r.value().clone()).collect();
        jobs.sort_by(|a, b| b.enqueued_at.cmp(&a.enqueued_at));
        jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Merges a progress event into the stored job. Events for ids this
    /// process has never seen (progress racing ahead of submission, or jobs
    /// from before a restart) are dropped; returns whether a record changed.
    pub fn apply_progress(&self, event: &ProgressEvent) -> bool {
        match self.jobs.get_mut(&event.download_id) {
            Some(mut job) => {
                job.apply(event, Utc::now());
                true
            }
            None => {
                tracing::debug!(download_id = %event.download_id, "progress for unknown job dropped");
                false
            }
        }
    }
}
