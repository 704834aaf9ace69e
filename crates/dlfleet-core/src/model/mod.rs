//! Coordinator-side records: jobs and agents.

mod agent;
mod job;

pub use agent::Agent;
pub use job::{Job, JobStatus};
