// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Job dispatcher: schedules and cancels the container that drives a run.
//!
//! One job per run, named after the run id.

use async_trait::async_trait;
use thiserror::Error;

mod kubernetes;
mod mock;

pub use kubernetes::KubernetesJobDispatcher;
pub use mock::{MockJob, MockJobDispatcher};

/// Errors from job dispatcher operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum JobDispatcherError {
    /// The cluster API rejected the request.
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// The job could not be described with the given parameters.
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    /// Other error.
    #[error("Other: {0}")]
    Other(String),
}

/// Result type for job dispatcher operations.
pub type Result<T> = std::result::Result<T, JobDispatcherError>;

/// Everything needed to schedule the job for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    /// Run id, also used as the job name.
    pub run_id: String,
    /// Container image.
    pub image: String,
    /// Entrypoint argv.
    pub command: Vec<String>,
    /// Deadline in seconds after which the job is killed.
    pub max_run_time: u64,
    /// Memory request and limit in bytes.
    pub memory: u64,
    /// Extra container environment.
    pub env: Vec<(String, String)>,
}

/// Submits and cancels containerized jobs.
///
/// Dispatchers only talk to the scheduler. Persisting anything about the run
/// is the caller's job.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    /// Dispatcher type identifier (e.g. "kubernetes", "mock").
    fn dispatcher_type(&self) -> &'static str;

    /// Schedule the job described by `spec`.
    async fn create(&self, spec: &JobSpec) -> Result<()>;

    /// Cancel and reap the job for `run_id`. A missing job is not an error.
    async fn delete(&self, run_id: &str) -> Result<()>;
}
