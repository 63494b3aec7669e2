// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock dispatcher for testing.
//!
//! Records every job it is asked to create without scheduling anything.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{JobDispatcher, JobDispatcherError, JobSpec, Result};

/// A job recorded by [`MockJobDispatcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockJob {
    /// The [`JobSpec`] the job was created with.
    pub spec: JobSpec,
    /// True once the job was deleted.
    pub deleted: bool,
}

/// Mock dispatcher for testing.
#[derive(Debug, Clone, Default)]
pub struct MockJobDispatcher {
    jobs: Arc<Mutex<HashMap<String, MockJob>>>,
    /// If true, `create` fails.
    pub fail_create: bool,
    /// If true, `delete` fails.
    pub fail_delete: bool,
}

impl MockJobDispatcher {
    /// Create a dispatcher that accepts every job.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a dispatcher whose `create` and `delete` always fail.
    pub fn failing() -> Self {
        Self {
            fail_create: true,
            fail_delete: true,
            ..Self::default()
        }
    }

    /// Create a dispatcher that accepts jobs but fails to delete them.
    pub fn failing_delete() -> Self {
        Self {
            fail_delete: true,
            ..Self::default()
        }
    }

    /// The job recorded for `run_id`, if any.
    pub async fn job(&self, run_id: &str) -> Option<MockJob> {
        self.jobs.lock().await.get(run_id).cloned()
    }

    /// Number of jobs ever created.
    pub async fn job_count(&self) -> usize {
        self.jobs.lock().await.len()
    }
}

#[async_trait]
impl JobDispatcher for MockJobDispatcher {
    fn dispatcher_type(&self) -> &'static str {
        "mock"
    }

    async fn create(&self, spec: &JobSpec) -> Result<()> {
        if self.fail_create {
            return Err(JobDispatcherError::Other("Mock failure".to_string()));
        }
        let mut jobs = self.jobs.lock().await;
        if jobs.get(&spec.run_id).is_some_and(|j| !j.deleted) {
            return Err(JobDispatcherError::Other(format!(
                "job {} already exists",
                spec.run_id
            )));
        }
        jobs.insert(
            spec.run_id.clone(),
            MockJob {
                spec: spec.clone(),
                deleted: false,
            },
        );
        Ok(())
    }

    async fn delete(&self, run_id: &str) -> Result<()> {
        if self.fail_delete {
            return Err(JobDispatcherError::Other("Mock failure".to_string()));
        }
        if let Some(job) = self.jobs.lock().await.get_mut(run_id) {
            job.deleted = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(run_id: &str) -> JobSpec {
        JobSpec {
            run_id: run_id.to_string(),
            image: "image".to_string(),
            command: vec!["/bin/wrapper".to_string(), run_id.to_string()],
            max_run_time: 60,
            memory: 1024,
            env: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_mock_dispatcher_records_jobs() {
        let dispatcher = MockJobDispatcher::new();
        dispatcher.create(&spec("a")).await.unwrap();

        let job = dispatcher.job("a").await.unwrap();
        assert_eq!(job.spec.command[1], "a");
        assert!(!job.deleted);
        assert_eq!(dispatcher.job_count().await, 1);
    }

    #[tokio::test]
    async fn test_mock_dispatcher_rejects_duplicate() {
        let dispatcher = MockJobDispatcher::new();
        dispatcher.create(&spec("a")).await.unwrap();
        assert!(dispatcher.create(&spec("a")).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_dispatcher_delete_missing_is_ok() {
        let dispatcher = MockJobDispatcher::new();
        dispatcher.delete("ghost").await.unwrap();

        dispatcher.create(&spec("a")).await.unwrap();
        dispatcher.delete("a").await.unwrap();
        assert!(dispatcher.job("a").await.unwrap().deleted);
    }

    #[tokio::test]
    async fn test_mock_dispatcher_failing() {
        let dispatcher = MockJobDispatcher::failing();
        assert!(dispatcher.create(&spec("a")).await.is_err());
        assert!(dispatcher.delete("a").await.is_err());
    }
}
