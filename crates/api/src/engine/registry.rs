//! In-memory job registry.
//!
//! The registry owns job identity and status. Handlers create and read
//! jobs; only the [`JobRunner`](super::runner::JobRunner) moves a job
//! through its lifecycle.

use std::collections::HashMap;

use oilcast_core::error::CoreError;
use oilcast_core::job::{Job, JobStatus};
use oilcast_core::types::JobId;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Process-scoped table of training jobs.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared across the application.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new `pending` job and return a copy of it.
    pub async fn create(&self, dataset_name: impl Into<String>) -> Job {
        let job = Job::new(Uuid::new_v4(), dataset_name);
        self.jobs.write().await.insert(job.id, job.clone());
        tracing::info!(job_id = %job.id, dataset = %job.dataset_name, "Job created");
        job
    }

    pub async fn get(&self, id: JobId) -> Result<Job, CoreError> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound {
                entity: "Job",
                id: id.to_string(),
            })
    }

    /// Move a job to `status`. Illegal transitions leave the job untouched
    /// and are reported as [`CoreError::IllegalTransition`].
    pub async fn set_status(
        &self,
        id: JobId,
        status: JobStatus,
        error: Option<String>,
    ) -> Result<Job, CoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or_else(|| CoreError::NotFound {
            entity: "Job",
            id: id.to_string(),
        })?;

        let from = job.status;
        if let Err(e) = job.transition(status, error) {
            tracing::error!(job_id = %id, %from, to = %status, "Rejected job status transition");
            return Err(e);
        }
        tracing::info!(job_id = %id, %from, to = %status, "Job status changed");
        Ok(job.clone())
    }

    /// All jobs, newest first.
    pub async fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    pub async fn count_by_status(&self, status: JobStatus) -> usize {
        self.jobs
            .read()
            .await
            .values()
            .filter(|j| j.status == status)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn create_returns_pending_job() {
        let registry = JobRegistry::new();

        let job = registry.create("wells.csv").await;

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(registry.get(job.id).await.unwrap(), job);
    }

    #[tokio::test]
    async fn created_ids_are_unique() {
        let registry = JobRegistry::new();

        let a = registry.create("a.csv").await;
        let b = registry.create("b.csv").await;

        assert_ne!(a.id, b.id);
        assert_eq!(registry.list().await.len(), 2);
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let registry = JobRegistry::new();

        assert_matches!(
            registry.get(Uuid::new_v4()).await,
            Err(CoreError::NotFound { entity: "Job", .. })
        );
    }

    #[tokio::test]
    async fn lifecycle_moves_forward() {
        let registry = JobRegistry::new();
        let job = registry.create("wells.csv").await;

        registry.set_status(job.id, JobStatus::Running, None).await.unwrap();
        let done = registry
            .set_status(job.id, JobStatus::Completed, None)
            .await
            .unwrap();

        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.updated_at >= done.created_at);
    }

    #[tokio::test]
    async fn terminal_status_is_never_overwritten() {
        let registry = JobRegistry::new();
        let job = registry.create("wells.csv").await;
        registry
            .set_status(job.id, JobStatus::Failed, Some("unreadable".into()))
            .await
            .unwrap();

        let result = registry.set_status(job.id, JobStatus::Running, None).await;

        assert_matches!(
            result,
            Err(CoreError::IllegalTransition {
                from: JobStatus::Failed,
                to: JobStatus::Running
            })
        );
        let job = registry.get(job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("unreadable"));
    }

    #[tokio::test]
    async fn counts_by_status() {
        let registry = JobRegistry::new();
        let a = registry.create("a.csv").await;
        registry.create("b.csv").await;
        registry.set_status(a.id, JobStatus::Running, None).await.unwrap();

        assert_eq!(registry.count_by_status(JobStatus::Running).await, 1);
        assert_eq!(registry.count_by_status(JobStatus::Pending).await, 1);
    }
}
