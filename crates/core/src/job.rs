//! Training job record and its status state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{JobId, Timestamp};

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a training job.
///
/// Transitions only move forward:
///
/// ```text
/// pending ──► running ──► completed
///    │           │
///    └───────────┴──────► failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// `completed` and `failed` are never left once entered.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Failed)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A single training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    /// Original filename of the uploaded dataset, or the default dataset name.
    pub dataset_name: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Human-readable failure message, set only when `status` is `failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    /// A fresh job in `pending` status.
    pub fn new(id: JobId, dataset_name: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            id,
            status: JobStatus::Pending,
            dataset_name: dataset_name.into(),
            created_at: now,
            updated_at: now,
            error: None,
        }
    }

    /// Apply a status transition, rejecting anything that would move a job
    /// backwards or out of a terminal state.
    pub fn transition(&mut self, next: JobStatus, error: Option<String>) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::IllegalTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = chrono::Utc::now();
        if next == JobStatus::Failed {
            self.error = error;
        }
        Ok(())
    }
}

/// Response body of a successful start-training request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedJob {
    pub task_id: JobId,
    /// Always `"started"`.
    pub status: String,
    pub message: String,
}

impl StartedJob {
    pub fn new(task_id: JobId) -> Self {
        Self {
            task_id,
            status: "started".to_string(),
            message: "Training started successfully".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
