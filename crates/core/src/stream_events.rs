//! Event names and non-tick payloads used on the progress stream.
//!
//! Shared by the server-side stream session and the client-side consumer so
//! both ends agree on frame names and shapes.

use serde::{Deserialize, Serialize};

use crate::job::JobStatus;
use crate::types::JobId;

/// A single progress tick. The frame data is a JSON `ProgressEvent`.
pub const EVENT_PROGRESS: &str = "progress";

/// Sent instead of ticks when the job was already terminal at subscribe time.
pub const EVENT_STATUS: &str = "status";

/// The observer fell behind and `skipped` ticks were discarded.
pub const EVENT_LAGGED: &str = "lagged";

/// A stream-level failure unrelated to the job itself.
pub const EVENT_ERROR: &str = "error";

/// Data of an [`EVENT_STATUS`] frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusFrame {
    pub task_id: JobId,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Data of an [`EVENT_LAGGED`] frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaggedFrame {
    pub skipped: u64,
}

/// Data of an [`EVENT_ERROR`] frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFrame {
    pub message: String,
}
