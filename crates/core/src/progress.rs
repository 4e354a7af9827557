//! Progress tick wire format.
//!
//! A [`ProgressEvent`] is emitted by the trainer after every epoch and once
//! more, with a terminal status, when the job ends. The same type is
//! published server-side, serialized into stream frames and folded into the
//! client-side history.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::correlation::CorrelationData;

/// Status carried on a tick. Distinct from [`JobStatus`](crate::job::JobStatus):
/// ticks only exist once training has begun.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickStatus {
    Training,
    Completed,
    Error,
}

impl TickStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// Test-set regression metrics of a trained model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub r2: f64,
    pub mae: f64,
    pub mse: f64,
    pub rmse: f64,
}

/// Permutation importance of one feature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    /// Mean increase in test MSE when the feature is shuffled.
    pub importance: f64,
    /// Standard deviation of that increase across repeats.
    pub std: f64,
}

/// One incremental progress report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    #[serde(default)]
    pub epoch: u32,
    #[serde(default)]
    pub loss: f64,
    #[serde(default, alias = "val_loss")]
    pub val_loss: f64,
    #[serde(default)]
    pub mae: f64,
    #[serde(default, alias = "val_mae")]
    pub val_mae: f64,
    pub status: TickStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<TrainingMetrics>,
    #[serde(
        default,
        alias = "feature_importance",
        skip_serializing_if = "Option::is_none"
    )]
    pub feature_importance: Option<BTreeMap<String, FeatureImportance>>,
    #[serde(
        default,
        alias = "correlation_data",
        skip_serializing_if = "Option::is_none"
    )]
    pub correlation_data: Option<CorrelationData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressEvent {
    /// A per-epoch training tick.
    pub fn training(epoch: u32, loss: f64, val_loss: f64, mae: f64, val_mae: f64) -> Self {
        Self {
            epoch,
            loss,
            val_loss,
            mae,
            val_mae,
            status: TickStatus::Training,
            metrics: None,
            feature_importance: None,
            correlation_data: None,
            error: None,
        }
    }

    /// Terminal success tick derived from the last training tick.
    pub fn completed(
        last: &ProgressEvent,
        metrics: TrainingMetrics,
        feature_importance: BTreeMap<String, FeatureImportance>,
        correlation_data: CorrelationData,
    ) -> Self {
        Self {
            status: TickStatus::Completed,
            metrics: Some(metrics),
            feature_importance: Some(feature_importance),
            correlation_data: Some(correlation_data),
            error: None,
            ..last.loss_values()
        }
    }

    /// Terminal failure tick. Loss values are carried over from `last` when
    /// at least one epoch was reported, otherwise they are zero.
    pub fn failed(last: Option<&ProgressEvent>, message: impl Into<String>) -> Self {
        let base = last
            .map(ProgressEvent::loss_values)
            .unwrap_or_else(|| ProgressEvent::training(0, 0.0, 0.0, 0.0, 0.0));
        Self {
            status: TickStatus::Error,
            error: Some(message.into()),
            ..base
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn loss_values(&self) -> ProgressEvent {
        ProgressEvent::training(self.epoch, self.loss, self.val_loss, self.mae, self.val_mae)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
