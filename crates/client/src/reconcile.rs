//! Folds the tick stream of one job into an ordered, deduplicated history.
//!
//! Frames can arrive duplicated or out of order (reconnects, lag recovery),
//! so nothing here assumes append-only delivery.

use oilcast_core::correlation::CorrelationData;
use oilcast_core::progress::{ProgressEvent, TickStatus, TrainingMetrics};

use crate::snapshot::Snapshot;

/// Ticks keyed by epoch, ascending, one entry per epoch.
pub type ProgressHistory = Vec<ProgressEvent>;

/// Merge `tick` into `history`.
///
/// An existing entry with the same epoch is replaced in place; otherwise the
/// tick is inserted at its sorted position. Merging the same tick twice
/// yields the same history.
pub fn merge(mut history: ProgressHistory, tick: ProgressEvent) -> ProgressHistory {
    match history.binary_search_by_key(&tick.epoch, |t| t.epoch) {
        Ok(pos) => history[pos] = tick,
        Err(pos) => history.insert(pos, tick),
    }
    history
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ReconcileError {
    /// A tick arrived after the job already reported a terminal status.
    #[error("Tick for epoch {epoch} arrived after terminal status '{terminal:?}'")]
    AfterTerminal { epoch: u32, terminal: TickStatus },
}

/// Client-side view of a single job's progress.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    history: ProgressHistory,
    correlation: Option<CorrelationData>,
    final_metrics: Option<TrainingMetrics>,
    terminal: Option<TickStatus>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from a persisted snapshot. The terminal status is not stored,
    /// so a snapshot with final metrics is treated as completed.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let terminal = snapshot.final_metrics.map(|_| TickStatus::Completed);
        Self {
            history: snapshot.progress_history,
            correlation: snapshot.correlation_data,
            final_metrics: snapshot.final_metrics,
            terminal,
        }
    }

    /// Fold one tick in. Ticks after a terminal tick are rejected and leave
    /// the state untouched.
    pub fn apply(&mut self, tick: ProgressEvent) -> Result<(), ReconcileError> {
        if let Some(terminal) = self.terminal {
            return Err(ReconcileError::AfterTerminal {
                epoch: tick.epoch,
                terminal,
            });
        }

        if let Some(correlation) = &tick.correlation_data {
            self.correlation = Some(correlation.clone());
        }
        if tick.is_terminal() {
            self.terminal = Some(tick.status);
            if tick.metrics.is_some() {
                self.final_metrics = tick.metrics;
            }
        }

        let history = std::mem::take(&mut self.history);
        self.history = merge(history, tick);
        Ok(())
    }

    pub fn history(&self) -> &[ProgressEvent] {
        &self.history
    }

    pub fn final_metrics(&self) -> Option<TrainingMetrics> {
        self.final_metrics
    }

    pub fn terminal(&self) -> Option<TickStatus> {
        self.terminal
    }

    pub fn is_finished(&self) -> bool {
        self.terminal.is_some()
    }

    /// Current state as a snapshot stamped now.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            progress_history: self.history.clone(),
            correlation_data: self.correlation.clone(),
            final_metrics: self.final_metrics,
            timestamp: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use assert_matches::assert_matches;

    use super::*;

    fn tick(epoch: u32, loss: f64) -> ProgressEvent {
        ProgressEvent::training(epoch, loss, loss, 1.0, 1.0)
    }

    fn epochs(history: &[ProgressEvent]) -> Vec<u32> {
        history.iter().map(|t| t.epoch).collect()
    }

    #[test]
    fn merge_inserts_out_of_order_ticks_sorted() {
        let history = merge(Vec::new(), tick(2, 3.0));
        let history = merge(history, tick(0, 5.0));
        let history = merge(history, tick(1, 4.0));

        assert_eq!(epochs(&history), vec![0, 1, 2]);
    }

    #[test]
    fn merge_replaces_same_epoch_in_place() {
        let history = merge(merge(Vec::new(), tick(0, 120.5)), tick(1, 80.0));

        let history = merge(history, tick(0, 98.2));

        assert_eq!(epochs(&history), vec![0, 1]);
        assert_eq!(history[0].loss, 98.2);
    }

    #[test]
    fn repeated_epoch_keeps_latest_values() {
        let history = [tick(0, 4.0), tick(1, 3.0), tick(2, 2.0), tick(1, 2.5)]
            .into_iter()
            .fold(Vec::new(), merge);

        assert_eq!(epochs(&history), vec![0, 1, 2]);
        assert_eq!(history[1].loss, 2.5);
    }

    #[test]
    fn merge_is_idempotent() {
        let base = merge(merge(Vec::new(), tick(0, 2.0)), tick(3, 1.0));
        let t = tick(2, 1.5);

        let once = merge(base.clone(), t.clone());
        let twice = merge(once.clone(), t);

        assert_eq!(once, twice);
    }

    #[test]
    fn reconciler_tracks_final_metrics_of_terminal_tick() {
        let mut reconciler = Reconciler::new();
        let last = tick(0, 98.2);
        let metrics = TrainingMetrics {
            r2: 0.92,
            mae: 10.0,
            mse: 150.0,
            rmse: 12.2,
        };

        reconciler.apply(tick(0, 120.5)).unwrap();
        reconciler.apply(last.clone()).unwrap();
        reconciler
            .apply(ProgressEvent::completed(
                &last,
                metrics,
                BTreeMap::new(),
                CorrelationData::ByFeature(BTreeMap::new()),
            ))
            .unwrap();

        let snapshot = reconciler.snapshot();
        assert_eq!(snapshot.progress_history.len(), 1);
        assert_eq!(snapshot.progress_history[0].status, TickStatus::Completed);
        assert_eq!(snapshot.final_metrics.map(|m| m.r2), Some(0.92));
        assert!(snapshot.correlation_data.is_some());
        assert!(reconciler.is_finished());
    }

    #[test]
    fn ticks_after_terminal_are_rejected() {
        let mut reconciler = Reconciler::new();
        reconciler.apply(tick(1, 2.0)).unwrap();
        reconciler
            .apply(ProgressEvent::failed(None, "diverged"))
            .unwrap();

        let result = reconciler.apply(tick(2, 1.0));

        assert_matches!(
            result,
            Err(ReconcileError::AfterTerminal {
                epoch: 2,
                terminal: TickStatus::Error
            })
        );
        assert_eq!(epochs(reconciler.history()), vec![0, 1]);
    }

    #[test]
    fn resumes_from_snapshot() {
        let mut reconciler = Reconciler::new();
        reconciler.apply(tick(1, 2.0)).unwrap();
        reconciler.apply(tick(2, 1.0)).unwrap();

        let mut resumed = Reconciler::from_snapshot(reconciler.snapshot());
        resumed.apply(tick(3, 0.5)).unwrap();

        assert_eq!(epochs(resumed.history()), vec![1, 2, 3]);
        assert!(!resumed.is_finished());
    }
}
