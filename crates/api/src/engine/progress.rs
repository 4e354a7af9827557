//! Bridge between the blocking trainer and the async publisher.
//!
//! [`ChannelSink`] carries typed ticks off the trainer thread and
//! [`TickSequencer`] enforces the per-job ordering rules before a tick is
//! published.

use oilcast_core::progress::ProgressEvent;
use oilcast_core::types::JobId;
use oilcast_trainer::ProgressSink;
use tokio::sync::mpsc;

/// [`ProgressSink`] that forwards ticks into an unbounded channel.
///
/// Unbounded: `emit` must never block the trainer thread. The backlog is at
/// most one tick per epoch.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiver the runner drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&self, tick: ProgressEvent) {
        // The receiver only goes away if the runner task was dropped.
        let _ = self.sender.send(tick);
    }
}

/// Filters trainer ticks so that what gets published is well ordered.
///
/// - epochs never decrease;
/// - only `training` ticks pass; terminal ticks are produced by the runner.
#[derive(Debug)]
pub struct TickSequencer {
    job_id: JobId,
    last: Option<ProgressEvent>,
    dropped: usize,
}

impl TickSequencer {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            last: None,
            dropped: 0,
        }
    }

    /// Return the tick if it may be published, or `None` after logging why
    /// it was dropped.
    pub fn accept(&mut self, tick: ProgressEvent) -> Option<ProgressEvent> {
        if tick.is_terminal() {
            tracing::warn!(
                job_id = %self.job_id,
                epoch = tick.epoch,
                "Dropped terminal tick sent by trainer",
            );
            self.dropped += 1;
            return None;
        }
        if let Some(last) = &self.last {
            if tick.epoch < last.epoch {
                tracing::warn!(
                    job_id = %self.job_id,
                    epoch = tick.epoch,
                    last_epoch = last.epoch,
                    "Dropped out-of-order tick",
                );
                self.dropped += 1;
                return None;
            }
        }
        self.last = Some(tick.clone());
        Some(tick)
    }

    /// The last tick that was accepted.
    pub fn last(&self) -> Option<&ProgressEvent> {
        self.last.as_ref()
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }
}
