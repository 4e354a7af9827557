//! Per-job progress fan-out backed by `tokio::sync::broadcast`.
//!
//! [`ProgressPublisher`] keeps one broadcast channel per open job. The job
//! runner publishes ticks into it and any number of stream sessions hold a
//! [`Subscription`]. It is designed to be shared via `Arc<ProgressPublisher>`.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use oilcast_core::progress::ProgressEvent;
use oilcast_core::types::JobId;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// What an observer sees next.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Tick(ProgressEvent),
    /// The observer fell behind and this many of the oldest ticks were
    /// dropped from its buffer.
    Lagged(u64),
    /// The job's channel was closed and every buffered tick was drained.
    Closed,
}

/// Live, from-now view of one job's ticks.
///
/// Dropping the subscription detaches the observer.
#[derive(Debug)]
pub struct Subscription {
    job_id: JobId,
    receiver: broadcast::Receiver<ProgressEvent>,
}

impl Subscription {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Wait for the next delivery.
    pub async fn next(&mut self) -> Delivery {
        match self.receiver.recv().await {
            Ok(tick) => Delivery::Tick(tick),
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(job_id = %self.job_id, skipped, "Progress observer lagged");
                Delivery::Lagged(skipped)
            }
            Err(RecvError::Closed) => Delivery::Closed,
        }
    }

    /// Detach from the job. Equivalent to dropping the subscription.
    pub fn unsubscribe(self) {}
}

// ---------------------------------------------------------------------------
// ProgressPublisher
// ---------------------------------------------------------------------------

/// Default number of ticks buffered per observer.
pub const DEFAULT_BUFFER: usize = 256;

/// Registry of per-job broadcast channels.
///
/// Publishing never waits on observers: each one reads from its own bounded
/// ring, and when that ring is full the oldest tick is overwritten. A slow
/// observer only ever loses its own ticks.
#[derive(Debug)]
pub struct ProgressPublisher {
    capacity: usize,
    channels: RwLock<HashMap<JobId, broadcast::Sender<ProgressEvent>>>,
}

impl ProgressPublisher {
    /// Create a publisher whose observers buffer up to `capacity` ticks.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Open the channel for `job_id`. Opening an already open job is a no-op.
    pub fn open(&self, job_id: JobId) {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        channels
            .entry(job_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0);
    }

    /// Attach a new observer. Returns `None` if the job has no open channel,
    /// either because it is unknown or because it already ended.
    pub fn subscribe(&self, job_id: JobId) -> Option<Subscription> {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        let sender = channels.get(&job_id)?;
        let receiver = sender.subscribe();
        tracing::debug!(
            job_id = %job_id,
            observers = sender.receiver_count(),
            "Progress observer attached"
        );
        Some(Subscription { job_id, receiver })
    }

    /// Deliver `tick` to every observer currently attached to `job_id`.
    ///
    /// Returns the number of observers reached; zero when nobody is
    /// listening or the channel is not open.
    pub fn publish(&self, job_id: JobId, tick: ProgressEvent) -> usize {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = channels.get(&job_id) else {
            tracing::debug!(job_id = %job_id, "Publish to closed progress channel ignored");
            return 0;
        };
        // A send error only means there are zero receivers.
        let observers = sender.send(tick).unwrap_or(0);
        tracing::trace!(job_id = %job_id, observers, "Progress tick published");
        observers
    }

    /// Close the channel for `job_id`. Observers drain what is buffered and
    /// then see [`Delivery::Closed`].
    pub fn close(&self, job_id: JobId) {
        let removed = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&job_id);
        if let Some(sender) = removed {
            tracing::debug!(
                job_id = %job_id,
                observers = sender.receiver_count(),
                "Progress channel closed"
            );
        }
    }

    pub fn is_open(&self, job_id: JobId) -> bool {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&job_id)
    }

    /// Number of observers attached to `job_id`.
    pub fn observer_count(&self, job_id: JobId) -> usize {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&job_id)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Total observers across all open jobs.
    pub fn total_observers(&self) -> usize {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(broadcast::Sender::receiver_count)
            .sum()
    }

    /// Jobs that currently have an open channel.
    pub fn open_jobs(&self) -> Vec<JobId> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }
}

impl Default for ProgressPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
