//! Drives a [`Reconciler`] from a progress stream and persists every step.
//!
//! Frames are decoded into [`StreamUpdate`]s, ticks are folded into the
//! reconciler and the resulting snapshot is written to the
//! [`SnapshotStore`] after each accepted tick. A dropped connection keeps the
//! state built so far.

use futures::{Stream, StreamExt};
use oilcast_core::job::JobStatus;
use oilcast_core::progress::{ProgressEvent, TickStatus};
use oilcast_core::stream_events::{
    ErrorFrame, LaggedFrame, StatusFrame, EVENT_ERROR, EVENT_LAGGED, EVENT_PROGRESS, EVENT_STATUS,
};
use oilcast_core::types::JobId;
use serde::de::DeserializeOwned;

use crate::api::ApiClient;
use crate::error::ClientError;
use crate::reconcile::Reconciler;
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::sse::{SseFrame, SseParser};

/// A decoded stream frame.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamUpdate {
    Tick(ProgressEvent),
    Status(StatusFrame),
    Lagged(u64),
    Error(String),
}

fn parse<T: DeserializeOwned>(frame: &SseFrame) -> Result<T, ClientError> {
    serde_json::from_str(&frame.data).map_err(|source| ClientError::MalformedFrame {
        event: frame.event.clone(),
        source,
    })
}

/// Decode one frame. Unknown event names yield `Ok(None)`.
pub fn decode_frame(frame: &SseFrame) -> Result<Option<StreamUpdate>, ClientError> {
    let update = match frame.event.as_str() {
        EVENT_PROGRESS => StreamUpdate::Tick(parse(frame)?),
        EVENT_STATUS => StreamUpdate::Status(parse(frame)?),
        EVENT_LAGGED => StreamUpdate::Lagged(parse::<LaggedFrame>(frame)?.skipped),
        EVENT_ERROR => StreamUpdate::Error(parse::<ErrorFrame>(frame)?.message),
        _ => return Ok(None),
    };
    Ok(Some(update))
}

/// How a single stream connection ended.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEnd {
    /// A terminal tick was received.
    Finished(TickStatus),
    /// The job was already terminal when the stream was opened.
    AlreadyTerminal(StatusFrame),
    /// The server closed the stream before a terminal tick.
    Disconnected,
    /// Reading the body failed.
    TransportError(String),
}

/// Final result of watching a job.
#[derive(Debug, Clone)]
pub struct WatchOutcome {
    pub end: StreamEnd,
    pub snapshot: Snapshot,
    /// Ticks the server reported as skipped because this client lagged.
    pub skipped: u64,
    /// Ticks rejected because they arrived after a terminal tick.
    pub violations: usize,
}

/// Stateful consumer for one job's progress.
#[derive(Debug)]
pub struct ProgressWatcher<S> {
    reconciler: Reconciler,
    store: S,
    status: Option<StatusFrame>,
    skipped: u64,
    violations: usize,
}

impl<S: SnapshotStore> ProgressWatcher<S> {
    pub fn new(store: S) -> Self {
        Self::with_reconciler(Reconciler::new(), store)
    }

    pub fn with_reconciler(reconciler: Reconciler, store: S) -> Self {
        Self {
            reconciler,
            store,
            status: None,
            skipped: 0,
            violations: 0,
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Handle one frame. Malformed frames are logged and skipped.
    pub fn handle_frame(&mut self, frame: &SseFrame) {
        match decode_frame(frame) {
            Ok(Some(update)) => self.apply(update),
            Ok(None) => tracing::debug!(event = %frame.event, "Ignoring unknown stream event"),
            Err(e) => tracing::warn!(error = %e, "Skipping malformed stream frame"),
        }
    }

    fn apply(&mut self, update: StreamUpdate) {
        match update {
            StreamUpdate::Tick(tick) => self.on_tick(tick),
            StreamUpdate::Status(status) => {
                tracing::info!(task_id = %status.task_id, status = %status.status, "Job already finished");
                self.status = Some(status);
            }
            StreamUpdate::Lagged(skipped) => {
                tracing::warn!(skipped, "Progress stream lagged, ticks were dropped");
                self.skipped += skipped;
            }
            StreamUpdate::Error(message) => {
                tracing::warn!(%message, "Server reported a stream error");
            }
        }
    }

    fn on_tick(&mut self, tick: ProgressEvent) {
        let epoch = tick.epoch;
        let status = tick.status;
        if let Err(e) = self.reconciler.apply(tick) {
            tracing::error!(error = %e, "Protocol violation on progress stream");
            self.violations += 1;
            return;
        }
        tracing::debug!(epoch, ?status, "Tick reconciled");

        if let Err(e) = self.store.save(&self.reconciler.snapshot()) {
            tracing::warn!(error = %e, "Failed to persist snapshot");
        }
    }

    /// Consume one stream connection until it ends.
    pub async fn consume<St, B, E>(&mut self, stream: St) -> StreamEnd
    where
        St: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
    {
        let mut stream = std::pin::pin!(stream);
        let mut parser = SseParser::new();

        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => {
                    for frame in parser.push(bytes.as_ref()) {
                        self.handle_frame(&frame);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Progress stream interrupted");
                    return self.end_or(StreamEnd::TransportError(e.to_string()));
                }
            }
        }
        if parser.has_pending() {
            tracing::debug!("Discarding incomplete trailing frame");
        }
        self.end_or(StreamEnd::Disconnected)
    }

    fn end_or(&self, fallback: StreamEnd) -> StreamEnd {
        if let Some(status) = self.reconciler.terminal() {
            StreamEnd::Finished(status)
        } else if let Some(frame) = &self.status {
            StreamEnd::AlreadyTerminal(frame.clone())
        } else {
            fallback
        }
    }

    pub fn outcome(&self, end: StreamEnd) -> WatchOutcome {
        WatchOutcome {
            end,
            snapshot: self.reconciler.snapshot(),
            skipped: self.skipped,
            violations: self.violations,
        }
    }
}

/// Follow a job over a single stream connection.
///
/// A dropped stream is not reopened: missed ticks are not replayed by the
/// server. Instead the job status is polled once so the outcome reports
/// whether the job finished while the stream was down.
pub async fn watch<S: SnapshotStore>(
    api: &ApiClient,
    task_id: JobId,
    watcher: &mut ProgressWatcher<S>,
) -> Result<WatchOutcome, ClientError> {
    let response = api.open_progress(task_id).await?;
    let end = watcher.consume(response.bytes_stream()).await;

    if let StreamEnd::Disconnected | StreamEnd::TransportError(_) = end {
        let job = api.job(task_id).await?;
        if job.status.is_terminal() {
            tracing::warn!(%task_id, status = %job.status, "Job finished while the stream was down");
            let frame = StatusFrame {
                task_id,
                status: job.status,
                error: job.error,
            };
            return Ok(watcher.outcome(StreamEnd::AlreadyTerminal(frame)));
        }
    }
    Ok(watcher.outcome(end))
}

/// Whether a finished watch means the job succeeded.
pub fn succeeded(end: &StreamEnd) -> bool {
    match end {
        StreamEnd::Finished(status) => *status == TickStatus::Completed,
        StreamEnd::AlreadyTerminal(frame) => frame.status == JobStatus::Completed,
        StreamEnd::Disconnected | StreamEnd::TransportError(_) => false,
    }
}
