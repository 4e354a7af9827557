use std::convert::Infallible;

use axum::response::sse::Event;
use futures::stream::{self, Stream};
use oilcast_core::job::Job;
use oilcast_core::progress::ProgressEvent;
use oilcast_core::stream_events::{
    ErrorFrame, LaggedFrame, StatusFrame, EVENT_ERROR, EVENT_LAGGED, EVENT_PROGRESS, EVENT_STATUS,
};
use oilcast_core::types::JobId;
use oilcast_events::{Delivery, Subscription};

/// Where a session is in its life.
enum Phase {
    /// Forwarding live ticks.
    Live(Subscription),
    /// The job had already ended at subscribe time; one status frame is due.
    Ended(Job),
    Done,
}

/// State of one progress stream. Dropping it unsubscribes.
pub struct Session {
    job_id: JobId,
    phase: Phase,
    frames: usize,
}

impl Session {
    pub fn live(subscription: Subscription) -> Self {
        Self {
            job_id: subscription.job_id(),
            phase: Phase::Live(subscription),
            frames: 0,
        }
    }

    pub fn ended(job: Job) -> Self {
        Self {
            job_id: job.id,
            phase: Phase::Ended(job),
            frames: 0,
        }
    }

    /// Produce the next frame, or `None` once the stream is over.
    async fn next_frame(&mut self) -> Option<Event> {
        let frame = match std::mem::replace(&mut self.phase, Phase::Done) {
            Phase::Live(mut subscription) => match subscription.next().await {
                Delivery::Tick(tick) => {
                    if !tick.is_terminal() {
                        self.phase = Phase::Live(subscription);
                    }
                    progress_frame(&tick)
                }
                Delivery::Lagged(skipped) => {
                    self.phase = Phase::Live(subscription);
                    json_frame(EVENT_LAGGED, &LaggedFrame { skipped })
                }
                Delivery::Closed => return None,
            },
            Phase::Ended(job) => json_frame(
                EVENT_STATUS,
                &StatusFrame {
                    task_id: job.id,
                    status: job.status,
                    error: job.error,
                },
            ),
            Phase::Done => return None,
        };
        self.frames += 1;
        Some(frame)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        tracing::debug!(job_id = %self.job_id, frames = self.frames, "Progress stream closed");
    }
}

/// Turn a session into an SSE event stream.
pub fn session_stream(session: Session) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(session, |mut session| async move {
        let frame = session.next_frame().await?;
        Some((Ok(frame), session))
    })
}

fn progress_frame(tick: &ProgressEvent) -> Event {
    json_frame(EVENT_PROGRESS, tick)
}

fn json_frame<T: serde::Serialize>(event: &str, data: &T) -> Event {
    match Event::default().event(event).json_data(data) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::error!(event, error = %e, "Failed to encode stream frame");
            let message = ErrorFrame {
                message: "Failed to encode progress frame".to_string(),
            };
            Event::default()
                .event(EVENT_ERROR)
                .data(serde_json::to_string(&message).unwrap_or_default())
        }
    }
}
