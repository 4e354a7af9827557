use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use oilcast_core::types::JobId;
use serde::Deserialize;

use crate::error::AppResult;
use crate::state::AppState;
use crate::stream::session::{session_stream, Session};

/// Query string of the progress stream endpoint.
#[derive(Debug, Deserialize)]
pub struct ProgressQuery {
    #[serde(alias = "taskId")]
    pub task_id: JobId,
}

/// GET /api/training/progress?task_id={id}
///
/// Live progress of one job as server-sent events. Returns 404 for an
/// unknown job. A job that already ended gets a single `status` frame.
pub async fn progress_stream(
    State(state): State<AppState>,
    Query(query): Query<ProgressQuery>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let job = state.registry.get(query.task_id).await?;

    let session = match state.publisher.subscribe(job.id) {
        Some(subscription) => {
            tracing::info!(job_id = %job.id, "Progress stream opened");
            Session::live(subscription)
        }
        None => {
            // The channel closes only after the terminal status is recorded,
            // so re-reading yields the final state.
            let job = state.registry.get(job.id).await?;
            tracing::info!(job_id = %job.id, status = %job.status, "Progress stream for finished job");
            Session::ended(job)
        }
    };

    let keep_alive = KeepAlive::new()
        .interval(Duration::from_secs(state.config.stream_keepalive_secs.max(1)))
        .text("keep-alive");

    Ok(Sse::new(session_stream(session)).keep_alive(keep_alive))
}
