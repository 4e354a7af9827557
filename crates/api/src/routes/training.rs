//! Route definitions for training jobs.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::handlers::training;
use crate::state::AppState;
use crate::stream;

/// Routes mounted at `/api`.
///
/// ```text
/// POST   /train                      -> start_training
/// GET    /training                   -> list_jobs
/// GET    /training/progress          -> progress_stream
/// GET    /training/{task_id}         -> get_job
/// ```
pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/train",
            post(training::start_training).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/training", get(training::list_jobs))
        .route("/training/progress", get(stream::progress_stream))
        .route("/training/{task_id}", get(training::get_job))
}
