pub mod health;
pub mod model;
pub mod training;

use axum::Router;

use crate::state::AppState;

/// Build the `/api` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /train                                 start a training job (POST, multipart)
/// /training                              list jobs
/// /training/progress?task_id={id}        live progress (SSE)
/// /training/{task_id}                    job status
///
/// /model/info                            model metadata
/// /model/feature-importance              permutation importance
/// /predict                               predict daily oil production (POST)
/// /default-dataset                       download the default dataset
/// ```
pub fn api_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .merge(training::router(max_upload_bytes))
        .merge(model::router())
}
