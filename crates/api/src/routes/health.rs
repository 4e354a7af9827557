use axum::extract::State;
use axum::{routing::get, Json, Router};
use oilcast_core::job::JobStatus;
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Jobs currently in `running` status.
    pub running_jobs: usize,
    /// Progress stream observers across all jobs.
    pub open_streams: usize,
}

/// GET /health -- returns service health and engine load.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        running_jobs: state.registry.count_by_status(JobStatus::Running).await,
        open_streams: state.publisher.total_observers(),
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
