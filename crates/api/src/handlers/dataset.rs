use axum::extract::State;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::IntoResponse;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// GET /api/default-dataset
///
/// The server's default dataset as a CSV attachment.
pub async fn default_dataset(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let path = &state.config.default_dataset_path;
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound("Default dataset not found".to_string()));
        }
        Err(e) => return Err(AppError::InternalError(format!("Failed to read default dataset: {e}"))),
    };

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().replace('"', ""))
        .unwrap_or_else(|| "dataset.csv".to_string());

    Ok((
        [
            (CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
        ],
        bytes,
    ))
}
