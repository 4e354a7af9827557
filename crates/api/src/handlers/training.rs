//! Handlers for starting and inspecting training jobs.

use std::path::{Path, PathBuf};

use axum::extract::{FromRequest, Multipart, Path as PathParam, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use oilcast_core::error::CoreError;
use oilcast_core::job::{Job, JobStatus, StartedJob};
use oilcast_core::types::JobId;
use oilcast_trainer::dataset::validate_header;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Message returned when no file is uploaded and the default dataset is absent.
pub const DEFAULT_DATASET_MISSING: &str = "Default dataset not found. Please upload a CSV file.";

/// Filename recorded for uploads that carry none.
const FALLBACK_UPLOAD_NAME: &str = "dataset.csv";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// An uploaded dataset file.
struct Upload {
    filename: String,
    data: Vec<u8>,
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"))
}

/// Pull the optional `file` field out of a multipart body.
async fn read_upload(mut multipart: Multipart) -> AppResult<Option<Upload>> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue; // ignore unknown fields
        }
        let filename = field
            .file_name()
            .unwrap_or(FALLBACK_UPLOAD_NAME)
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        upload = Some(Upload {
            filename,
            data: data.to_vec(),
        });
    }
    Ok(upload)
}

/// Reject uploads that cannot possibly be a production dataset.
fn validate_upload(data: &[u8]) -> Result<(), CoreError> {
    if data.iter().all(u8::is_ascii_whitespace) {
        return Err(CoreError::InvalidDataset("Uploaded file is empty".into()));
    }
    std::str::from_utf8(data)
        .map_err(|_| CoreError::InvalidDataset("Uploaded file is not valid UTF-8 text".into()))?;
    validate_header(data).map_err(|e| CoreError::InvalidDataset(e.to_string()))
}

/// Reduce a client-supplied filename to a safe final path component.
pub fn sanitize_filename(raw: &str) -> String {
    let base = raw.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        FALLBACK_UPLOAD_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

async fn store_upload(dir: &Path, job_id: JobId, upload: &Upload) -> AppResult<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| AppError::InternalError(format!("Failed to create upload dir: {e}")))?;
    let path = dir.join(format!("{job_id}_{}", sanitize_filename(&upload.filename)));
    tokio::fs::write(&path, &upload.data)
        .await
        .map_err(|e| AppError::InternalError(format!("Failed to store upload: {e}")))?;
    Ok(path)
}

// ---------------------------------------------------------------------------
// Start
// ---------------------------------------------------------------------------

/// POST /api/train
///
/// Start a training job. Accepts an optional multipart `file` field; without
/// one the server's default dataset is used. Returns 201 immediately, the
/// job runs in the background.
pub async fn start_training(
    State(state): State<AppState>,
    request: Request,
) -> AppResult<(StatusCode, Json<StartedJob>)> {
    let upload = if is_multipart(request.headers()) {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        read_upload(multipart).await?
    } else {
        None
    };

    let (job, dataset_path) = match upload {
        Some(upload) => {
            validate_upload(&upload.data)?;
            let job = state.registry.create(upload.filename.clone()).await;
            match store_upload(&state.config.upload_dir, job.id, &upload).await {
                Ok(path) => (job, path),
                Err(e) => {
                    let _ = state
                        .registry
                        .set_status(job.id, JobStatus::Failed, Some("Failed to store upload".into()))
                        .await;
                    return Err(e);
                }
            }
        }
        None => {
            let path = state.config.default_dataset_path.clone();
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Err(AppError::NotFound(DEFAULT_DATASET_MISSING.to_string()));
            }
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            (state.registry.create(name).await, path)
        }
    };

    state.runner.spawn(job.id, dataset_path);
    tracing::info!(job_id = %job.id, dataset = %job.dataset_name, "Training requested");

    Ok((StatusCode::CREATED, Json(StartedJob::new(job.id))))
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

/// GET /api/training
///
/// All jobs, newest first.
pub async fn list_jobs(State(state): State<AppState>) -> Json<Vec<Job>> {
    Json(state.registry.list().await)
}

/// GET /api/training/{task_id}
pub async fn get_job(
    State(state): State<AppState>,
    PathParam(task_id): PathParam<JobId>,
) -> AppResult<Json<Job>> {
    Ok(Json(state.registry.get(task_id).await?))
}
