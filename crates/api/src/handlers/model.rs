//! Handlers for the trained model: info, feature importance and prediction.

use std::collections::BTreeMap;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use oilcast_core::error::CoreError;
use oilcast_core::features::{Architecture, FEATURE_NAMES, TARGET_NAME};
use oilcast_core::prediction::{PredictionRequest, PredictionResponse};
use oilcast_core::progress::{FeatureImportance, TrainingMetrics};
use oilcast_trainer::{ModelStore, TrainedModel};
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Message returned by endpoints that need a trained model.
pub const NO_MODEL: &str = "No trained model available. Train a model first.";

/// Response of `GET /api/model/info`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub feature_names: Vec<String>,
    pub target_name: String,
    pub architecture: Architecture,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<TrainingMetrics>,
    pub model_exists: bool,
}

impl ModelInfo {
    fn from_model(model: Option<&TrainedModel>) -> Self {
        match model {
            Some(model) => Self {
                feature_names: model.feature_names.clone(),
                target_name: model.target_name.clone(),
                architecture: Architecture::dense(),
                metrics: model.metrics,
                model_exists: true,
            },
            None => Self {
                feature_names: FEATURE_NAMES.iter().map(|f| f.to_string()).collect(),
                target_name: TARGET_NAME.to_string(),
                architecture: Architecture::dense(),
                metrics: None,
                model_exists: false,
            },
        }
    }
}

/// Load the current model on the blocking pool.
async fn load_model(store: &ModelStore) -> AppResult<Option<TrainedModel>> {
    let store = store.clone();
    tokio::task::spawn_blocking(move || store.load())
        .await
        .map_err(|e| AppError::InternalError(format!("Model load task failed: {e}")))?
        .map_err(|e| AppError::InternalError(format!("Failed to load model: {e}")))
}

async fn require_model(store: &ModelStore) -> AppResult<TrainedModel> {
    load_model(store)
        .await?
        .ok_or_else(|| AppError::NotFound(NO_MODEL.to_string()))
}

/// GET /api/model/info
///
/// Never fails: an absent or unreadable artifact yields the defaults with
/// `modelExists = false`.
pub async fn model_info(State(state): State<AppState>) -> Json<ModelInfo> {
    let model = match load_model(&state.models).await {
        Ok(model) => model,
        Err(e) => {
            tracing::warn!(error = %e, "Model artifact unreadable, reporting defaults");
            None
        }
    };
    Json(ModelInfo::from_model(model.as_ref()))
}

/// GET /api/model/feature-importance
pub async fn feature_importance(
    State(state): State<AppState>,
) -> AppResult<Json<BTreeMap<String, FeatureImportance>>> {
    let model = require_model(&state.models).await?;
    model
        .feature_importance
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Feature importance not available".to_string()))
}

/// POST /api/predict
///
/// Predict daily oil production from the six model features. A
/// non-positive model output is clamped to zero.
pub async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<PredictionRequest>, JsonRejection>,
) -> AppResult<Json<PredictionResponse>> {
    let Json(request) = payload.map_err(|e| CoreError::Validation(e.body_text()))?;
    request.check()?;

    let model = require_model(&state.models).await?;
    let raw = model
        .predict(&request.to_vector())
        .map_err(|e| AppError::InternalError(e.to_string()))?;

    let response = PredictionResponse::from_raw(raw);
    tracing::debug!(raw, prediction = response.prediction, clamped = response.clamped, "Prediction served");
    Ok(Json(response))
}
