//! Route definitions for the trained model and datasets.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{dataset, model};
use crate::state::AppState;

/// Routes mounted at `/api`.
///
/// ```text
/// GET    /model/info                 -> model_info
/// GET    /model/feature-importance   -> feature_importance
/// POST   /predict                    -> predict
/// GET    /default-dataset            -> default_dataset
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/model/info", get(model::model_info))
        .route("/model/feature-importance", get(model::feature_importance))
        .route("/predict", post(model::predict))
        .route("/default-dataset", get(dataset::default_dataset))
}
