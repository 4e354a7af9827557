//! Integration tests for model info, feature importance, prediction and the
//! default dataset download.

mod common;

use std::sync::Arc;

use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use common::{body_bytes, body_json, get, post_json, StubTrainer};
use oilcast_api::handlers::model::NO_MODEL;
use oilcast_core::features::{FEATURE_NAMES, TARGET_NAME};
use serde_json::json;

fn app() -> common::TestApp {
    common::build_test_app(Arc::new(StubTrainer::succeeding(Vec::new(), 0.9)))
}

/// An app whose model directory already holds a trained artifact.
fn app_with_model() -> common::TestApp {
    let app = app();
    let mut model = common::tiny_model();
    model.metrics = Some(common::metrics(0.92));
    model.feature_importance = Some(common::importance());
    app.state.models.save(&model).unwrap();
    app
}

fn prediction_payload() -> serde_json::Value {
    json!({
        "P_downhole": 250.0,
        "Q_liquid": 1200.0,
        "H_pump": 300.0,
        "WC_percent": 35.0,
        "GFR": 150.0,
        "choke_size": 40.0
    })
}

// ---------------------------------------------------------------------------
// Model info
// ---------------------------------------------------------------------------

#[tokio::test]
async fn model_info_without_model_reports_defaults() {
    let app = app();

    let response = get(&app.router, "/api/model/info").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["modelExists"], false);
    assert_eq!(json["featureNames"], json!(FEATURE_NAMES));
    assert_eq!(json["targetName"], TARGET_NAME);
    assert_eq!(json["architecture"]["layers"].as_array().unwrap().len(), 3);
    assert!(json.get("metrics").is_none());
}

#[tokio::test]
async fn model_info_with_model_reports_metrics() {
    let app = app_with_model();

    let json = body_json(get(&app.router, "/api/model/info").await).await;

    assert_eq!(json["modelExists"], true);
    assert_eq!(json["metrics"]["r2"], 0.92);
}

#[tokio::test]
async fn unreadable_model_reports_defaults() {
    let app = app();
    std::fs::create_dir_all(app.state.models.dir()).unwrap();
    std::fs::write(app.state.models.path(), "{ not json").unwrap();

    let json = body_json(get(&app.router, "/api/model/info").await).await;

    assert_eq!(json["modelExists"], false);
}

// ---------------------------------------------------------------------------
// Feature importance
// ---------------------------------------------------------------------------

#[tokio::test]
async fn feature_importance_without_model_returns_404() {
    let app = app();

    let response = get(&app.router, "/api/model/feature-importance").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], NO_MODEL);
}

#[tokio::test]
async fn feature_importance_lists_every_feature() {
    let app = app_with_model();

    let json = body_json(get(&app.router, "/api/model/feature-importance").await).await;

    for name in FEATURE_NAMES {
        assert!(json[name]["importance"].is_number(), "missing {name}");
        assert!(json[name]["std"].is_number());
    }
}

// ---------------------------------------------------------------------------
// Predict
// ---------------------------------------------------------------------------

#[tokio::test]
async fn predict_without_model_returns_404() {
    let app = app();

    let response = post_json(&app.router, "/api/predict", prediction_payload()).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], NO_MODEL);
}

#[tokio::test]
async fn predict_with_missing_feature_is_a_validation_error() {
    let app = app_with_model();

    let response = post_json(&app.router, "/api/predict", json!({"P_downhole": 250.0})).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn predict_with_out_of_range_water_cut_is_a_validation_error() {
    let app = app_with_model();
    let mut payload = prediction_payload();
    payload["WC_percent"] = json!(150.0);

    let response = post_json(&app.router, "/api/predict", payload).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn predict_with_model_returns_non_negative_production() {
    let app = app_with_model();

    let response = post_json(&app.router, "/api/predict", prediction_payload()).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let prediction = json["prediction"].as_f64().unwrap();
    assert!(prediction >= 0.0);
    assert_eq!(json["unit"], "т/сут");
    assert_eq!(json["clamped"], prediction == 0.0);
}

// ---------------------------------------------------------------------------
// Default dataset
// ---------------------------------------------------------------------------

#[tokio::test]
async fn default_dataset_is_downloadable() {
    let app = app();
    let csv = app.write_default_dataset();

    let response = get(&app.router, "/api/default-dataset").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[CONTENT_TYPE].to_str().unwrap().starts_with("text/csv"));
    assert!(response.headers()[CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .contains("Volve production data.csv"));
    assert_eq!(body_bytes(response).await, csv.as_bytes());
}

#[tokio::test]
async fn missing_default_dataset_returns_404() {
    let app = app();

    let response = get(&app.router, "/api/default-dataset").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
