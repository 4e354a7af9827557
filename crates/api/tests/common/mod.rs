use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::header::CONTENT_TYPE;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use oilcast_core::correlation::CorrelationData;
use oilcast_core::features::{FEATURE_COUNT, FEATURE_NAMES};
use oilcast_core::job::Job;
use oilcast_core::progress::{FeatureImportance, ProgressEvent, TrainingMetrics};
use oilcast_core::types::JobId;
use oilcast_trainer::network::Network;
use oilcast_trainer::scaler::StandardScaler;
use oilcast_trainer::{ProgressSink, TrainConfig, TrainError, TrainedModel, Trainer, TrainingOutcome};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use oilcast_api::config::ServerConfig;
use oilcast_api::router::build_app_router;
use oilcast_api::state::AppState;

const MULTIPART_BOUNDARY: &str = "oilcast-test-boundary";

/// A CSV header carrying every required source column.
pub const VALID_HEADER: &str =
    "DATEPRD,AVG_DOWNHOLE_PRESSURE,AVG_DP_TUBING,AVG_CHOKE_SIZE_P,BORE_OIL_VOL,BORE_GAS_VOL,BORE_WAT_VOL";

/// Build a test `ServerConfig` whose directories all live under `dir`.
///
/// The default dataset path points at a file that does not exist until
/// [`TestApp::write_default_dataset`] is called.
pub fn test_config(dir: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        default_dataset_path: dir.join("Volve production data.csv"),
        model_dir: dir.join("models"),
        upload_dir: dir.join("uploads"),
        max_upload_bytes: 1024 * 1024,
        max_concurrent_jobs: 2,
        stream_buffer: 64,
        stream_keepalive_secs: 15,
        train: TrainConfig::default(),
    }
}

/// A router plus the state and scratch directory behind it.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub dir: TempDir,
}

impl TestApp {
    pub fn default_dataset_path(&self) -> PathBuf {
        self.state.config.default_dataset_path.clone()
    }

    pub fn write_default_dataset(&self) -> String {
        let csv = format!("{VALID_HEADER}\n2014-04-07,289.4,182.2,43.3,631.5,90439.1,0\n");
        std::fs::write(self.default_dataset_path(), &csv).unwrap();
        csv
    }
}

/// Build the full application router around `trainer`, with the same
/// middleware stack production uses.
pub fn build_test_app(trainer: Arc<dyn Trainer>) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::new(test_config(dir.path()), trainer);
    TestApp {
        router: build_app_router(state.clone()),
        state,
        dir,
    }
}

// ---------------------------------------------------------------------------
// Stub trainer
// ---------------------------------------------------------------------------

pub fn metrics(r2: f64) -> TrainingMetrics {
    TrainingMetrics {
        r2,
        mae: 12.3,
        mse: 210.4,
        rmse: 14.5,
    }
}

/// A small untrained model with the standard feature metadata.
pub fn tiny_model() -> TrainedModel {
    let mut rng = StdRng::seed_from_u64(1);
    TrainedModel::new(
        StandardScaler::fit(&[[0.0; FEATURE_COUNT], [1.0; FEATURE_COUNT]]),
        Network::new(FEATURE_COUNT, &[2], &mut rng),
    )
}

pub fn importance() -> BTreeMap<String, FeatureImportance> {
    FEATURE_NAMES
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let value = FeatureImportance {
                importance: (FEATURE_COUNT - i) as f64,
                std: 0.1,
            };
            (name.to_string(), value)
        })
        .collect()
}

/// Training ticks emitted per run by [`StubTrainer::tagged`].
pub const TAGGED_EPOCHS: u32 = 3;

/// Trainer that replays fixed ticks and then succeeds with `r2`, or fails
/// when `r2` is `None`. A gated stub blocks until the gate is released.
pub struct StubTrainer {
    ticks: Vec<ProgressEvent>,
    r2: Option<f64>,
    gate: Option<Mutex<mpsc::Receiver<()>>>,
    runs: Option<AtomicU32>,
}

impl StubTrainer {
    pub fn succeeding(ticks: Vec<ProgressEvent>, r2: f64) -> Self {
        Self {
            ticks,
            r2: Some(r2),
            gate: None,
            runs: None,
        }
    }

    pub fn failing(ticks: Vec<ProgressEvent>) -> Self {
        Self {
            ticks,
            r2: None,
            gate: None,
            runs: None,
        }
    }

    /// Succeeds with [`TAGGED_EPOCHS`] ticks whose losses all equal the
    /// 1-based number of the run, so each job's ticks are distinguishable.
    pub fn tagged(r2: f64) -> Self {
        Self {
            runs: Some(AtomicU32::new(0)),
            ..Self::succeeding(Vec::new(), r2)
        }
    }

    fn ticks_for_run(&self) -> Vec<ProgressEvent> {
        let Some(runs) = &self.runs else {
            return self.ticks.clone();
        };
        let tag = f64::from(runs.fetch_add(1, Ordering::SeqCst) + 1);
        (1..=TAGGED_EPOCHS)
            .map(|epoch| ProgressEvent::training(epoch, tag, tag, tag, tag))
            .collect()
    }

    pub fn gated(mut self) -> (Self, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        self.gate = Some(Mutex::new(rx));
        (self, tx)
    }
}

impl Trainer for StubTrainer {
    fn train(&self, _csv: &[u8], sink: &dyn ProgressSink) -> Result<TrainingOutcome, TrainError> {
        if let Some(gate) = &self.gate {
            let _ = gate.lock().unwrap().recv_timeout(Duration::from_secs(10));
        }
        let ticks = self.ticks_for_run();
        for tick in &ticks {
            sink.emit(tick.clone());
        }
        let last = ticks
            .last()
            .cloned()
            .unwrap_or_else(|| ProgressEvent::training(0, 0.0, 0.0, 0.0, 0.0));

        let Some(r2) = self.r2 else {
            return Err(TrainError::Diverged { epoch: last.epoch });
        };
        let mut model = tiny_model();
        model.metrics = Some(metrics(r2));
        model.feature_importance = Some(importance());
        Ok(TrainingOutcome {
            model,
            final_tick: last,
            metrics: metrics(r2),
            feature_importance: importance(),
            correlation: CorrelationData::ByFeature(BTreeMap::new()),
        })
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

pub async fn post_empty(app: &Router, uri: &str) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

/// POST a multipart body with a single `file` field.
pub async fn post_file(app: &Router, uri: &str, filename: &str, data: &[u8]) -> Response {
    let mut body = format!(
        "--{MULTIPART_BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
         Content-Type: text/csv\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--\r\n").as_bytes());

    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    send(app, request).await
}

pub async fn body_bytes(response: Response) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Start a job on the default dataset and return its id.
pub async fn start_default_job(app: &Router) -> JobId {
    let response = post_empty(app, "/api/train").await;
    assert_eq!(response.status(), 201);
    let json = body_json(response).await;
    json["taskId"].as_str().unwrap().parse().unwrap()
}

/// Poll the job until it reaches a terminal status.
pub async fn wait_until_finished(app: &Router, id: JobId) -> Job {
    for _ in 0..200 {
        let response = get(app, &format!("/api/training/{id}")).await;
        let job: Job = serde_json::from_slice(&body_bytes(response).await).unwrap();
        if job.status.is_terminal() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("job {id} did not finish in time");
}
