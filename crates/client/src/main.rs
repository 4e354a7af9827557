//! `oilcast-watch` -- start a training job and follow it to the end.
//!
//! Uploads `DATASET_PATH` (or asks the server to use its default dataset),
//! streams progress, and keeps `training_snapshot.json` in `SNAPSHOT_DIR`
//! up to date after every tick. On success it reports the model the server
//! now serves. See [`WatchConfig`] for the variables.

use oilcast_client::api::{ApiClient, DatasetUpload};
use oilcast_client::config::WatchConfig;
use oilcast_client::consumer::{self, ProgressWatcher, StreamEnd};
use oilcast_client::snapshot::{FileSnapshotStore, SnapshotStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "oilcast_client=info,oilcast_watch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WatchConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    let store = FileSnapshotStore::new(&config.snapshot_dir);
    if let Some(previous) = store.load() {
        tracing::info!(
            epochs = previous.progress_history.len(),
            r2 = previous.final_metrics.map(|m| m.r2),
            saved_at = %previous.timestamp,
            "Found snapshot of a previous run",
        );
    }

    let dataset = config.dataset_path.as_ref().map(|path| {
        let data = std::fs::read(path).unwrap_or_else(|e| {
            tracing::error!(path = %path.display(), error = %e, "Failed to read dataset");
            std::process::exit(1);
        });
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dataset.csv".to_string());
        DatasetUpload { filename, data }
    });

    let api = ApiClient::new(&config.backend_url);
    let started = api.start_training(dataset).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to start training");
        std::process::exit(1);
    });
    tracing::info!(task_id = %started.task_id, "{}", started.message);

    let mut watcher = ProgressWatcher::new(store);
    let outcome = consumer::watch(&api, started.task_id, &mut watcher)
        .await
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "Lost track of the job");
            std::process::exit(1);
        });

    let epochs = outcome.snapshot.progress_history.len();
    match &outcome.end {
        StreamEnd::Finished(status) => {
            tracing::info!(?status, epochs, metrics = ?outcome.snapshot.final_metrics, "Training finished");
        }
        StreamEnd::AlreadyTerminal(frame) => {
            tracing::info!(status = %frame.status, error = ?frame.error, epochs, "Training finished");
        }
        StreamEnd::Disconnected | StreamEnd::TransportError(_) => {
            tracing::error!(end = ?outcome.end, epochs, "Progress stream ended before the job finished");
        }
    }
    if outcome.skipped > 0 || outcome.violations > 0 {
        tracing::warn!(skipped = outcome.skipped, violations = outcome.violations, "Stream was not clean");
    }

    if !consumer::succeeded(&outcome.end) {
        std::process::exit(2);
    }

    match api.model_info().await {
        Ok(model) => tracing::info!(
            model_exists = model.model_exists,
            target = %model.target_name,
            features = ?model.feature_names,
            r2 = model.metrics.map(|m| m.r2),
            "Serving model",
        ),
        Err(e) => tracing::warn!(error = %e, "Could not fetch model info"),
    }
}
