use std::sync::Arc;

use oilcast_events::ProgressPublisher;
use oilcast_trainer::{ModelStore, Trainer};

use crate::config::ServerConfig;
use crate::engine::{JobRegistry, JobRunner};

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Job identity and status.
    pub registry: Arc<JobRegistry>,
    /// Per-job progress channels.
    pub publisher: Arc<ProgressPublisher>,
    /// Background training runner.
    pub runner: Arc<JobRunner>,
    /// Location of the current model artifact.
    pub models: ModelStore,
}

impl AppState {
    /// Wire up the engine around `trainer`.
    pub fn new(config: ServerConfig, trainer: Arc<dyn Trainer>) -> Self {
        let registry = Arc::new(JobRegistry::new());
        let publisher = Arc::new(ProgressPublisher::new(config.stream_buffer));
        let models = ModelStore::new(config.model_dir.clone());
        let runner = Arc::new(JobRunner::new(
            Arc::clone(&registry),
            Arc::clone(&publisher),
            trainer,
            models.clone(),
            config.max_concurrent_jobs,
        ));

        Self {
            config: Arc::new(config),
            registry,
            publisher,
            runner,
            models,
        }
    }
}
