//! Watcher configuration loaded from environment variables.

use std::path::PathBuf;

use crate::error::ClientError;

#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Base URL of the oilcast API, e.g. `http://localhost:8000`.
    pub backend_url: String,
    /// Directory holding `training_snapshot.json`.
    pub snapshot_dir: PathBuf,
    /// CSV to upload; the server's default dataset is used when unset.
    pub dataset_path: Option<PathBuf>,
}

impl WatchConfig {
    /// Load from the environment.
    ///
    /// | Variable         | Required | Default |
    /// |------------------|----------|---------|
    /// | `BACKEND_URL`    | yes      | --      |
    /// | `SNAPSHOT_DIR`   | no       | `.`     |
    /// | `DATASET_PATH`   | no       | --      |
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ClientError> {
        let backend_url = lookup("BACKEND_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ClientError::Config("BACKEND_URL is required".into()))?;

        Ok(Self {
            backend_url,
            snapshot_dir: lookup("SNAPSHOT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            dataset_path: lookup("DATASET_PATH")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        })
    }
}
