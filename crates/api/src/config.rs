use std::path::PathBuf;
use std::str::FromStr;

use oilcast_trainer::TrainConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`). Does not bound the
    /// lifetime of a progress stream once its headers are sent.
    pub request_timeout_secs: u64,
    /// Graceful shutdown timeout in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Dataset used when a training request carries no file.
    pub default_dataset_path: PathBuf,
    /// Directory holding the current model artifact.
    pub model_dir: PathBuf,
    /// Directory uploaded datasets are written to.
    pub upload_dir: PathBuf,
    /// Maximum accepted request body for uploads, in bytes.
    pub max_upload_bytes: usize,
    /// Jobs allowed to train at the same time; the rest wait as `pending`.
    pub max_concurrent_jobs: usize,
    /// Ticks buffered per stream observer before the oldest are dropped.
    pub stream_buffer: usize,
    /// Interval between keep-alive comments on idle progress streams.
    pub stream_keepalive_secs: u64,
    /// Hyper-parameters handed to the default trainer.
    pub train: TrainConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                     |
    /// |-------------------------|-----------------------------|
    /// | `HOST`                  | `0.0.0.0`                   |
    /// | `PORT`                  | `8000`                      |
    /// | `CORS_ORIGINS`          | `http://localhost:5173`     |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`                        |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `30`                        |
    /// | `DEFAULT_DATASET_PATH`  | `Volve production data.csv` |
    /// | `MODEL_DIR`             | `.`                         |
    /// | `UPLOAD_DIR`            | system temp dir             |
    /// | `MAX_UPLOAD_BYTES`      | `52428800`                  |
    /// | `MAX_CONCURRENT_JOBS`   | `2`                         |
    /// | `STREAM_BUFFER`         | `256`                       |
    /// | `STREAM_KEEPALIVE_SECS` | `15`                        |
    /// | `TRAIN_MAX_EPOCHS`      | `200`                       |
    /// | `TRAIN_PATIENCE`        | `20`                        |
    /// | `TRAIN_BATCH_SIZE`      | `32`                        |
    ///
    /// Panics on values that fail to parse so misconfiguration fails fast
    /// at startup.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let upload_dir = std::env::var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("oilcast-uploads"));

        let defaults = TrainConfig::default();
        let train = TrainConfig {
            max_epochs: env_or("TRAIN_MAX_EPOCHS", defaults.max_epochs),
            patience: env_or("TRAIN_PATIENCE", defaults.patience),
            batch_size: env_or("TRAIN_BATCH_SIZE", defaults.batch_size),
            ..defaults
        };

        Self {
            host,
            port: env_or("PORT", 8000),
            cors_origins,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 30),
            shutdown_timeout_secs: env_or("SHUTDOWN_TIMEOUT_SECS", 30),
            default_dataset_path: std::env::var("DEFAULT_DATASET_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("Volve production data.csv")),
            model_dir: std::env::var("MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".")),
            upload_dir,
            max_upload_bytes: env_or("MAX_UPLOAD_BYTES", 50 * 1024 * 1024),
            max_concurrent_jobs: env_or("MAX_CONCURRENT_JOBS", 2),
            stream_buffer: env_or("STREAM_BUFFER", oilcast_events::DEFAULT_BUFFER),
            stream_keepalive_secs: env_or("STREAM_KEEPALIVE_SECS", 15),
            train,
        }
    }
}

/// Read `key` and parse it, falling back to `default` when unset.
fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{key} must be a valid {}: {e}", std::any::type_name::<T>())),
        Err(_) => default,
    }
}
