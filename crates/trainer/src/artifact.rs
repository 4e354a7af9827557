//! Persisted model artifact.
//!
//! A trained model is a single JSON document holding the network weights,
//! the fitted scaler and the metadata served by the model info endpoint.

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use oilcast_core::features::{FEATURE_NAMES, TARGET_NAME};
use oilcast_core::progress::{FeatureImportance, TrainingMetrics};
use oilcast_core::types::Timestamp;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::TrainError;
use crate::network::Network;
use crate::scaler::StandardScaler;

/// File name of the artifact inside the model directory.
pub const MODEL_FILE_NAME: &str = "model.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainedModel {
    pub feature_names: Vec<String>,
    pub target_name: String,
    pub scaler: StandardScaler,
    pub network: Network,
    pub metrics: Option<TrainingMetrics>,
    pub feature_importance: Option<BTreeMap<String, FeatureImportance>>,
    pub trained_at: Timestamp,
}

impl TrainedModel {
    /// Wrap a fitted scaler and network with the standard feature metadata.
    pub fn new(scaler: StandardScaler, network: Network) -> Self {
        Self {
            feature_names: FEATURE_NAMES.iter().map(|f| f.to_string()).collect(),
            target_name: TARGET_NAME.to_string(),
            scaler,
            network,
            metrics: None,
            feature_importance: None,
            trained_at: chrono::Utc::now(),
        }
    }

    /// Predict from raw feature values in `feature_names` order.
    pub fn predict(&self, features: &[f64]) -> Result<f64, TrainError> {
        if features.len() != self.network.input_size() {
            return Err(TrainError::FeatureMismatch {
                expected: self.network.input_size(),
                actual: features.len(),
            });
        }
        Ok(self.network.predict(&self.scaler.transform_row(features)))
    }
}

/// Directory-backed store for the single current model artifact.
#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(MODEL_FILE_NAME)
    }

    pub fn exists(&self) -> bool {
        self.path().is_file()
    }

    /// Load the current model, or `None` if none has been trained yet.
    pub fn load(&self) -> Result<Option<TrainedModel>, TrainError> {
        let bytes = match fs::read(self.path()) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Replace the current model.
    ///
    /// Each save writes its own uniquely named temp file in the model
    /// directory and renames it into place, so readers never see a partial
    /// artifact and concurrent saves never share a temp path. The last
    /// rename wins.
    pub fn save(&self, model: &TrainedModel) -> Result<(), TrainError> {
        fs::create_dir_all(&self.dir)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer(&mut tmp, model)?;
        tmp.flush()?;
        tmp.persist(self.path()).map_err(|e| e.error)?;
        tracing::info!(path = %self.path().display(), "Model artifact saved");
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
