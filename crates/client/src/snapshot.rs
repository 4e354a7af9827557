//! Durable cache of the latest reconciled history.
//!
//! There is one record per store. Writes replace it wholesale; field-level
//! merging happens in the [`Reconciler`](crate::reconcile::Reconciler) or in
//! [`SnapshotStore::update`] before the write.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use oilcast_core::correlation::CorrelationData;
use oilcast_core::progress::{ProgressEvent, TrainingMetrics};
use oilcast_core::types::Timestamp;
use serde::{Deserialize, Serialize};

/// Fixed key of the persisted record.
pub const SNAPSHOT_KEY: &str = "training_snapshot";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub progress_history: Vec<ProgressEvent>,
    pub correlation_data: Option<CorrelationData>,
    pub final_metrics: Option<TrainingMetrics>,
    pub timestamp: Timestamp,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            progress_history: Vec::new(),
            correlation_data: None,
            final_metrics: None,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Partial snapshot for [`SnapshotStore::update`]. `None` keeps the stored
/// value.
#[derive(Debug, Clone, Default)]
pub struct SnapshotPatch {
    pub progress_history: Option<Vec<ProgressEvent>>,
    pub correlation_data: Option<CorrelationData>,
    pub final_metrics: Option<TrainingMetrics>,
    pub timestamp: Option<Timestamp>,
}

impl SnapshotPatch {
    fn apply_to(self, mut base: Snapshot) -> Snapshot {
        if let Some(history) = self.progress_history {
            base.progress_history = history;
        }
        if let Some(correlation) = self.correlation_data {
            base.correlation_data = Some(correlation);
        }
        if let Some(metrics) = self.final_metrics {
            base.final_metrics = Some(metrics);
        }
        if let Some(timestamp) = self.timestamp {
            base.timestamp = timestamp;
        }
        base
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Failed to write snapshot to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Single-slot persistence for the client's latest view.
///
/// Not coordinated across writers: concurrent `update` calls race and the
/// last write wins.
pub trait SnapshotStore {
    /// Overwrite the stored record.
    fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError>;

    /// The stored record, or `None` if it is missing or unreadable.
    fn load(&self) -> Option<Snapshot>;

    /// Load, shallow-merge `patch` over the result (or an empty snapshot),
    /// then save.
    fn update(&self, patch: SnapshotPatch) -> Result<Snapshot, SnapshotError> {
        let base = self.load().unwrap_or_else(Snapshot::empty);
        let merged = patch.apply_to(base);
        self.save(&merged)?;
        Ok(merged)
    }
}

fn decode(raw: &str, origin: &str) -> Option<Snapshot> {
    match serde_json::from_str(raw) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            tracing::warn!(origin, error = %e, "Discarding corrupt snapshot");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// FileSnapshotStore
// ---------------------------------------------------------------------------

/// Stores the snapshot as `training_snapshot.json` in a directory.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(format!("{SNAPSHOT_KEY}.json")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        let io_err = |source| SnapshotError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(io_err)?;
        }
        std::fs::write(&self.path, json).map_err(io_err)
    }

    fn load(&self) -> Option<Snapshot> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Snapshot unreadable");
                return None;
            }
        };
        decode(&raw, &self.path.display().to_string())
    }
}

// ---------------------------------------------------------------------------
// MemorySnapshotStore
// ---------------------------------------------------------------------------

/// In-process store holding the serialized record.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    record: Mutex<Option<String>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored record with raw text, valid or not.
    pub fn put_raw(&self, raw: impl Into<String>) {
        *self.record.lock().unwrap_or_else(PoisonError::into_inner) = Some(raw.into());
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        let json = serde_json::to_string(snapshot)?;
        self.put_raw(json);
        Ok(())
    }

    fn load(&self) -> Option<Snapshot> {
        let record = self.record.lock().unwrap_or_else(PoisonError::into_inner);
        decode(record.as_deref()?, "memory")
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    fn sample() -> Snapshot {
        Snapshot {
            progress_history: vec![
                ProgressEvent::training(0, 120.5, 130.0, 9.0, 9.5),
                ProgressEvent::training(1, 98.25, 101.0, 8.0, 8.5),
            ],
            correlation_data: None,
            final_metrics: Some(TrainingMetrics {
                r2: 0.92,
                mae: 10.0,
                mse: 150.0,
                rmse: 12.5,
            }),
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        let snapshot = sample();

        store.save(&snapshot).unwrap();

        assert_eq!(store.load(), Some(snapshot));
        assert!(store.path().ends_with("training_snapshot.json"));
    }

    #[test]
    fn arbitrary_floats_load_back_bit_for_bit() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut value = || rng.random::<f64>() * 10f64.powi(rng.random_range(-12..12));
        let progress_history: Vec<ProgressEvent> = (0..500)
            .map(|epoch| ProgressEvent::training(epoch, value(), value(), value(), value()))
            .collect();
        let snapshot = Snapshot {
            progress_history,
            correlation_data: None,
            final_metrics: Some(TrainingMetrics {
                r2: value(),
                mae: value(),
                mse: value(),
                rmse: value(),
            }),
            timestamp: chrono::Utc::now(),
        };

        let memory = MemorySnapshotStore::new();
        memory.save(&snapshot).unwrap();
        assert_eq!(memory.load().as_ref(), Some(&snapshot));

        let dir = tempfile::tempdir().unwrap();
        let file = FileSnapshotStore::new(dir.path());
        file.save(&snapshot).unwrap();
        assert_eq!(file.load(), Some(snapshot));
    }

    #[test]
    fn missing_record_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();

        assert_eq!(FileSnapshotStore::new(dir.path()).load(), None);
        assert_eq!(MemorySnapshotStore::new().load(), None);
    }

    #[test]
    fn corrupt_record_degrades_to_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        std::fs::write(store.path(), "{\"progressHistory\": [").unwrap();

        assert_eq!(store.load(), None);

        let memory = MemorySnapshotStore::new();
        memory.put_raw("not json");
        assert_eq!(memory.load(), None);
    }

    #[test]
    fn save_replaces_the_whole_record() {
        let store = MemorySnapshotStore::new();
        store.save(&sample()).unwrap();

        let replacement = Snapshot::empty();
        store.save(&replacement).unwrap();

        let loaded = store.load().unwrap();
        assert!(loaded.progress_history.is_empty());
        assert_eq!(loaded.final_metrics, None);
    }

    #[test]
    fn update_merges_over_stored_value() {
        let store = MemorySnapshotStore::new();
        let original = sample();
        store.save(&original).unwrap();

        let updated = store
            .update(SnapshotPatch {
                progress_history: Some(vec![ProgressEvent::training(5, 1.0, 1.0, 1.0, 1.0)]),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(updated.progress_history.len(), 1);
        assert_eq!(updated.final_metrics, original.final_metrics);
        assert_eq!(store.load(), Some(updated));
    }

    #[test]
    fn update_on_empty_store_starts_from_empty_snapshot() {
        let store = MemorySnapshotStore::new();

        let updated = store
            .update(SnapshotPatch {
                final_metrics: Some(TrainingMetrics {
                    r2: 0.5,
                    mae: 1.0,
                    mse: 1.0,
                    rmse: 1.0,
                }),
                ..Default::default()
            })
            .unwrap();

        assert!(updated.progress_history.is_empty());
        assert_eq!(updated.final_metrics.map(|m| m.r2), Some(0.5));
    }
}
