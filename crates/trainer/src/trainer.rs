//! The training loop.
//!
//! [`Trainer`] is the seam between the job runner and the numerical code:
//! it consumes dataset bytes, reports one tick per epoch through a
//! [`ProgressSink`] and returns a [`TrainingOutcome`]. It never emits a
//! terminal tick itself; ending the job is the runner's responsibility.

use std::collections::BTreeMap;

use oilcast_core::correlation::CorrelationData;
use oilcast_core::features::{FEATURE_COUNT, HIDDEN_LAYERS};
use oilcast_core::progress::{FeatureImportance, ProgressEvent, TrainingMetrics};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::analytics;
use crate::artifact::TrainedModel;
use crate::dataset::Dataset;
use crate::error::TrainError;
use crate::network::{Adam, Network};
use crate::scaler::StandardScaler;
use crate::sink::ProgressSink;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Hyper-parameters of [`DenseTrainer`].
#[derive(Debug, Clone)]
pub struct TrainConfig {
    /// Upper bound on epochs; guarantees every run terminates.
    pub max_epochs: u32,
    /// Epochs without validation improvement before stopping early.
    pub patience: u32,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Fraction of rows held out for the final test metrics.
    pub test_fraction: f64,
    /// Fraction of the remaining training rows used for validation.
    pub validation_fraction: f64,
    pub seed: u64,
    /// Shuffles per feature for permutation importance.
    pub importance_repeats: usize,
    /// Maximum scatter points per correlation series.
    pub correlation_points: usize,
    /// Minimum usable rows required to train at all.
    pub min_rows: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            max_epochs: 200,
            patience: 20,
            batch_size: 32,
            learning_rate: 1e-3,
            test_fraction: 0.2,
            validation_fraction: 0.2,
            seed: 42,
            importance_repeats: 5,
            correlation_points: 200,
            min_rows: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// Trainer trait
// ---------------------------------------------------------------------------

/// Everything a successful run produces.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub model: TrainedModel,
    /// Loss values of the last epoch run, as a `training` tick.
    pub final_tick: ProgressEvent,
    pub metrics: TrainingMetrics,
    pub feature_importance: BTreeMap<String, FeatureImportance>,
    pub correlation: CorrelationData,
}

/// A blocking training computation.
///
/// Called on a blocking thread; implementations may take minutes.
pub trait Trainer: Send + Sync {
    fn train(&self, dataset_csv: &[u8], sink: &dyn ProgressSink) -> Result<TrainingOutcome, TrainError>;
}

// ---------------------------------------------------------------------------
// DenseTrainer
// ---------------------------------------------------------------------------

/// Trains the dense `64-32-1` network with Adam and early stopping.
#[derive(Debug, Clone, Default)]
pub struct DenseTrainer {
    config: TrainConfig,
}

impl DenseTrainer {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }
}

/// Split already-shuffled `indices` into `(head, tail)` where `tail` holds
/// `fraction` of them. Both sides are non-empty when `n > 1`.
fn split_indices(indices: &[usize], fraction: f64) -> (Vec<usize>, Vec<usize>) {
    let n = indices.len();
    let tail_len = ((n as f64 * fraction).round() as usize).clamp(usize::from(n > 1), n.saturating_sub(1));
    let head_len = n - tail_len;
    (indices[..head_len].to_vec(), indices[head_len..].to_vec())
}

impl Trainer for DenseTrainer {
    fn train(&self, dataset_csv: &[u8], sink: &dyn ProgressSink) -> Result<TrainingOutcome, TrainError> {
        let cfg = &self.config;
        let data = Dataset::from_csv_bytes(dataset_csv)?;
        if data.len() < cfg.min_rows {
            return Err(TrainError::TooFewRows {
                rows: data.len(),
                min: cfg.min_rows,
            });
        }

        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let mut order: Vec<usize> = (0..data.len()).collect();
        order.shuffle(&mut rng);

        let (fit_idx, test_idx) = split_indices(&order, cfg.test_fraction);
        let (train_idx, val_idx) = split_indices(&fit_idx, cfg.validation_fraction);
        let fit = data.select(&fit_idx);
        let train = data.select(&train_idx);
        let val = data.select(&val_idx);
        let test = data.select(&test_idx);

        let scaler = StandardScaler::fit(&fit.features);
        let train_x = scaler.transform(&train.features);
        let val_x = scaler.transform(&val.features);

        let mut network = Network::new(FEATURE_COUNT, &HIDDEN_LAYERS, &mut rng);
        let mut adam = Adam::new(&network, cfg.learning_rate);

        tracing::info!(
            rows = data.len(),
            train = train.len(),
            validation = val.len(),
            test = test.len(),
            max_epochs = cfg.max_epochs,
            "Training started",
        );

        let batch_size = cfg.batch_size.max(1);
        let mut batch_order: Vec<usize> = (0..train.len()).collect();
        let mut best: Option<(f64, Network)> = None;
        let mut since_best = 0u32;
        let mut final_tick = ProgressEvent::training(0, 0.0, 0.0, 0.0, 0.0);

        for epoch in 1..=cfg.max_epochs {
            batch_order.shuffle(&mut rng);
            let mut loss_sum = 0.0;
            let mut mae_sum = 0.0;
            for chunk in batch_order.chunks(batch_size) {
                let inputs: Vec<&Vec<f64>> = chunk.iter().map(|&i| &train_x[i]).collect();
                let targets: Vec<f64> = chunk.iter().map(|&i| train.targets[i]).collect();
                let (loss, mae) = adam.train_batch(&mut network, &inputs, &targets);
                let weight = chunk.len() as f64;
                loss_sum += loss * weight;
                mae_sum += mae * weight;
            }
            let n = train.len().max(1) as f64;
            let loss = loss_sum / n;
            let mae = mae_sum / n;

            let val_pred = network.predict_many(&val_x);
            let val_loss = analytics::mse(&val.targets, &val_pred);
            let val_mae = analytics::mae(&val.targets, &val_pred);

            if !loss.is_finite() || !val_loss.is_finite() {
                return Err(TrainError::Diverged { epoch });
            }

            final_tick = ProgressEvent::training(epoch, loss, val_loss, mae, val_mae);
            sink.emit(final_tick.clone());

            let improved = best.as_ref().map_or(true, |(b, _)| val_loss < *b);
            if improved {
                best = Some((val_loss, network.clone()));
                since_best = 0;
            } else {
                since_best += 1;
                if since_best >= cfg.patience {
                    tracing::info!(epoch, "Early stopping: validation loss stopped improving");
                    break;
                }
            }
        }

        if let Some((_, weights)) = best {
            network = weights;
        }

        let test_x = scaler.transform(&test.features);
        let test_pred = network.predict_many(&test_x);
        let metrics = analytics::regression_metrics(&test.targets, &test_pred);

        let predict_raw = |row: &[f64; FEATURE_COUNT]| network.predict(&scaler.transform_row(row));
        let feature_importance =
            analytics::permutation_importance(&test, predict_raw, cfg.importance_repeats, &mut rng);
        let correlation = analytics::correlation_data(&data, cfg.correlation_points, &mut rng);

        let mut model = TrainedModel::new(scaler.clone(), network.clone());
        model.metrics = Some(metrics);
        model.feature_importance = Some(feature_importance.clone());

        tracing::info!(
            epochs = final_tick.epoch,
            r2 = metrics.r2,
            rmse = metrics.rmse,
            "Training finished",
        );

        Ok(TrainingOutcome {
            model,
            final_tick,
            metrics,
            feature_importance,
            correlation,
        })
    }
}
