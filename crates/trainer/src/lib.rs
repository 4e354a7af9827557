//! Model training for oil production forecasting.
//!
//! The trainer knows nothing about transport. It reports progress
//! through the [`ProgressSink`] trait and returns a [`TrainingOutcome`].
//! Whoever runs it decides where ticks go.

pub mod analytics;
pub mod artifact;
pub mod dataset;
pub mod error;
pub mod network;
pub mod scaler;
pub mod sink;
pub mod trainer;

pub use artifact::{ModelStore, TrainedModel};
pub use error::TrainError;
pub use sink::ProgressSink;
pub use trainer::{DenseTrainer, TrainConfig, Trainer, TrainingOutcome};
