//! Background execution of training jobs.
//!
//! [`JobRunner::spawn`] binds one tokio task to a job for its whole
//! lifetime. The task owns the job's tick sequence: it publishes every
//! training tick, decides the terminal tick and closes the job's progress
//! channel. Nothing is ever returned to the caller that started the job.

use std::path::PathBuf;
use std::sync::Arc;

use oilcast_core::job::JobStatus;
use oilcast_core::progress::ProgressEvent;
use oilcast_core::types::JobId;
use oilcast_events::ProgressPublisher;
use oilcast_trainer::{ModelStore, Trainer, TrainingOutcome};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::engine::progress::{ChannelSink, TickSequencer};
use crate::engine::registry::JobRegistry;

/// Message published when the trainer thread panics.
const PANIC_MESSAGE: &str = "Training crashed unexpectedly";

/// Runs training jobs on the blocking pool with bounded concurrency.
///
/// Jobs beyond `max_concurrent` wait for a permit and stay `pending`.
pub struct JobRunner {
    registry: Arc<JobRegistry>,
    publisher: Arc<ProgressPublisher>,
    trainer: Arc<dyn Trainer>,
    models: ModelStore,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
}

impl JobRunner {
    pub fn new(
        registry: Arc<JobRegistry>,
        publisher: Arc<ProgressPublisher>,
        trainer: Arc<dyn Trainer>,
        models: ModelStore,
        max_concurrent: usize,
    ) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            registry,
            publisher,
            trainer,
            models,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// Start `job_id` in the background.
    ///
    /// The job's progress channel is opened before this returns, so an
    /// observer that subscribes right after the job is announced sees
    /// every tick.
    pub fn spawn(self: &Arc<Self>, job_id: JobId, dataset_path: PathBuf) -> JoinHandle<()> {
        self.publisher.open(job_id);
        let runner = Arc::clone(self);
        tokio::spawn(async move {
            runner.run(job_id, dataset_path).await;
            runner.publisher.close(job_id);
        })
    }

    /// Jobs currently holding a run slot.
    pub fn active_jobs(&self) -> usize {
        self.max_concurrent - self.permits.available_permits()
    }

    async fn run(&self, job_id: JobId, dataset_path: PathBuf) {
        let Ok(_permit) = Arc::clone(&self.permits).acquire_owned().await else {
            self.fail(job_id, None, "Job runner is shutting down").await;
            return;
        };

        let bytes = match tokio::fs::read(&dataset_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(
                    job_id = %job_id,
                    path = %dataset_path.display(),
                    error = %e,
                    "Failed to read dataset",
                );
                self.fail(job_id, None, format!("Failed to read dataset: {e}"))
                    .await;
                return;
            }
        };

        if let Err(e) = self
            .registry
            .set_status(job_id, JobStatus::Running, None)
            .await
        {
            tracing::error!(job_id = %job_id, error = %e, "Cannot mark job running, abandoning it");
            return;
        }
        tracing::info!(job_id = %job_id, bytes = bytes.len(), "Training job started");

        let (sink, mut ticks) = ChannelSink::new();
        let trainer = Arc::clone(&self.trainer);
        let training = tokio::task::spawn_blocking(move || trainer.train(&bytes, &sink));

        let mut sequencer = TickSequencer::new(job_id);
        while let Some(tick) = ticks.recv().await {
            if let Some(tick) = sequencer.accept(tick) {
                let observers = self.publisher.publish(job_id, tick);
                tracing::debug!(
                    job_id = %job_id,
                    epoch = sequencer.last().map_or(0, |t| t.epoch),
                    observers,
                    "Progress tick",
                );
            }
        }

        match training.await {
            Ok(Ok(outcome)) => self.complete(job_id, sequencer.last(), outcome).await,
            Ok(Err(e)) => {
                tracing::error!(job_id = %job_id, error = %e, "Training failed");
                self.fail(job_id, sequencer.last(), e.to_string()).await;
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Training task panicked");
                self.fail(job_id, sequencer.last(), PANIC_MESSAGE).await;
            }
        }
    }

    async fn complete(&self, job_id: JobId, last: Option<&ProgressEvent>, outcome: TrainingOutcome) {
        let TrainingOutcome {
            model,
            final_tick,
            metrics,
            feature_importance,
            correlation,
        } = outcome;

        let store = self.models.clone();
        let saved = tokio::task::spawn_blocking(move || store.save(&model)).await;
        let save_error = match saved {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("Failed to save trained model: {e}")),
            Err(e) => Some(format!("Failed to save trained model: {e}")),
        };
        if let Some(message) = save_error {
            tracing::error!(job_id = %job_id, error = %message, "Model artifact not saved");
            self.fail(job_id, last, message).await;
            return;
        }

        if let Err(e) = self
            .registry
            .set_status(job_id, JobStatus::Completed, None)
            .await
        {
            tracing::error!(job_id = %job_id, error = %e, "Cannot mark job completed, no terminal tick sent");
            return;
        }

        let base = last.unwrap_or(&final_tick);
        let tick = ProgressEvent::completed(base, metrics, feature_importance, correlation);
        let observers = self.publisher.publish(job_id, tick);
        tracing::info!(
            job_id = %job_id,
            epoch = base.epoch,
            r2 = metrics.r2,
            observers,
            "Training job completed",
        );
    }

    /// Mark the job failed and publish its single error tick.
    async fn fail(&self, job_id: JobId, last: Option<&ProgressEvent>, message: impl Into<String>) {
        let message = message.into();
        if let Err(e) = self
            .registry
            .set_status(job_id, JobStatus::Failed, Some(message.clone()))
            .await
        {
            tracing::error!(job_id = %job_id, error = %e, "Cannot mark job failed, no terminal tick sent");
            return;
        }
        let observers = self
            .publisher
            .publish(job_id, ProgressEvent::failed(last, message));
        tracing::info!(job_id = %job_id, observers, "Training job failed");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::{mpsc, Mutex};
    use std::time::Duration;

    use oilcast_core::correlation::CorrelationData;
    use oilcast_core::features::FEATURE_COUNT;
    use oilcast_core::progress::{TickStatus, TrainingMetrics};
    use oilcast_events::{Delivery, Subscription};
    use oilcast_trainer::network::Network;
    use oilcast_trainer::scaler::StandardScaler;
    use oilcast_trainer::{ProgressSink, TrainError, TrainedModel};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    enum Script {
        Succeed(u32),
        FailAfter(u32),
        Panic,
        Misbehave,
        /// Blocks until the gate is released, then succeeds after one epoch.
        Gated(Mutex<mpsc::Receiver<()>>),
    }

    struct ScriptedTrainer(Script);

    fn tick(epoch: u32) -> ProgressEvent {
        ProgressEvent::training(epoch, 1.0 / epoch as f64, 1.1 / epoch as f64, 0.5, 0.6)
    }

    fn outcome(final_tick: ProgressEvent) -> TrainingOutcome {
        let mut rng = StdRng::seed_from_u64(1);
        let metrics = TrainingMetrics {
            r2: 0.92,
            mae: 1.0,
            mse: 2.0,
            rmse: 2.0_f64.sqrt(),
        };
        TrainingOutcome {
            model: TrainedModel::new(
                StandardScaler::fit(&[[0.0; FEATURE_COUNT], [1.0; FEATURE_COUNT]]),
                Network::new(FEATURE_COUNT, &[2], &mut rng),
            ),
            final_tick,
            metrics,
            feature_importance: BTreeMap::new(),
            correlation: CorrelationData::ByFeature(BTreeMap::new()),
        }
    }

    impl Trainer for ScriptedTrainer {
        fn train(&self, _csv: &[u8], sink: &dyn ProgressSink) -> Result<TrainingOutcome, TrainError> {
            match &self.0 {
                Script::Succeed(epochs) => {
                    for epoch in 1..=*epochs {
                        sink.emit(tick(epoch));
                    }
                    Ok(outcome(tick(*epochs)))
                }
                Script::FailAfter(epochs) => {
                    for epoch in 1..=*epochs {
                        sink.emit(tick(epoch));
                    }
                    Err(TrainError::Diverged { epoch: *epochs })
                }
                Script::Panic => panic!("trainer exploded"),
                Script::Misbehave => {
                    sink.emit(tick(2));
                    sink.emit(tick(1));
                    sink.emit(ProgressEvent::failed(None, "rogue"));
                    sink.emit(tick(3));
                    Ok(outcome(tick(3)))
                }
                Script::Gated(gate) => {
                    let _ = gate
                        .lock()
                        .unwrap()
                        .recv_timeout(Duration::from_secs(10));
                    sink.emit(tick(1));
                    Ok(outcome(tick(1)))
                }
            }
        }
    }

    struct Harness {
        registry: Arc<JobRegistry>,
        publisher: Arc<ProgressPublisher>,
        runner: Arc<JobRunner>,
        dir: tempfile::TempDir,
    }

    fn harness(script: Script) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(JobRegistry::new());
        let publisher = Arc::new(ProgressPublisher::default());
        let runner = Arc::new(JobRunner::new(
            Arc::clone(&registry),
            Arc::clone(&publisher),
            Arc::new(ScriptedTrainer(script)),
            ModelStore::new(dir.path().join("models")),
            1,
        ));
        Harness {
            registry,
            publisher,
            runner,
            dir,
        }
    }

    fn dataset(h: &Harness) -> PathBuf {
        let path = h.dir.path().join("data.csv");
        std::fs::write(&path, "irrelevant").unwrap();
        path
    }

    async fn drain(mut sub: Subscription) -> Vec<ProgressEvent> {
        let mut ticks = Vec::new();
        loop {
            match sub.next().await {
                Delivery::Tick(t) => ticks.push(t),
                Delivery::Lagged(_) => {}
                Delivery::Closed => return ticks,
            }
        }
    }

    #[tokio::test]
    async fn successful_job_ends_with_one_completed_tick() {
        let h = harness(Script::Succeed(3));
        let job = h.registry.create("data.csv").await;

        let handle = h.runner.spawn(job.id, dataset(&h));
        let sub = h.publisher.subscribe(job.id).expect("channel open after spawn");
        handle.await.unwrap();
        let ticks = drain(sub).await;

        let epochs: Vec<u32> = ticks.iter().map(|t| t.epoch).collect();
        assert_eq!(epochs, vec![1, 2, 3, 3]);
        let last = ticks.last().unwrap();
        assert_eq!(last.status, TickStatus::Completed);
        assert_eq!(last.metrics.map(|m| m.r2), Some(0.92));
        assert_eq!(ticks.iter().filter(|t| t.is_terminal()).count(), 1);

        assert_eq!(h.registry.get(job.id).await.unwrap().status, JobStatus::Completed);
        assert!(ModelStore::new(h.dir.path().join("models")).exists());
        assert!(!h.publisher.is_open(job.id));
    }

    #[tokio::test]
    async fn trainer_error_fails_job_with_last_losses() {
        let h = harness(Script::FailAfter(2));
        let job = h.registry.create("data.csv").await;

        let handle = h.runner.spawn(job.id, dataset(&h));
        let sub = h.publisher.subscribe(job.id).unwrap();
        handle.await.unwrap();
        let ticks = drain(sub).await;

        let last = ticks.last().unwrap();
        assert_eq!(last.status, TickStatus::Error);
        assert_eq!(last.epoch, 2);
        assert_eq!(last.loss, tick(2).loss);
        assert!(last.error.as_deref().unwrap().contains("diverged"));

        let job = h.registry.get(job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.is_some());
    }

    #[tokio::test]
    async fn panicking_trainer_fails_job() {
        let h = harness(Script::Panic);
        let job = h.registry.create("data.csv").await;

        let handle = h.runner.spawn(job.id, dataset(&h));
        let sub = h.publisher.subscribe(job.id).unwrap();
        handle.await.unwrap();
        let ticks = drain(sub).await;

        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].status, TickStatus::Error);
        assert_eq!(ticks[0].error.as_deref(), Some(PANIC_MESSAGE));
        assert_eq!(h.registry.get(job.id).await.unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn unreadable_dataset_fails_pending_job() {
        let h = harness(Script::Succeed(1));
        let job = h.registry.create("missing.csv").await;

        let handle = h.runner.spawn(job.id, h.dir.path().join("missing.csv"));
        let sub = h.publisher.subscribe(job.id).unwrap();
        handle.await.unwrap();
        let ticks = drain(sub).await;

        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].epoch, 0);
        assert_eq!(ticks[0].status, TickStatus::Error);
        let job = h.registry.get(job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().starts_with("Failed to read dataset"));
    }

    #[tokio::test]
    async fn misordered_trainer_ticks_are_filtered() {
        let h = harness(Script::Misbehave);
        let job = h.registry.create("data.csv").await;

        let handle = h.runner.spawn(job.id, dataset(&h));
        let sub = h.publisher.subscribe(job.id).unwrap();
        handle.await.unwrap();
        let ticks = drain(sub).await;

        let summary: Vec<(u32, TickStatus)> = ticks.iter().map(|t| (t.epoch, t.status)).collect();
        assert_eq!(
            summary,
            vec![
                (2, TickStatus::Training),
                (3, TickStatus::Training),
                (3, TickStatus::Completed),
            ]
        );
    }

    #[tokio::test]
    async fn finished_runner_frees_its_slot() {
        let h = harness(Script::Succeed(1));
        let job = h.registry.create("data.csv").await;

        h.runner.spawn(job.id, dataset(&h)).await.unwrap();

        assert_eq!(h.runner.active_jobs(), 0);
    }

    async fn wait_for_status(h: &Harness, id: JobId, status: JobStatus) {
        for _ in 0..200 {
            if h.registry.get(id).await.unwrap().status == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} never reached {status:?}");
    }

    #[tokio::test]
    async fn job_beyond_capacity_stays_pending_until_a_slot_frees() {
        let (gate, rx) = mpsc::channel();
        let h = harness(Script::Gated(Mutex::new(rx)));
        let first = h.registry.create("first.csv").await;
        let second = h.registry.create("second.csv").await;

        let first_handle = h.runner.spawn(first.id, dataset(&h));
        wait_for_status(&h, first.id, JobStatus::Running).await;
        let second_handle = h.runner.spawn(second.id, dataset(&h));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(h.registry.get(second.id).await.unwrap().status, JobStatus::Pending);
        assert_eq!(h.runner.active_jobs(), 1);

        gate.send(()).unwrap();
        first_handle.await.unwrap();
        wait_for_status(&h, second.id, JobStatus::Running).await;
        gate.send(()).unwrap();
        second_handle.await.unwrap();

        assert_eq!(h.registry.get(first.id).await.unwrap().status, JobStatus::Completed);
        assert_eq!(h.registry.get(second.id).await.unwrap().status, JobStatus::Completed);
        assert_eq!(h.runner.active_jobs(), 0);
    }

    #[tokio::test]
    async fn unregistered_job_is_abandoned_without_a_terminal_tick() {
        let h = harness(Script::Succeed(2));
        let stray = uuid::Uuid::new_v4();

        let handle = h.runner.spawn(stray, dataset(&h));
        let sub = h.publisher.subscribe(stray).unwrap();
        handle.await.unwrap();

        assert!(drain(sub).await.is_empty());
        assert!(!h.publisher.is_open(stray));
        assert_eq!(h.runner.active_jobs(), 0);
        assert!(!ModelStore::new(h.dir.path().join("models")).exists());
    }
}
