use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{
    collaborators::{Notification, Notifier},
    db::{Database, JobClaim},
    models::{
        ModelMetrics, TrainingConfig, TrainingJob, TrainingJobStatus, TrainingJobType,
        TrainingSample,
    },
    thresholds::AdaptiveThresholdController,
};

use super::trainer::{ModelTrainer, TrainingOutcome};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    Accepted { job_id: String },
    Rejected { existing_job_id: String },
}

/// Creates training jobs (at most one pending or running at a time) and runs
/// them on their own task, off the scoring path.
#[derive(Clone)]
pub struct TrainingService {
    db: Database,
    trainer: Arc<dyn ModelTrainer>,
    thresholds: Arc<AdaptiveThresholdController>,
    notifier: Arc<dyn Notifier>,
    model_version: String,
    running: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl TrainingService {
    pub fn new(
        db: Database,
        trainer: Arc<dyn ModelTrainer>,
        thresholds: Arc<AdaptiveThresholdController>,
        notifier: Arc<dyn Notifier>,
        model_version: String,
    ) -> Self {
        Self {
            db,
            trainer,
            thresholds,
            notifier,
            model_version,
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn model_version(&self) -> &str {
        &self.model_version
    }

    /// Starts a job over the current labeled corpus unless one is already
    /// pending or running. Returns as soon as the job row exists.
    pub async fn trigger(
        &self,
        job_type: TrainingJobType,
        config: TrainingConfig,
    ) -> Result<TriggerOutcome> {
        let samples = self
            .db
            .labeled_corpus()
            .await
            .context("failed to load labeled corpus")?;
        let since = self.db.last_completed_training_at().await?;
        let new_labels = self.db.count_labels_since(since).await?;

        let job = TrainingJob {
            id: Uuid::new_v4().to_string(),
            job_type,
            status: TrainingJobStatus::Pending,
            config,
            training_samples: samples.len() as u64,
            new_labels,
            final_metrics: None,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };

        match self.db.create_training_job_if_idle(&job).await? {
            JobClaim::Busy { existing_job_id } => {
                log_info!(
                    "{} rejected, job {existing_job_id} is still active",
                    job_type.as_str()
                );
                Ok(TriggerOutcome::Rejected { existing_job_id })
            }
            JobClaim::Created => {
                log_info!(
                    "{} job {} created with {} samples ({} new labels)",
                    job_type.as_str(),
                    job.id,
                    job.training_samples,
                    job.new_labels
                );

                let job_id = job.id.clone();
                let service = self.clone();
                let handle = tokio::spawn(async move { service.execute(job, samples).await });

                let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
                running.retain(|_, handle| !handle.is_finished());
                running.insert(job_id.clone(), handle);

                Ok(TriggerOutcome::Accepted { job_id })
            }
        }
    }

    /// Waits for a job started by this service to finish and returns its
    /// final row. Jobs started elsewhere are returned as they are now.
    pub async fn wait_for(&self, job_id: &str) -> Result<Option<TrainingJob>> {
        let handle = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(job_id);

        if let Some(handle) = handle {
            handle
                .await
                .with_context(|| format!("training task for job {job_id} failed to join"))?;
        }

        self.db.get_training_job(job_id).await
    }

    async fn execute(&self, job: TrainingJob, samples: Vec<TrainingSample>) {
        let job_id = job.id.clone();

        let status = match self.run_job(job, samples).await {
            Ok(status) => status,
            Err(err) => {
                log_error!("training job {job_id} bookkeeping failed: {err:?}");
                // The row must leave pending/running or every later trigger is refused.
                if let Err(fail_err) = self
                    .db
                    .fail_training_job(&job_id, &format!("{err:#}"), Utc::now())
                    .await
                {
                    log_error!("failed to mark training job {job_id} failed: {fail_err:?}");
                }
                TrainingJobStatus::Failed
            }
        };

        self.notifier
            .notify(Notification::TrainingFinished { job_id, status });
    }

    async fn run_job(
        &self,
        job: TrainingJob,
        samples: Vec<TrainingSample>,
    ) -> Result<TrainingJobStatus> {
        self.db.mark_training_job_running(&job.id, Utc::now()).await?;

        let trainer = Arc::clone(&self.trainer);
        let config = job.config.clone();
        let sample_size = samples.len() as u64;
        let result = tokio::task::spawn_blocking(move || trainer.train(&samples, &config)).await;

        let outcome: Result<TrainingOutcome, String> = match result {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(err)) => Err(err.to_string()),
            Err(join_err) => Err(join_err.to_string()),
        };

        match outcome {
            Err(message) => {
                log_warn!("training job {} failed: {message}", job.id);
                self.db
                    .fail_training_job(&job.id, &message, Utc::now())
                    .await?;
                Ok(TrainingJobStatus::Failed)
            }
            Ok(outcome) => {
                let completed_at = Utc::now();
                self.db
                    .insert_model_metrics(&ModelMetrics {
                        id: Uuid::new_v4().to_string(),
                        model_version: self.model_version.clone(),
                        metrics: outcome.metrics,
                        sample_size,
                        evaluated_at: completed_at,
                    })
                    .await?;
                self.db
                    .complete_training_job(&job.id, outcome.metrics, completed_at)
                    .await?;

                log_info!(
                    "training job {} completed: accuracy {:.3}, f1 {:.3}",
                    job.id,
                    outcome.metrics.accuracy,
                    outcome.metrics.f1_score
                );

                if let Some(threshold) = outcome.calibrated_threshold {
                    if let Err(err) = self.thresholds.calibrate(threshold).await {
                        log_error!("failed to apply calibrated threshold {threshold}: {err:?}");
                    }
                }

                Ok(TrainingJobStatus::Completed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::bail;

    use super::*;
    use crate::{
        collaborators::LogNotifier,
        config::AdaptationConfig,
        models::EvaluationMetrics,
        thresholds::ThresholdStore,
    };

    struct FixedTrainer {
        delay: Duration,
        fail_with: Option<&'static str>,
    }

    impl ModelTrainer for FixedTrainer {
        fn train(
            &self,
            _samples: &[TrainingSample],
            _config: &TrainingConfig,
        ) -> Result<TrainingOutcome> {
            std::thread::sleep(self.delay);
            if let Some(message) = self.fail_with {
                bail!(message);
            }
            Ok(TrainingOutcome {
                metrics: EvaluationMetrics {
                    accuracy: 0.9,
                    precision: 0.8,
                    recall: 0.7,
                    f1_score: 0.75,
                    map_score: None,
                },
                calibrated_threshold: Some(0.5),
            })
        }
    }

    async fn service(
        dir: &tempfile::TempDir,
        trainer: FixedTrainer,
    ) -> (TrainingService, Arc<AdaptiveThresholdController>, Database) {
        let db = Database::new(dir.path().join("training.db")).unwrap();
        let store = Arc::new(ThresholdStore::load(&db).await.unwrap());
        let thresholds = Arc::new(AdaptiveThresholdController::new(
            store,
            db.clone(),
            AdaptationConfig::default(),
        ));
        let service = TrainingService::new(
            db.clone(),
            Arc::new(trainer),
            Arc::clone(&thresholds),
            Arc::new(LogNotifier),
            "test-model".into(),
        );
        (service, thresholds, db)
    }

    #[tokio::test]
    async fn second_trigger_while_active_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = FixedTrainer {
            delay: Duration::from_millis(300),
            fail_with: None,
        };
        let (service, _, db) = service(&dir, trainer).await;

        let first = service
            .trigger(TrainingJobType::ManualFineTune, TrainingConfig::manual())
            .await
            .unwrap();
        let TriggerOutcome::Accepted { job_id } = first else {
            panic!("first trigger should be accepted");
        };

        let second = service
            .trigger(TrainingJobType::ManualFineTune, TrainingConfig::manual())
            .await
            .unwrap();
        assert_eq!(
            second,
            TriggerOutcome::Rejected {
                existing_job_id: job_id.clone()
            }
        );

        let finished = service.wait_for(&job_id).await.unwrap().unwrap();
        assert_eq!(finished.status, TrainingJobStatus::Completed);
        assert_eq!(db.list_training_jobs(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn completion_records_metrics_and_calibrates() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = FixedTrainer {
            delay: Duration::ZERO,
            fail_with: None,
        };
        let (service, thresholds, db) = service(&dir, trainer).await;

        let TriggerOutcome::Accepted { job_id } = service
            .trigger(TrainingJobType::NightlyTraining, TrainingConfig::nightly())
            .await
            .unwrap()
        else {
            panic!("trigger should be accepted");
        };
        let job = service.wait_for(&job_id).await.unwrap().unwrap();

        assert_eq!(job.final_metrics.unwrap().accuracy, 0.9);
        assert!(job.started_at.is_some() && job.completed_at.is_some());

        let latest = db.latest_model_metrics("test-model").await.unwrap().unwrap();
        assert_eq!(latest.metrics.f1_score, 0.75);
        assert_eq!(thresholds.store().snapshot().damage_threshold, 0.5);
    }

    #[tokio::test]
    async fn failure_is_stored_verbatim_without_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = FixedTrainer {
            delay: Duration::ZERO,
            fail_with: Some("CUDA out of memory"),
        };
        let (service, thresholds, db) = service(&dir, trainer).await;

        let TriggerOutcome::Accepted { job_id } = service
            .trigger(TrainingJobType::EmergencyRetraining, TrainingConfig::emergency())
            .await
            .unwrap()
        else {
            panic!("trigger should be accepted");
        };
        let job = service.wait_for(&job_id).await.unwrap().unwrap();

        assert_eq!(job.status, TrainingJobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("CUDA out of memory"));
        assert!(job.final_metrics.is_none());
        assert!(db.latest_model_metrics("test-model").await.unwrap().is_none());
        assert_eq!(thresholds.store().snapshot().version, 1);

        // A failed job no longer blocks new ones.
        let next = service
            .trigger(TrainingJobType::ManualFineTune, TrainingConfig::manual())
            .await
            .unwrap();
        assert!(matches!(next, TriggerOutcome::Accepted { .. }));
    }

    #[tokio::test]
    async fn bookkeeping_failure_releases_the_single_flight_slot() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = FixedTrainer {
            delay: Duration::from_millis(300),
            fail_with: None,
        };
        let (service, _, db) = service(&dir, trainer).await;

        let TriggerOutcome::Accepted { job_id } = service
            .trigger(TrainingJobType::ManualFineTune, TrainingConfig::manual())
            .await
            .unwrap()
        else {
            panic!("trigger should be accepted");
        };

        // Storing the metrics row fails while the trainer is still busy.
        db.execute(|conn| {
            conn.execute_batch("DROP TABLE model_metrics")?;
            Ok(())
        })
        .await
        .unwrap();

        let job = service.wait_for(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, TrainingJobStatus::Failed);
        assert!(job.error_message.is_some());
        assert!(job.final_metrics.is_none());

        let next = service
            .trigger(TrainingJobType::ManualFineTune, TrainingConfig::manual())
            .await
            .unwrap();
        assert!(matches!(next, TriggerOutcome::Accepted { .. }));
    }
}
