//! Before/after vehicle damage detection with an active-learning review loop.
//!
//! [`DamageLens`] owns the process-wide services: the SQLite worker, the
//! versioned thresholds, the review router, the training service and the
//! scheduler. [`pipeline::DamagePipeline`] runs a single image pair through
//! normalization, localization, the signal scorers and the ensemble.

pub mod collaborators;
pub mod config;
pub mod db;
pub mod ensemble;
pub mod error;
pub mod localize;
pub mod metrics;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod review;
pub mod scheduler;
pub mod scoring;
pub mod thresholds;
pub mod training;
pub mod utils;

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use log::{info, warn};
use tokio::sync::Mutex;

use collaborators::{ArtifactStore, FsArtifactStore, LogNotifier, Notifier};
use config::AppConfig;
use db::Database;
use ensemble::ThresholdState;
use error::{DetectError, ReviewError};
use localize::Localizer;
use metrics::{MetricsCollector, MetricsSnapshot};
use models::{
    DetectionRecord, HumanLabel, LabelInput, ModelMetrics, ReviewItem, TrainingConfig,
    TrainingJobType,
};
use normalize::Normalizer;
use pipeline::DamagePipeline;
use review::ReviewRouter;
use scheduler::{JobKind, JobReport, JobRunner, ScheduledJobs, SchedulerController};
use scoring::{DetectionModel, ScorerSet};
use thresholds::{AdaptiveThresholdController, ThresholdStore};
use training::{LabelReplayTrainer, ModelTrainer, TrainingService, TriggerOutcome};

/// Pluggable external pieces. Anything left `None` gets the built-in default.
#[derive(Default)]
pub struct Collaborators {
    pub notifier: Option<Arc<dyn Notifier>>,
    pub artifacts: Option<Arc<dyn ArtifactStore>>,
    pub detection_model: Option<Arc<dyn DetectionModel>>,
    pub trainer: Option<Arc<dyn ModelTrainer>>,
}

pub struct DamageLens {
    config: AppConfig,
    db: Database,
    thresholds: Arc<AdaptiveThresholdController>,
    review: Arc<ReviewRouter>,
    training: TrainingService,
    pipeline: DamagePipeline,
    scheduler: Mutex<SchedulerController>,
    jobs: JobRunner,
    metrics: MetricsCollector,
}

impl DamageLens {
    pub async fn open(config: AppConfig, collaborators: Collaborators) -> Result<Self> {
        let db = Database::new(config.database_path.clone())?;
        recover_interrupted_training(&db).await?;

        let notifier: Arc<dyn Notifier> = collaborators
            .notifier
            .unwrap_or_else(|| Arc::new(LogNotifier));
        let artifacts: Arc<dyn ArtifactStore> = match collaborators.artifacts {
            Some(store) => store,
            None => Arc::new(FsArtifactStore::new(config.artifact_dir.clone())?),
        };
        let trainer: Arc<dyn ModelTrainer> = collaborators.trainer.unwrap_or_else(|| {
            Arc::new(LabelReplayTrainer::new(
                config.adaptation.min_damage_threshold,
                config.adaptation.max_damage_threshold,
            ))
        });

        let store = Arc::new(ThresholdStore::load(&db).await?);
        info!(
            "thresholds loaded: version {}, damage threshold {:.3}",
            store.snapshot().version,
            store.snapshot().damage_threshold
        );
        let thresholds = Arc::new(AdaptiveThresholdController::new(
            Arc::clone(&store),
            db.clone(),
            config.adaptation.clone(),
        ));

        let review = Arc::new(ReviewRouter::new(
            db.clone(),
            Arc::clone(&notifier),
            Arc::clone(&thresholds),
        ));

        let training = TrainingService::new(
            db.clone(),
            trainer,
            Arc::clone(&thresholds),
            Arc::clone(&notifier),
            config.model_version.clone(),
        );

        let metrics = MetricsCollector::new();
        let pipeline = DamagePipeline::new(
            Normalizer::new(config.normalizer.clone()),
            Localizer::new(config.localizer.clone()),
            ScorerSet::standard(&config.scorers, collaborators.detection_model),
            store,
            db.clone(),
            artifacts,
            Arc::clone(&review),
            Arc::clone(&notifier),
            metrics.clone(),
            config.model_version.clone(),
        );

        let jobs = Arc::new(ScheduledJobs::new(
            db.clone(),
            training.clone(),
            notifier,
            config.scheduler.clone(),
            config.retention.clone(),
        ));

        let scheduler = SchedulerController::new(jobs);
        let jobs = scheduler.runner();

        Ok(Self {
            config,
            db,
            thresholds,
            review,
            training,
            pipeline,
            scheduler: Mutex::new(scheduler),
            jobs,
            metrics,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub async fn detect(&self, before: &[u8], after: &[u8]) -> Result<DetectionRecord, DetectError> {
        self.pipeline.detect(before, after).await
    }

    pub async fn submit_label(
        &self,
        detection_id: &str,
        input: LabelInput,
    ) -> Result<HumanLabel, ReviewError> {
        self.review.submit_label(detection_id, input).await
    }

    /// Unresolved review items, most uncertain first. `None` uses the
    /// configured listing limit.
    pub async fn pending_reviews(&self, limit: Option<usize>) -> Result<Vec<ReviewItem>, ReviewError> {
        self.review
            .pending(limit.unwrap_or(self.config.pending_review_limit))
            .await
    }

    pub async fn trigger_training(
        &self,
        job_type: TrainingJobType,
        config: TrainingConfig,
    ) -> Result<TriggerOutcome> {
        self.training.trigger(job_type, config).await
    }

    pub fn training(&self) -> &TrainingService {
        &self.training
    }

    /// Recent evaluations of the active model version, newest first.
    pub async fn model_metrics(&self, limit: usize) -> Result<Vec<ModelMetrics>> {
        self.db
            .list_model_metrics(&self.config.model_version, limit)
            .await
    }

    pub fn thresholds(&self) -> Arc<ThresholdState> {
        self.thresholds.store().snapshot()
    }

    pub async fn start_scheduler(&self) -> Result<()> {
        self.scheduler.lock().await.start()
    }

    pub async fn stop_scheduler(&self) -> Result<()> {
        self.scheduler.lock().await.stop().await
    }

    /// Runs one scheduled job now. Returns `None` if that job is already in
    /// flight or failed (the error is logged).
    pub async fn run_job_now(&self, kind: JobKind) -> Option<JobReport> {
        self.jobs.run_now(kind).await
    }

    pub async fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot().await
    }
}

/// A job left pending or running by a previous process will never finish;
/// fail it so it stops blocking new training.
async fn recover_interrupted_training(db: &Database) -> Result<()> {
    while let Some(job) = db.active_training_job().await? {
        warn!(
            "recovered interrupted training job {} ({}); marking failed",
            job.id,
            job.status.as_str()
        );
        db.fail_training_job(&job.id, "interrupted by process restart", Utc::now())
            .await?;
    }
    Ok(())
}
