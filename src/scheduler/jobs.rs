use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc, Weekday};

use crate::{
    collaborators::{Notification, Notifier},
    config::{RetentionConfig, SchedulerConfig},
    db::Database,
    models::{ReviewItem, TrainingConfig, TrainingJob, TrainingJobType},
    training::{TrainingService, TriggerOutcome},
};

use super::schedule::Schedule;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    NightlyTraining,
    ReviewTriage,
    PerformanceAudit,
    Retention,
}

impl JobKind {
    pub const ALL: [JobKind; 4] = [
        JobKind::NightlyTraining,
        JobKind::ReviewTriage,
        JobKind::PerformanceAudit,
        JobKind::Retention,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            JobKind::NightlyTraining => "nightly_training",
            JobKind::ReviewTriage => "review_triage",
            JobKind::PerformanceAudit => "performance_audit",
            JobKind::Retention => "retention",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn schedule(&self, config: &SchedulerConfig) -> Schedule {
        match self {
            JobKind::NightlyTraining => Schedule::Daily {
                hour: config.nightly_hour_utc,
            },
            JobKind::ReviewTriage => Schedule::EveryHours {
                hours: config.triage_interval_hours,
            },
            JobKind::PerformanceAudit => Schedule::EveryHours {
                hours: config.audit_interval_hours,
            },
            JobKind::Retention => Schedule::Weekly {
                weekday: Weekday::Sun,
                hour: config.retention_hour_utc,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub enum JobReport {
    Skipped { reason: String },
    TrainingRejected { existing_job_id: String },
    TrainingFinished { job: TrainingJob },
    Promoted { items: Vec<ReviewItem> },
    Healthy { accuracy: f64 },
    Regressed { accuracy: f64, outcome: TriggerOutcome },
    Cleaned { detections: usize, training_jobs: usize },
}

/// The periodic maintenance work. Each method is one job body; scheduling
/// and overlap protection live in the loop worker.
pub struct ScheduledJobs {
    db: Database,
    training: TrainingService,
    notifier: Arc<dyn Notifier>,
    config: SchedulerConfig,
    retention: RetentionConfig,
}

impl ScheduledJobs {
    pub fn new(
        db: Database,
        training: TrainingService,
        notifier: Arc<dyn Notifier>,
        config: SchedulerConfig,
        retention: RetentionConfig,
    ) -> Self {
        Self {
            db,
            training,
            notifier,
            config,
            retention,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub async fn run(&self, kind: JobKind, now: DateTime<Utc>) -> Result<JobReport> {
        match kind {
            JobKind::NightlyTraining => self.nightly_training().await,
            JobKind::ReviewTriage => self.review_triage(now).await,
            JobKind::PerformanceAudit => self.performance_audit().await,
            JobKind::Retention => self.retention(now).await,
        }
    }

    /// Retrains once enough labels have arrived since the last completed run
    /// and waits for the job to finish.
    pub async fn nightly_training(&self) -> Result<JobReport> {
        let since = self.db.last_completed_training_at().await?;
        let new_labels = self.db.count_labels_since(since).await?;

        if new_labels < self.config.min_new_labels as u64 {
            log_info!(
                "nightly training skipped: {new_labels} new labels (< {})",
                self.config.min_new_labels
            );
            return Ok(JobReport::Skipped {
                reason: format!("only {new_labels} new labels"),
            });
        }

        let corpus = self.db.labeled_corpus().await?;
        if corpus.is_empty() {
            log_info!("nightly training skipped: no reviewed detections with labels");
            return Ok(JobReport::Skipped {
                reason: "empty labeled corpus".into(),
            });
        }

        let outcome = self
            .training
            .trigger(TrainingJobType::NightlyTraining, TrainingConfig::nightly())
            .await?;

        match outcome {
            TriggerOutcome::Rejected { existing_job_id } => {
                Ok(JobReport::TrainingRejected { existing_job_id })
            }
            TriggerOutcome::Accepted { job_id } => {
                let job = self
                    .training
                    .wait_for(&job_id)
                    .await?
                    .with_context(|| format!("training job {job_id} disappeared"))?;
                Ok(JobReport::TrainingFinished { job })
            }
        }
    }

    /// Promotes the most uncertain pending review items to `in_review`.
    pub async fn review_triage(&self, now: DateTime<Utc>) -> Result<JobReport> {
        let items = self
            .db
            .promote_pending_review_items(
                self.config.triage_min_uncertainty,
                self.config.triage_top_n,
                now,
            )
            .await?;

        log_info!("triage promoted {} review items", items.len());
        Ok(JobReport::Promoted { items })
    }

    /// Compares the newest evaluation of the active model with the accuracy
    /// baseline and starts emergency retraining when it falls short.
    pub async fn performance_audit(&self) -> Result<JobReport> {
        let version = self.training.model_version().to_string();
        let Some(latest) = self.db.latest_model_metrics(&version).await? else {
            log_info!("audit skipped: no metrics for model {version}");
            return Ok(JobReport::Skipped {
                reason: format!("no metrics for model {version}"),
            });
        };

        let accuracy = latest.metrics.accuracy;
        if accuracy >= self.config.accuracy_baseline {
            log_info!("model {version} accuracy {accuracy:.3} is within baseline");
            return Ok(JobReport::Healthy { accuracy });
        }

        log_warn!(
            "model {version} accuracy {accuracy:.3} below baseline {:.3}, retraining",
            self.config.accuracy_baseline
        );
        self.notifier.notify(Notification::PerformanceRegression {
            model_version: version,
            accuracy,
            baseline: self.config.accuracy_baseline,
        });

        let outcome = self
            .training
            .trigger(
                TrainingJobType::EmergencyRetraining,
                TrainingConfig::emergency(),
            )
            .await?;
        Ok(JobReport::Regressed { accuracy, outcome })
    }

    /// Deletes detections (labels and review items cascade) and finished
    /// training jobs past their retention windows.
    pub async fn retention(&self, now: DateTime<Utc>) -> Result<JobReport> {
        let detection_cutoff = now - Duration::days(self.retention.detection_days);
        let job_cutoff = now - Duration::days(self.retention.training_job_days);

        let detections = self.db.delete_detections_before(detection_cutoff).await?;
        let training_jobs = self
            .db
            .delete_finished_training_jobs_before(job_cutoff)
            .await?;

        log_info!("retention removed {detections} detections and {training_jobs} training jobs");
        Ok(JobReport::Cleaned {
            detections,
            training_jobs,
        })
    }
}
