mod common;

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use chrono::Utc;
use damagelens::{
    collaborators::Notification,
    error::ReviewError,
    models::{
        EvaluationMetrics, FeedbackKind, LabelInput, ModelMetrics, ReviewStatus, Severity,
        TrainingConfig, TrainingJobStatus, TrainingJobType, TrainingSample,
    },
    scheduler::{JobKind, JobReport},
    training::{ModelTrainer, TrainingOutcome, TriggerOutcome},
    Collaborators,
};

struct SlowTrainer(Duration);

impl Default for SlowTrainer {
    fn default() -> Self {
        Self(Duration::from_millis(300))
    }
}

impl ModelTrainer for SlowTrainer {
    fn train(&self, samples: &[TrainingSample], _config: &TrainingConfig) -> Result<TrainingOutcome> {
        std::thread::sleep(self.0);
        Ok(TrainingOutcome {
            metrics: EvaluationMetrics {
                accuracy: 0.92,
                precision: 0.9,
                recall: 0.88,
                f1_score: 0.89,
                map_score: None,
            },
            calibrated_threshold: (!samples.is_empty()).then_some(0.45),
        })
    }
}

fn label(is_damage: bool) -> LabelInput {
    LabelInput {
        is_damage,
        ..LabelInput::default()
    }
}

#[tokio::test]
async fn feedback_moves_the_damage_threshold() {
    let t = common::open(Collaborators::default()).await;
    common::flagged(&t.lens, "fp", true, 0.5).await;
    common::flagged(&t.lens, "fn", false, 0.5).await;
    common::flagged(&t.lens, "ok", true, 0.5).await;
    let start = t.lens.thresholds().damage_threshold;

    let fp = t.lens.submit_label("fp", label(false)).await.unwrap();
    assert_eq!(fp.feedback, FeedbackKind::FalsePositive);
    assert!((t.lens.thresholds().damage_threshold - (start + 0.01)).abs() < 1e-12);

    let fn_ = t.lens.submit_label("fn", label(true)).await.unwrap();
    assert_eq!(fn_.feedback, FeedbackKind::FalseNegative);
    assert!((t.lens.thresholds().damage_threshold - start).abs() < 1e-12);

    let before = t.lens.thresholds();
    let ok = t.lens.submit_label("ok", label(true)).await.unwrap();
    assert_eq!(ok.feedback, FeedbackKind::Correct);
    assert_eq!(*t.lens.thresholds(), *before);
}

#[tokio::test]
async fn severity_disagreement_is_incorrect_and_leaves_thresholds() {
    let t = common::open(Collaborators::default()).await;
    common::flagged(&t.lens, "d", true, 0.5).await;
    let before = t.lens.thresholds();

    let stored = t
        .lens
        .submit_label(
            "d",
            LabelInput {
                is_damage: true,
                severity: Some(Severity::High),
                ..LabelInput::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(stored.feedback, FeedbackKind::Incorrect);
    assert_eq!(t.lens.thresholds().version, before.version);
}

#[tokio::test]
async fn resolved_reviews_reject_further_labels() {
    let t = common::open(Collaborators::default()).await;
    common::flagged(&t.lens, "d", true, 0.5).await;

    t.lens.submit_label("d", label(true)).await.unwrap();
    let err = t.lens.submit_label("d", label(false)).await.unwrap_err();
    assert!(matches!(err, ReviewError::Conflict(_)));

    let err = t.lens.submit_label("missing", label(true)).await.unwrap_err();
    assert!(matches!(err, ReviewError::NotFound(_)));
}

#[tokio::test]
async fn only_one_training_job_at_a_time() {
    let t = common::open(Collaborators {
        trainer: Some(Arc::new(SlowTrainer::default())),
        ..Collaborators::default()
    })
    .await;

    let first = t
        .lens
        .trigger_training(TrainingJobType::ManualFineTune, TrainingConfig::manual())
        .await
        .unwrap();
    let TriggerOutcome::Accepted { job_id } = first else {
        panic!("expected the first trigger to be accepted");
    };

    let second = t
        .lens
        .trigger_training(TrainingJobType::ManualFineTune, TrainingConfig::manual())
        .await
        .unwrap();
    assert_eq!(
        second,
        TriggerOutcome::Rejected {
            existing_job_id: job_id.clone()
        }
    );
    assert_eq!(t.lens.db().list_training_jobs(10).await.unwrap().len(), 1);

    let job = t.lens.training().wait_for(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, TrainingJobStatus::Completed);
    assert_eq!(t.lens.model_metrics(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn retention_drops_only_expired_detections() {
    let t = common::open(Collaborators::default()).await;
    let now = Utc::now();
    t.lens
        .db()
        .insert_detection(&common::record("old", true, now - chrono::Duration::days(91)))
        .await
        .unwrap();
    t.lens
        .db()
        .insert_detection(&common::record("recent", true, now - chrono::Duration::days(10)))
        .await
        .unwrap();
    t.lens
        .db()
        .insert_review_item(&common::review_item("old", 0.7))
        .await
        .unwrap();

    let report = t.lens.run_job_now(JobKind::Retention).await.unwrap();
    assert!(matches!(
        report,
        JobReport::Cleaned {
            detections: 1,
            training_jobs: 0
        }
    ));

    assert!(t.lens.db().get_detection("old").await.unwrap().is_none());
    assert!(t.lens.db().get_detection("recent").await.unwrap().is_some());
    assert!(t
        .lens
        .db()
        .get_review_item_for_detection("old")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn nightly_training_waits_for_enough_labels() {
    let t = common::open(Collaborators {
        trainer: Some(Arc::new(SlowTrainer::default())),
        ..Collaborators::default()
    })
    .await;

    for i in 0..3 {
        let id = format!("d{i}");
        common::flagged(&t.lens, &id, true, 0.5).await;
        t.lens.submit_label(&id, label(true)).await.unwrap();
    }
    let report = t.lens.run_job_now(JobKind::NightlyTraining).await.unwrap();
    assert!(matches!(report, JobReport::Skipped { .. }));

    for i in 3..10 {
        let id = format!("d{i}");
        common::flagged(&t.lens, &id, true, 0.5).await;
        t.lens.submit_label(&id, label(true)).await.unwrap();
    }
    let report = t.lens.run_job_now(JobKind::NightlyTraining).await.unwrap();
    let JobReport::TrainingFinished { job } = report else {
        panic!("expected a finished training job, got {report:?}");
    };
    assert_eq!(job.job_type, TrainingJobType::NightlyTraining);
    assert_eq!(job.status, TrainingJobStatus::Completed);
    assert_eq!(job.training_samples, 10);
    assert_eq!(job.new_labels, 10);
    assert_eq!(t.lens.thresholds().damage_threshold, 0.45);

    // Labels counted from the last completed run start over.
    let report = t.lens.run_job_now(JobKind::NightlyTraining).await.unwrap();
    assert!(matches!(report, JobReport::Skipped { .. }));
}

#[tokio::test]
async fn triage_promotes_the_most_uncertain_items() {
    let t = common::open(Collaborators::default()).await;
    common::flagged(&t.lens, "low", true, 0.5).await;
    common::flagged(&t.lens, "mid", true, 0.65).await;
    common::flagged(&t.lens, "high", true, 0.9).await;

    let report = t.lens.run_job_now(JobKind::ReviewTriage).await.unwrap();
    let JobReport::Promoted { items } = report else {
        panic!("expected promoted items");
    };
    let order: Vec<_> = items.iter().map(|i| i.detection_id.as_str()).collect();
    assert_eq!(order, vec!["high", "mid"]);
    assert!(items.iter().all(|i| i.status == ReviewStatus::InReview));

    let low = t
        .lens
        .db()
        .get_review_item_for_detection("low")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(low.status, ReviewStatus::Pending);
}

#[tokio::test]
async fn audit_below_baseline_starts_emergency_retraining() {
    let mut t = common::open(Collaborators::default()).await;
    t.lens
        .db()
        .insert_model_metrics(&ModelMetrics {
            id: "m1".into(),
            model_version: t.lens.config().model_version.clone(),
            metrics: EvaluationMetrics {
                accuracy: 0.7,
                precision: 0.7,
                recall: 0.7,
                f1_score: 0.7,
                map_score: None,
            },
            sample_size: 40,
            evaluated_at: Utc::now(),
        })
        .await
        .unwrap();

    let report = t.lens.run_job_now(JobKind::PerformanceAudit).await.unwrap();
    let JobReport::Regressed {
        accuracy,
        outcome: TriggerOutcome::Accepted { job_id },
    } = report
    else {
        panic!("expected emergency retraining, got {report:?}");
    };
    assert_eq!(accuracy, 0.7);

    match t.notifications.recv().await.unwrap() {
        Notification::PerformanceRegression { baseline, .. } => assert_eq!(baseline, 0.85),
        other => panic!("unexpected notification {other:?}"),
    }

    // The default replay trainer has no labeled corpus to work with.
    let job = t.lens.training().wait_for(&job_id).await.unwrap().unwrap();
    assert_eq!(job.job_type, TrainingJobType::EmergencyRetraining);
    assert_eq!(job.status, TrainingJobStatus::Failed);
    assert_eq!(
        job.error_message.as_deref(),
        Some("no labeled samples to train on")
    );
}

#[tokio::test]
async fn healthy_audit_does_nothing() {
    let t = common::open(Collaborators::default()).await;
    t.lens
        .db()
        .insert_model_metrics(&ModelMetrics {
            id: "m1".into(),
            model_version: t.lens.config().model_version.clone(),
            metrics: EvaluationMetrics {
                accuracy: 0.9,
                precision: 0.9,
                recall: 0.9,
                f1_score: 0.9,
                map_score: None,
            },
            sample_size: 40,
            evaluated_at: Utc::now(),
        })
        .await
        .unwrap();

    let report = t.lens.run_job_now(JobKind::PerformanceAudit).await.unwrap();
    assert!(matches!(report, JobReport::Healthy { .. }));
    assert!(t.lens.db().list_training_jobs(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn scheduler_stays_controllable_during_a_manual_run() {
    let t = common::open(Collaborators {
        trainer: Some(Arc::new(SlowTrainer(Duration::from_millis(1500)))),
        ..Collaborators::default()
    })
    .await;
    for i in 0..10 {
        let id = format!("d{i}");
        common::flagged(&t.lens, &id, true, 0.5).await;
        t.lens.submit_label(&id, label(true)).await.unwrap();
    }

    let control = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        tokio::time::timeout(Duration::from_millis(500), async {
            t.lens.start_scheduler().await.unwrap();
            t.lens.stop_scheduler().await.unwrap();
        })
        .await
    };
    let (report, control) = tokio::join!(t.lens.run_job_now(JobKind::NightlyTraining), control);

    assert!(control.is_ok(), "start/stop waited on the running job");
    assert!(matches!(report, Some(JobReport::TrainingFinished { .. })));
}
