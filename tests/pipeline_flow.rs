mod common;

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use damagelens::{
    collaborators::{FsArtifactStore, LogNotifier},
    config::{AdaptationConfig, LocalizerConfig, NormalizerConfig},
    db::Database,
    error::{DetectError, InputError, ReviewError},
    localize::Localizer,
    metrics::MetricsCollector,
    models::{BoundingBox, Detection, DetectionStatus, LabelInput, ReviewStatus, SignalKind},
    normalize::{ImagePair, Normalizer},
    pipeline::DamagePipeline,
    review::ReviewRouter,
    scoring::{DetectionModel, ScorerSet},
    thresholds::{AdaptiveThresholdController, ThresholdStore},
    Collaborators,
};
use image::RgbImage;

/// Reports one finding a hair above full confidence.
struct OvershootingModel;

impl DetectionModel for OvershootingModel {
    fn name(&self) -> &str {
        "overshooting"
    }

    fn detect(&self, _image: &RgbImage) -> Result<Vec<Detection>> {
        Ok(vec![Detection {
            class: "dent".into(),
            confidence: 1.0000001,
            bbox: BoundingBox {
                x1: 0.0,
                y1: 0.0,
                x2: 8.0,
                y2: 8.0,
            },
        }])
    }
}

#[tokio::test]
async fn unchanged_pair_is_clean_and_reproducible() {
    let t = common::open(Collaborators::default()).await;
    let png = common::textured_png(96, 72, None);

    let first = t.lens.detect(&png, &png).await.unwrap();
    let second = t.lens.detect(&png, &png).await.unwrap();

    assert!(!first.verdict.damage_detected);
    assert!(first.regions.is_empty());
    assert_eq!(first.damage_ratio, 0.0);
    assert_eq!(first.estimated_repair_cost, 0.0);
    assert_eq!(first.status, DetectionStatus::Completed);
    assert!(first
        .scores
        .unavailable
        .iter()
        .any(|u| u.kind == SignalKind::Detector));

    assert_eq!(first.verdict, second.verdict);
    assert_ne!(first.id, second.id);

    let stored = t.lens.db().get_detection(&first.id).await.unwrap().unwrap();
    assert_eq!(stored.verdict, first.verdict);

    let snapshot = t.lens.metrics_snapshot().await;
    assert_eq!(snapshot.detection_count, 2);
}

#[tokio::test]
async fn painted_patch_is_localized() {
    let t = common::open(Collaborators::default()).await;
    let before = common::textured_png(128, 96, None);
    let after = common::textured_png(128, 96, Some((40, 30, 30, 20)));

    let record = t.lens.detect(&before, &after).await.unwrap();

    assert!(!record.regions.is_empty());
    assert!(record.damage_ratio > 0.0);
    assert_eq!(record.assessments.len(), record.regions.len());
    for region in &record.regions {
        assert!(region.area >= 100);
    }
    assert!(record.artifacts.contains_key("overlay"));
}

#[tokio::test]
async fn bad_bytes_are_an_input_error() {
    let t = common::open(Collaborators::default()).await;
    let png = common::textured_png(32, 32, None);

    let err = t.lens.detect(&[], &png).await.unwrap_err();
    assert!(matches!(err, DetectError::Input(InputError::Empty { .. })));

    let err = t.lens.detect(&png, b"not an image").await.unwrap_err();
    assert!(matches!(
        err,
        DetectError::Input(InputError::Undecodable { .. })
    ));

    assert_eq!(t.lens.db().count_detections().await.unwrap(), 0);
}

#[tokio::test]
async fn labeling_an_unflagged_detection_is_not_found() {
    let t = common::open(Collaborators::default()).await;
    let png = common::textured_png(64, 48, None);
    let record = t.lens.detect(&png, &png).await.unwrap();
    assert!(!record.verdict.needs_review);

    let err = t
        .lens
        .submit_label(&record.id, LabelInput::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::NotFound(_)));
}

#[tokio::test]
async fn out_of_range_detector_output_only_drops_that_signal() {
    let t = common::open(Collaborators {
        detection_model: Some(Arc::new(OvershootingModel)),
        ..Collaborators::default()
    })
    .await;
    let png = common::textured_png(64, 48, None);

    let record = t.lens.detect(&png, &png).await.unwrap();

    assert!(record.scores.detections.is_none());
    assert!(record
        .scores
        .unavailable
        .iter()
        .any(|u| u.kind == SignalKind::Detector && u.reason.contains("outside [0, 1]")));
    assert_eq!(
        record.verdict.signals_used,
        vec![SignalKind::Structural, SignalKind::Perceptual]
    );
    assert!(t.lens.db().get_detection(&record.id).await.unwrap().is_some());
}

#[tokio::test]
async fn no_scorers_still_yields_a_reviewable_verdict() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(dir.path().join("bare.db")).unwrap();
    let store = Arc::new(ThresholdStore::load(&db).await.unwrap());
    let thresholds = Arc::new(AdaptiveThresholdController::new(
        Arc::clone(&store),
        db.clone(),
        AdaptationConfig::default(),
    ));
    let review = Arc::new(ReviewRouter::new(
        db.clone(),
        Arc::new(LogNotifier),
        thresholds,
    ));
    let pipeline = DamagePipeline::new(
        Normalizer::new(NormalizerConfig {
            target_width: 64,
            target_height: 48,
            ..NormalizerConfig::default()
        }),
        Localizer::new(LocalizerConfig::default()),
        ScorerSet::new(Duration::from_secs(5)),
        store,
        db.clone(),
        Arc::new(FsArtifactStore::new(dir.path().join("artifacts")).unwrap()),
        review,
        Arc::new(LogNotifier),
        MetricsCollector::new(),
        "bare".into(),
    );
    let png = common::textured_png(64, 48, None);

    let record = pipeline.detect(&png, &png).await.unwrap();

    assert!(record.verdict.signals_used.is_empty());
    assert_eq!(record.scores.unavailable.len(), 3);
    assert!(!record.verdict.damage_detected);
    assert!(record.verdict.needs_review);
    assert_eq!(record.status, DetectionStatus::PendingReview);

    let item = db
        .get_review_item_for_detection(&record.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.status, ReviewStatus::Pending);
}

#[test]
fn normalizer_output_dimensions_always_match() {
    let normalizer = Normalizer::new(NormalizerConfig {
        target_width: 160,
        target_height: 120,
        ..NormalizerConfig::default()
    });

    for (before, after) in [((40, 30), (200, 100)), ((17, 91), (17, 91)), ((300, 5), (8, 8))] {
        let pair = ImagePair::new(
            RgbImage::from_pixel(before.0, before.1, image::Rgb([120, 80, 40])),
            RgbImage::from_pixel(after.0, after.1, image::Rgb([90, 90, 90])),
        )
        .unwrap();
        let out = normalizer.normalize(pair);
        assert_eq!(out.before.dimensions(), (160, 120));
        assert_eq!(out.after.dimensions(), (160, 120));
    }
}

#[test]
fn small_blobs_never_become_regions() {
    let localizer = Localizer::new(LocalizerConfig::default());
    let before = RgbImage::from_pixel(100, 100, image::Rgb([128, 128, 128]));
    let mut after = before.clone();

    // 9x9 = 81 px blob (dropped) and 12x12 = 144 px blob (kept).
    for y in 5..14 {
        for x in 5..14 {
            after.put_pixel(x, y, image::Rgb([255, 255, 255]));
        }
    }
    for y in 50..62 {
        for x in 50..62 {
            after.put_pixel(x, y, image::Rgb([0, 0, 0]));
        }
    }

    let pair = Arc::new(ImagePair::new(before, after).unwrap());
    let localization = localizer.localize(&pair);

    assert_eq!(localization.regions.len(), 1);
    assert_eq!(localization.regions[0].area, 144);
    assert!((localization.damage_ratio - 0.0144).abs() < 1e-12);
}
