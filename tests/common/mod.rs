#![allow(dead_code)]

use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Utc};
use damagelens::{
    collaborators::{ChannelNotifier, Notification},
    config::AppConfig,
    models::{
        DetectionRecord, DetectionStatus, EnsembleVerdict, ReviewItem, ReviewStatus, Severity,
        SignalKind, SignalScores,
    },
    Collaborators, DamageLens,
};
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

pub struct TestLens {
    pub dir: TempDir,
    pub lens: DamageLens,
    pub notifications: UnboundedReceiver<Notification>,
}

pub fn test_config(dir: &TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.database_path = dir.path().join("damagelens.db");
    config.artifact_dir = dir.path().join("artifacts");
    config.normalizer.target_width = 128;
    config.normalizer.target_height = 96;
    config
}

pub async fn open(collaborators: Collaborators) -> TestLens {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let (notifier, notifications) = ChannelNotifier::new();
    let collaborators = Collaborators {
        notifier: Some(Arc::new(notifier)),
        ..collaborators
    };
    let lens = DamageLens::open(config, collaborators).await.unwrap();
    TestLens {
        dir,
        lens,
        notifications,
    }
}

pub fn record(id: &str, damage: bool, created_at: DateTime<Utc>) -> DetectionRecord {
    DetectionRecord {
        id: id.to_string(),
        verdict: EnsembleVerdict {
            damage_detected: damage,
            severity: if damage { Severity::Low } else { Severity::None },
            ensemble_score: if damage { 0.45 } else { 0.1 },
            model_agreement_count: if damage { 2 } else { 0 },
            uncertainty_score: 0.55,
            confidence: 0.45,
            needs_review: true,
            signals_used: SignalKind::ALL.to_vec(),
            threshold_version: 1,
        },
        scores: SignalScores::default(),
        regions: Vec::new(),
        assessments: Vec::new(),
        damage_ratio: 0.0,
        estimated_repair_cost: 0.0,
        artifacts: BTreeMap::new(),
        model_version: "ensemble-v1.1".into(),
        processing_time_ms: 5,
        status: DetectionStatus::PendingReview,
        created_at,
    }
}

pub fn review_item(detection_id: &str, uncertainty: f64) -> ReviewItem {
    let now = Utc::now();
    ReviewItem {
        id: Uuid::new_v4().to_string(),
        detection_id: detection_id.to_string(),
        uncertainty_score: uncertainty,
        status: ReviewStatus::Pending,
        created_at: now,
        updated_at: now,
        resolved_at: None,
    }
}

/// Inserts a detection flagged for review along with its pending review item.
pub async fn flagged(lens: &DamageLens, id: &str, damage: bool, uncertainty: f64) {
    lens.db()
        .insert_detection(&record(id, damage, Utc::now()))
        .await
        .unwrap();
    lens.db()
        .insert_review_item(&review_item(id, uncertainty))
        .await
        .unwrap();
}

fn noise(x: u32, y: u32) -> u64 {
    let mut h = u64::from(x).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ u64::from(y).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    h ^= h >> 29;
    h = h.wrapping_mul(0xBF58_476D_1CE4_E5B9);
    h ^ (h >> 32)
}

/// Deterministic noise-textured RGB image encoded as PNG.
pub fn textured_png(width: u32, height: u32, patch: Option<(u32, u32, u32, u32)>) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        if let Some((px, py, pw, ph)) = patch {
            if x >= px && x < px + pw && y >= py && y < py + ph {
                return image::Rgb([20, 20, 20]);
            }
        }
        let v = 60 + (noise(x, y) % 120) as u8;
        image::Rgb([v, v.saturating_add(10), v.saturating_sub(10)])
    });
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}
