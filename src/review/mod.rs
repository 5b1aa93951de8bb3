//! Routes uncertain verdicts to humans and ingests their labels.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    collaborators::{Notification, Notifier},
    db::{Database, LabelWrite},
    error::ReviewError,
    models::{HumanLabel, LabelInput, ReviewItem, ReviewStatus},
    thresholds::AdaptiveThresholdController,
};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

pub struct ReviewRouter {
    db: Database,
    notifier: Arc<dyn Notifier>,
    thresholds: Arc<AdaptiveThresholdController>,
}

impl ReviewRouter {
    pub fn new(
        db: Database,
        notifier: Arc<dyn Notifier>,
        thresholds: Arc<AdaptiveThresholdController>,
    ) -> Self {
        Self {
            db,
            notifier,
            thresholds,
        }
    }

    /// Opens a pending review item for a detection and tells the reviewers.
    pub async fn enqueue(
        &self,
        detection_id: &str,
        uncertainty: f64,
    ) -> Result<ReviewItem, ReviewError> {
        let item = pending_item(detection_id, uncertainty);
        self.db.insert_review_item(&item).await?;
        self.announce(&item);
        Ok(item)
    }

    pub fn announce(&self, item: &ReviewItem) {
        self.notifier.notify(Notification::ReviewRequired {
            detection_id: item.detection_id.clone(),
            review_item_id: item.id.clone(),
            uncertainty: item.uncertainty_score,
        });
    }

    /// Unresolved items, most uncertain first.
    pub async fn pending(&self, limit: usize) -> Result<Vec<ReviewItem>, ReviewError> {
        Ok(self.db.list_open_review_items(limit).await?)
    }

    /// Accepts a reviewer label for a flagged detection, then feeds the derived
    /// feedback to the threshold controller.
    pub async fn submit_label(
        &self,
        detection_id: &str,
        input: LabelInput,
    ) -> Result<HumanLabel, ReviewError> {
        validate(&input)?;

        let write = self
            .db
            .record_label(
                Uuid::new_v4().to_string(),
                detection_id.to_string(),
                input,
                Utc::now(),
            )
            .await?;

        let label = match write {
            LabelWrite::Stored { label, .. } => label,
            LabelWrite::UnknownDetection => {
                return Err(ReviewError::NotFound(format!("detection {detection_id}")))
            }
            LabelWrite::NoReviewItem => {
                return Err(ReviewError::NotFound(format!(
                    "review item for detection {detection_id}"
                )))
            }
            LabelWrite::AlreadyResolved => {
                return Err(ReviewError::Conflict(format!(
                    "review for detection {detection_id} is already resolved"
                )))
            }
        };

        log_info!(
            "label {} stored for detection {} ({})",
            label.id,
            label.detection_id,
            label.feedback.as_str()
        );

        // The label is committed; a failed threshold write must not undo it.
        if let Err(err) = self.thresholds.apply_feedback(label.feedback).await {
            log_error!("failed to apply feedback from label {}: {err:#}", label.id);
        }

        Ok(label)
    }
}

/// A fresh pending item with the uncertainty clamped to [0, 1].
pub fn pending_item(detection_id: &str, uncertainty: f64) -> ReviewItem {
    let now = Utc::now();
    ReviewItem {
        id: Uuid::new_v4().to_string(),
        detection_id: detection_id.to_string(),
        uncertainty_score: uncertainty.clamp(0.0, 1.0),
        status: ReviewStatus::Pending,
        created_at: now,
        updated_at: now,
        resolved_at: None,
    }
}

fn validate(input: &LabelInput) -> Result<(), ReviewError> {
    if let Some(confidence) = input.confidence {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(ReviewError::Validation(format!(
                "label confidence {confidence} must be within [0, 1]"
            )));
        }
    }

    let boxes_finite = input
        .bounding_boxes
        .iter()
        .all(|b| [b.x1, b.y1, b.x2, b.y2].iter().all(|v| v.is_finite()));
    if !boxes_finite {
        return Err(ReviewError::Validation(
            "bounding box coordinates must be finite".into(),
        ));
    }

    let polygons_finite = input
        .polygons
        .iter()
        .flatten()
        .all(|(x, y)| x.is_finite() && y.is_finite());
    if !polygons_finite {
        return Err(ReviewError::Validation(
            "polygon coordinates must be finite".into(),
        ));
    }

    Ok(())
}
