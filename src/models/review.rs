//! Active-learning review queue records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BoundingBox, DamageType, EnsembleVerdict, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    InReview,
    Resolved,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::InReview => "in_review",
            ReviewStatus::Resolved => "resolved",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewItem {
    pub id: String,
    pub detection_id: String,
    pub uncertainty_score: f64,
    pub status: ReviewStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// How a human label relates to the verdict it reviews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    Correct,
    FalsePositive,
    FalseNegative,
    /// Damage call was right but the reviewer disagrees on severity.
    Incorrect,
}

impl FeedbackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackKind::Correct => "correct",
            FeedbackKind::FalsePositive => "false_positive",
            FeedbackKind::FalseNegative => "false_negative",
            FeedbackKind::Incorrect => "incorrect",
        }
    }

    /// Compares a reviewer's label against the verdict it reviews. A severity
    /// mismatch only matters when the damage call itself agrees.
    pub fn classify(verdict: &EnsembleVerdict, label: &LabelInput) -> Self {
        match (verdict.damage_detected, label.is_damage) {
            (true, false) => FeedbackKind::FalsePositive,
            (false, true) => FeedbackKind::FalseNegative,
            _ => match label.severity {
                Some(severity) if severity != verdict.severity => FeedbackKind::Incorrect,
                _ => FeedbackKind::Correct,
            },
        }
    }
}

/// Reviewer input for a flagged detection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelInput {
    pub is_damage: bool,
    pub damage_type: Option<DamageType>,
    pub severity: Option<Severity>,
    pub confidence: Option<f64>,
    #[serde(default)]
    pub bounding_boxes: Vec<BoundingBox>,
    #[serde(default)]
    pub polygons: Vec<Vec<(f32, f32)>>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HumanLabel {
    pub id: String,
    pub review_item_id: String,
    pub detection_id: String,
    pub is_damage: bool,
    pub damage_type: Option<DamageType>,
    pub severity: Option<Severity>,
    pub confidence: Option<f64>,
    pub bounding_boxes: Vec<BoundingBox>,
    pub polygons: Vec<Vec<(f32, f32)>>,
    pub notes: String,
    pub feedback: FeedbackKind,
    pub created_at: DateTime<Utc>,
}
