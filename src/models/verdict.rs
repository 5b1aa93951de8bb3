use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{DamageRegion, RegionAssessment, SignalKind, SignalScores};

/// Ordered so that `None < Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

/// Fused decision for one image pair. Never edited after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnsembleVerdict {
    pub damage_detected: bool,
    pub severity: Severity,
    pub ensemble_score: f64,
    pub model_agreement_count: u8,
    pub uncertainty_score: f64,
    pub confidence: f64,
    pub needs_review: bool,
    pub signals_used: Vec<SignalKind>,
    pub threshold_version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStatus {
    Completed,
    PendingReview,
    Reviewed,
}

impl DetectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionStatus::Completed => "completed",
            DetectionStatus::PendingReview => "pending_review",
            DetectionStatus::Reviewed => "reviewed",
        }
    }
}

/// Everything the core persists about one before/after comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionRecord {
    pub id: String,
    pub verdict: EnsembleVerdict,
    pub scores: SignalScores,
    pub regions: Vec<DamageRegion>,
    pub assessments: Vec<RegionAssessment>,
    pub damage_ratio: f64,
    pub estimated_repair_cost: f64,
    /// Artifact name → opaque locator returned by the storage collaborator.
    pub artifacts: BTreeMap<String, String>,
    pub model_version: String,
    pub processing_time_ms: u64,
    pub status: DetectionStatus,
    pub created_at: DateTime<Utc>,
}
