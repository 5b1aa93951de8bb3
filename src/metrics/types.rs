use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stage timings for one detection run, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTimings {
    pub normalize_ms: u64,
    pub localize_ms: u64,
    pub scoring_ms: u64,
    pub decision_ms: u64,
    pub artifacts_ms: u64,
    pub persist_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionMetrics {
    pub timestamp: DateTime<Utc>,
    pub detection_id: String,
    pub stages: StageTimings,
    pub total_ms: u64,
    pub unavailable_signals: usize,
    pub damage_detected: bool,
    pub needs_review: bool,
    pub cpu_percent: f32,
    pub memory_mb: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    pub cpu_percent: f32,
    pub memory_mb: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub system: SystemMetrics,
    pub recent_detections: Vec<DetectionMetrics>,
    pub detection_count: u64,
    pub damage_count: u64,
    pub review_count: u64,
    pub degraded_count: u64,
    pub mean_total_ms: Option<f64>,
}
