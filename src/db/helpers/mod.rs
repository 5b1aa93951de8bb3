use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{de::DeserializeOwned, Serialize};

use crate::models::{
    DamageType, DetectionStatus, FeedbackKind, ReviewStatus, Severity, TrainingJobStatus,
    TrainingJobType,
};

pub fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

pub fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_optional_datetime(
    value: Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(raw) => parse_datetime(&raw, field).map(Some),
        None => Ok(None),
    }
}

pub fn to_json<T: Serialize>(value: &T, field: &str) -> Result<String> {
    serde_json::to_string(value).with_context(|| format!("failed to serialize {field}"))
}

pub fn from_json<T: DeserializeOwned>(raw: &str, field: &str) -> Result<T> {
    serde_json::from_str(raw).with_context(|| format!("failed to parse {field}"))
}

pub fn parse_severity(value: &str) -> Result<Severity> {
    match value {
        "none" => Ok(Severity::None),
        "low" => Ok(Severity::Low),
        "medium" => Ok(Severity::Medium),
        "high" => Ok(Severity::High),
        other => Err(anyhow!("unknown severity {other}")),
    }
}

pub fn parse_damage_type(value: &str) -> Result<DamageType> {
    match value {
        "scratch" => Ok(DamageType::Scratch),
        "dent" => Ok(DamageType::Dent),
        "paint_damage" => Ok(DamageType::PaintDamage),
        "unknown" => Ok(DamageType::Unknown),
        other => Err(anyhow!("unknown damage type {other}")),
    }
}

pub fn parse_detection_status(value: &str) -> Result<DetectionStatus> {
    match value {
        "completed" => Ok(DetectionStatus::Completed),
        "pending_review" => Ok(DetectionStatus::PendingReview),
        "reviewed" => Ok(DetectionStatus::Reviewed),
        other => Err(anyhow!("unknown detection status {other}")),
    }
}

pub fn parse_review_status(value: &str) -> Result<ReviewStatus> {
    match value {
        "pending" => Ok(ReviewStatus::Pending),
        "in_review" => Ok(ReviewStatus::InReview),
        "resolved" => Ok(ReviewStatus::Resolved),
        other => Err(anyhow!("unknown review status {other}")),
    }
}

pub fn parse_feedback(value: &str) -> Result<FeedbackKind> {
    match value {
        "correct" => Ok(FeedbackKind::Correct),
        "false_positive" => Ok(FeedbackKind::FalsePositive),
        "false_negative" => Ok(FeedbackKind::FalseNegative),
        "incorrect" => Ok(FeedbackKind::Incorrect),
        other => Err(anyhow!("unknown feedback {other}")),
    }
}

pub fn parse_job_type(value: &str) -> Result<TrainingJobType> {
    match value {
        "nightly_training" => Ok(TrainingJobType::NightlyTraining),
        "emergency_retraining" => Ok(TrainingJobType::EmergencyRetraining),
        "manual_fine_tune" => Ok(TrainingJobType::ManualFineTune),
        other => Err(anyhow!("unknown training job type {other}")),
    }
}

pub fn parse_job_status(value: &str) -> Result<TrainingJobStatus> {
    match value {
        "pending" => Ok(TrainingJobStatus::Pending),
        "running" => Ok(TrainingJobStatus::Running),
        "completed" => Ok(TrainingJobStatus::Completed),
        "failed" => Ok(TrainingJobStatus::Failed),
        other => Err(anyhow!("unknown training job status {other}")),
    }
}

/// Fixed-width UTC timestamp, so stored values order lexicographically.
pub fn format_datetime(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn bool_to_int(value: bool) -> i64 {
    i64::from(value)
}
