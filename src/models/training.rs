use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingJobType {
    NightlyTraining,
    EmergencyRetraining,
    ManualFineTune,
}

impl TrainingJobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainingJobType::NightlyTraining => "nightly_training",
            TrainingJobType::EmergencyRetraining => "emergency_retraining",
            TrainingJobType::ManualFineTune => "manual_fine_tune",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrainingJobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TrainingJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainingJobStatus::Pending => "pending",
            TrainingJobStatus::Running => "running",
            TrainingJobStatus::Completed => "completed",
            TrainingJobStatus::Failed => "failed",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, TrainingJobStatus::Pending | TrainingJobStatus::Running)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingConfig {
    pub epochs: u32,
    pub batch_size: u32,
    pub learning_rate: f64,
    pub use_active_learning: bool,
}

impl TrainingConfig {
    pub fn nightly() -> Self {
        Self {
            epochs: 50,
            batch_size: 16,
            learning_rate: 0.001,
            use_active_learning: true,
        }
    }

    /// Longer, smaller-batch run used when an audit detects regression.
    pub fn emergency() -> Self {
        Self {
            epochs: 100,
            batch_size: 8,
            learning_rate: 0.0005,
            use_active_learning: true,
        }
    }

    pub fn manual() -> Self {
        Self {
            epochs: 20,
            batch_size: 16,
            learning_rate: 0.001,
            use_active_learning: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub map_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingJob {
    pub id: String,
    pub job_type: TrainingJobType,
    pub status: TrainingJobStatus,
    pub config: TrainingConfig,
    pub training_samples: u64,
    pub new_labels: u64,
    pub final_metrics: Option<EvaluationMetrics>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Append-only evaluation row for one model version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMetrics {
    pub id: String,
    pub model_version: String,
    pub metrics: EvaluationMetrics,
    pub sample_size: u64,
    pub evaluated_at: DateTime<Utc>,
}

/// One labeled example assembled for training: what the ensemble saw and what
/// the reviewer said.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingSample {
    pub detection_id: String,
    pub ensemble_score: f64,
    pub predicted_damage: bool,
    pub labeled_damage: bool,
}
