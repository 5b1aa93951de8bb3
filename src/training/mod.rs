mod service;
mod trainer;

pub use service::{TrainingService, TriggerOutcome};
pub use trainer::{evaluate, LabelReplayTrainer, ModelTrainer, TrainingOutcome};
