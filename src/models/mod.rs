pub mod region;
pub mod review;
pub mod signals;
pub mod training;
pub mod verdict;

pub use region::{DamageRegion, DamageType, RegionAssessment};
pub use review::{FeedbackKind, HumanLabel, LabelInput, ReviewItem, ReviewStatus};
pub use signals::{
    BoundingBox, Detection, DetectorFindings, SignalKind, SignalScores, UnavailableSignal,
};
pub use training::{
    EvaluationMetrics, ModelMetrics, TrainingConfig, TrainingJob, TrainingJobStatus,
    TrainingJobType, TrainingSample,
};
pub use verdict::{DetectionRecord, DetectionStatus, EnsembleVerdict, Severity};
