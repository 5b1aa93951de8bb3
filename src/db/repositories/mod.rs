pub mod detections;
pub mod labels;
pub mod metrics;
pub mod reviews;
pub mod thresholds;
pub mod training_jobs;
