//! Periodic retraining, review triage, performance audits and retention.

mod controller;
mod jobs;
mod loop_worker;
mod registry;
mod schedule;

pub use controller::{JobRunner, SchedulerController};
pub use jobs::{JobKind, JobReport, ScheduledJobs};
pub use registry::{JobId, JobRegistry, RunGuard};
pub use schedule::Schedule;
