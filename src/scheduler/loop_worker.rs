use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use super::{
    jobs::{JobKind, JobReport, ScheduledJobs},
    registry::{JobId, JobRegistry},
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Sleeps until each firing time of one job and runs it, until cancelled.
pub async fn job_loop(
    id: JobId,
    kind: JobKind,
    registry: Arc<JobRegistry>,
    jobs: Arc<ScheduledJobs>,
    cancel_token: CancellationToken,
) {
    let schedule = registry.schedule(id);
    log_info!("{} scheduled ({schedule:?})", kind.name());

    loop {
        let now = Utc::now();
        let delay = schedule.delay_from(now);
        log_debug!(
            "{} next run at {}",
            kind.name(),
            schedule.next_after(now).to_rfc3339()
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                run_once(id, kind, &registry, &jobs).await;
            }
            _ = cancel_token.cancelled() => {
                log_info!("{} loop shutting down", kind.name());
                break;
            }
        }
    }
}

/// Runs a job now unless it is already in flight. Errors are logged, never
/// propagated: a failing run must not stop later ones.
pub async fn run_once(
    id: JobId,
    kind: JobKind,
    registry: &JobRegistry,
    jobs: &ScheduledJobs,
) -> Option<JobReport> {
    let Some(_guard) = registry.try_begin(id) else {
        log_warn!("{} still running, skipping this firing", kind.name());
        return None;
    };

    match jobs.run(kind, Utc::now()).await {
        Ok(report) => {
            log_debug!("{} finished: {report:?}", kind.name());
            Some(report)
        }
        Err(err) => {
            log_error!("{} failed: {err:?}", kind.name());
            None
        }
    }
}
