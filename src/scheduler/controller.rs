use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{
    jobs::{JobKind, JobReport, ScheduledJobs},
    loop_worker::{job_loop, run_once},
    registry::JobRegistry,
};

/// Owns the per-job timer tasks. One task per job, all sharing a registry
/// and a cancellation token.
pub struct SchedulerController {
    jobs: Arc<ScheduledJobs>,
    registry: Arc<JobRegistry>,
    kinds: Vec<JobKind>,
    handles: Vec<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl SchedulerController {
    pub fn new(jobs: Arc<ScheduledJobs>) -> Self {
        let mut registry = JobRegistry::new();
        for kind in JobKind::ALL {
            registry.register(kind.name(), kind.schedule(jobs.config()));
        }

        Self {
            jobs,
            registry: Arc::new(registry),
            kinds: JobKind::ALL.to_vec(),
            handles: Vec::new(),
            cancel_token: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.cancel_token.is_some()
    }

    pub fn start(&mut self) -> Result<()> {
        if self.cancel_token.is_some() {
            bail!("scheduler already running");
        }

        let cancel_token = CancellationToken::new();
        for (id, kind) in self.registry.ids().zip(self.kinds.iter().copied()) {
            self.handles.push(tokio::spawn(job_loop(
                id,
                kind,
                Arc::clone(&self.registry),
                Arc::clone(&self.jobs),
                cancel_token.clone(),
            )));
        }

        info!("scheduler started with {} jobs", self.handles.len());
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// A handle that runs jobs on demand without borrowing the controller.
    pub fn runner(&self) -> JobRunner {
        JobRunner {
            registry: Arc::clone(&self.registry),
            jobs: Arc::clone(&self.jobs),
        }
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        for handle in self.handles.drain(..) {
            handle.await.context("scheduler task failed to join")?;
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct JobRunner {
    registry: Arc<JobRegistry>,
    jobs: Arc<ScheduledJobs>,
}

impl JobRunner {
    /// Runs one job immediately, honouring the same overlap guard as the timers.
    pub async fn run_now(&self, kind: JobKind) -> Option<JobReport> {
        let id = self.registry.find(kind.name())?;
        run_once(id, kind, &self.registry, &self.jobs).await
    }
}
