use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::remote::ProjectRemote;
use crate::scheduler::{Scheduler, TaskId, TaskKind};

/// Lifecycle of a server-side render.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportStatus {
    #[default]
    Idle,
    Processing,
    Completed,
    Error,
}

impl ExportStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// Export job state as reported by the status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportJob {
    pub status: ExportStatus,
    /// Percentage in `[0, 100]`; only meaningful while processing.
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub file: Option<String>,
}

impl ExportJob {
    fn processing() -> Self {
        Self {
            status: ExportStatus::Processing,
            progress: 0.0,
            file: None,
        }
    }

    fn failed(&self) -> Self {
        Self {
            status: ExportStatus::Error,
            ..self.clone()
        }
    }
}

/// Polling state machine for one project's export job.
///
/// `idle -> processing -> {completed | error}`; the terminal states hold until
/// the next [`ExportMonitor::start`].
#[derive(Debug)]
pub struct ExportMonitor {
    job: ExportJob,
    poll: Option<TaskId>,
    poll_interval: Duration,
}

impl ExportMonitor {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            job: ExportJob::default(),
            poll: None,
            poll_interval,
        }
    }

    pub fn job(&self) -> &ExportJob {
        &self.job
    }

    pub fn poll_task(&self) -> Option<TaskId> {
        self.poll
    }

    /// Requests a render and starts polling.
    ///
    /// An empty timeline or a job already processing is rejected without a
    /// state change. A failed start request marks the job as `error` and
    /// returns the request error.
    pub fn start<R: ProjectRemote + ?Sized>(
        &mut self,
        remote: &R,
        project_id: &str,
        item_count: usize,
        scheduler: &mut Scheduler,
        now: Duration,
    ) -> Result<()> {
        if item_count == 0 {
            return Err(EngineError::EmptyTimeline);
        }
        if self.job.status == ExportStatus::Processing {
            return Err(EngineError::ExportInProgress);
        }

        if let Err(error) = remote.start_export(project_id) {
            warn!(%error, project_id, "export start failed");
            self.cancel_poll(scheduler);
            self.job = ExportJob {
                status: ExportStatus::Error,
                progress: 0.0,
                file: None,
            };
            return Err(error);
        }

        self.job = ExportJob::processing();
        self.cancel_poll(scheduler);
        self.poll = Some(scheduler.schedule(TaskKind::ExportPoll, self.poll_interval, now));
        info!(project_id, item_count, "export started");
        Ok(())
    }

    /// Fetches the job status once and overwrites local state.
    ///
    /// Polling stops as soon as the job is terminal or the request fails; a
    /// failed poll is terminal `error`, never retried.
    pub fn poll<R: ProjectRemote + ?Sized>(
        &mut self,
        remote: &R,
        project_id: &str,
        scheduler: &mut Scheduler,
    ) -> Result<()> {
        if self.job.status != ExportStatus::Processing {
            self.cancel_poll(scheduler);
            return Ok(());
        }

        match remote.export_status(project_id) {
            Ok(report) => {
                debug!(status = ?report.status, progress = report.progress, "export polled");
                self.job = report;
                if self.job.status != ExportStatus::Processing {
                    self.cancel_poll(scheduler);
                    info!(status = ?self.job.status, file = ?self.job.file, "export finished");
                }
                Ok(())
            }
            Err(error) => {
                warn!(%error, project_id, "export poll failed");
                self.job = self.job.failed();
                self.cancel_poll(scheduler);
                Err(error)
            }
        }
    }

    /// Downloads the rendered artifact; only allowed once completed.
    pub fn download<R: ProjectRemote + ?Sized>(
        &self,
        remote: &R,
        project_id: &str,
    ) -> Result<Vec<u8>> {
        if self.job.status != ExportStatus::Completed {
            return Err(EngineError::ExportNotReady);
        }
        remote.download_export(project_id)
    }

    /// Stops polling and forgets the job. Safe to call repeatedly.
    pub fn dismiss(&mut self, scheduler: &mut Scheduler) {
        self.cancel_poll(scheduler);
        self.job = ExportJob::default();
    }

    fn cancel_poll(&mut self, scheduler: &mut Scheduler) {
        if let Some(task) = self.poll.take() {
            scheduler.cancel(task);
        }
    }
}
