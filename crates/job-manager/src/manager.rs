use std::sync::Arc;

use protocol::{JobSnapshot, JobStatus, StatusCounts};
use tokio_util::sync::CancellationToken;

use crate::config::LimitsConfig;
use crate::error::{JobError, Result};
use crate::job::{JobEntry, JobRequest};
use crate::listing::JobListing;
use crate::logs::{CapturedLogs, LogBuffer};
use crate::registry::Registry;
use crate::runner::{run_process, RunOutcome, StopReason};
use crate::supervisor::spawn_supervisor;

/// Result of a synchronous execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: Option<i32>,
    pub logs: CapturedLogs,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Launches external commands and tracks them until they are deleted.
///
/// Cloning is cheap and every clone shares one registry. Separate
/// `JobManager::new` calls are fully independent.
#[derive(Clone)]
pub struct JobManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    registry: Registry,
    limits: LimitsConfig,
}

impl JobManager {
    pub fn new(limits: LimitsConfig) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                registry: Registry::new(),
                limits,
            }),
        }
    }

    /// Registers a `Pending` job and schedules it; does not wait for launch.
    ///
    /// The command and working directory are validated before anything is
    /// registered. Spawn failures (missing executable, permissions) surface
    /// later as a `Failed` job with no exit code.
    pub async fn submit(&self, request: JobRequest) -> Result<String> {
        request.validate().await?;
        let limits = &self.inner.limits;
        let timeout = request.timeout.or_else(|| limits.default_timeout());
        let entry = self
            .inner
            .registry
            .register(request, limits.max_log_bytes())
            .await;
        tracing::info!(
            event = "job.submitted",
            id = %entry.id,
            program = %entry.request.program,
            label = ?entry.request.label,
            "job submitted"
        );
        spawn_supervisor(Arc::clone(&entry), timeout, limits.cancel_grace());
        Ok(entry.id.clone())
    }

    /// Runs `request` on the caller's task and returns its output.
    ///
    /// Dropping the returned future kills the process group.
    pub async fn execute_sync(&self, request: JobRequest) -> Result<ExecOutput> {
        self.execute_sync_until(request, CancellationToken::new())
            .await
    }

    /// Like [`JobManager::execute_sync`], but `cancel` stops the process early
    /// and yields [`JobError::Cancelled`].
    pub async fn execute_sync_until(
        &self,
        request: JobRequest,
        cancel: CancellationToken,
    ) -> Result<ExecOutput> {
        request.validate().await?;
        let limits = &self.inner.limits;
        let timeout = request.timeout.or_else(|| limits.default_timeout());
        let stdout = Arc::new(LogBuffer::new(limits.max_log_bytes()));
        let stderr = Arc::new(LogBuffer::new(limits.max_log_bytes()));
        let outcome = run_process(
            &request,
            Arc::clone(&stdout),
            Arc::clone(&stderr),
            cancel,
            timeout,
            limits.cancel_grace(),
        )
        .await?;
        match outcome {
            RunOutcome::Exited(exit_code) => Ok(ExecOutput {
                exit_code,
                logs: CapturedLogs::collect(&stdout, &stderr).await,
            }),
            RunOutcome::Stopped(StopReason::TimedOut) => {
                tracing::warn!(
                    event = "exec.timed_out",
                    program = %request.program,
                    timeout = ?timeout,
                    "synchronous command timed out"
                );
                Err(JobError::Timeout(timeout.unwrap_or_default()))
            }
            RunOutcome::Stopped(StopReason::Cancelled) => Err(JobError::Cancelled),
        }
    }

    pub async fn get_status(&self, id: &str) -> Result<JobSnapshot> {
        Ok(self.entry(id).await?.snapshot().await)
    }

    pub async fn get_logs(&self, id: &str) -> Result<CapturedLogs> {
        Ok(self.entry(id).await?.logs().await)
    }

    /// Requests termination and returns without waiting for it to settle.
    ///
    /// A `Pending` job is cancelled on the spot. A `Running` job keeps that
    /// status until its supervisor sees the process stop. Any call after a
    /// successful one is a no-op.
    pub async fn cancel(&self, id: &str) -> Result<()> {
        let entry = self.entry(id).await?;
        let mut state = entry.state.lock().await;
        if state.cancel_requested {
            return Ok(());
        }
        match state.status {
            JobStatus::Pending => {
                state.cancel_requested = true;
                entry.advance(&mut state, JobStatus::Cancelled, "cancel")?;
            }
            JobStatus::Running => {
                state.cancel_requested = true;
            }
            status => {
                return Err(JobError::InvalidState {
                    id: entry.id.clone(),
                    status,
                    action: "cancel",
                });
            }
        }
        entry.cancel.cancel();
        tracing::info!(
            event = "job.cancel_requested",
            id = %entry.id,
            status = %state.status,
            "job cancel requested"
        );
        Ok(())
    }

    /// Removes a job record. Running jobs must be cancelled first; pending
    /// jobs are cancelled as part of the removal.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let removed = self
            .inner
            .registry
            .remove_if(id, |entry| async move {
                let mut state = entry.state.lock().await;
                let status = state.status;
                match status {
                    JobStatus::Running => Err(JobError::InvalidState {
                        id: entry.id.clone(),
                        status,
                        action: "delete",
                    }),
                    JobStatus::Pending => {
                        state.cancel_requested = true;
                        entry.advance(&mut state, JobStatus::Cancelled, "delete")?;
                        entry.cancel.cancel();
                        Ok(())
                    }
                    _ => Ok(()),
                }
            })
            .await
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;
        let entry = removed?;
        tracing::info!(event = "job.deleted", id = %entry.id, "job deleted");
        Ok(())
    }

    /// Snapshot of every registered job in creation order, optionally
    /// restricted to one status.
    pub async fn list(&self, filter: Option<JobStatus>) -> JobListing {
        let entries = self.inner.registry.entries().await;
        let mut jobs = Vec::with_capacity(entries.len());
        for entry in entries {
            jobs.push(entry.snapshot().await);
        }
        JobListing::new(jobs, filter)
    }

    /// Resolves once the job reaches a terminal status.
    pub async fn wait(&self, id: &str) -> Result<JobSnapshot> {
        let entry = self.entry(id).await?;
        let mut status_rx = entry.subscribe();
        // The sender lives inside `entry`, so the channel cannot close here.
        let _ = status_rx.wait_for(|status| status.is_terminal()).await;
        Ok(entry.snapshot().await)
    }

    pub async fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for entry in self.inner.registry.entries().await {
            counts.record(entry.state.lock().await.status);
        }
        counts
    }

    async fn entry(&self, id: &str) -> Result<Arc<JobEntry>> {
        self.inner
            .registry
            .get(id)
            .await
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }
}
