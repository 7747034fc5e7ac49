use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use protocol::{JobSnapshot, JobStatus};
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{JobError, Result};
use crate::logs::{CapturedLogs, LogBuffer};

/// An external command to run: program, arguments and the directory it runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub label: Option<String>,
    /// Stem for a generated `<prefix>_<short id>` label when `label` is unset.
    pub label_prefix: Option<String>,
    pub stdin: Option<String>,
    pub timeout: Option<Duration>,
}

impl JobRequest {
    pub fn new<I, S>(program: impl Into<String>, args: I, working_dir: impl Into<PathBuf>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            working_dir: working_dir.into(),
            label: None,
            label_prefix: None,
            stdin: None,
            timeout: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_label_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.label_prefix = Some(prefix.into());
        self
    }

    pub fn with_stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub(crate) async fn validate(&self) -> Result<()> {
        if self.program.trim().is_empty() {
            return Err(JobError::InvalidRequest("command is empty".to_string()));
        }
        if self.timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(JobError::InvalidRequest(
                "timeout must be positive".to_string(),
            ));
        }
        match tokio::fs::metadata(&self.working_dir).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(self.launch_error(format!(
                "working directory {} is not a directory",
                self.working_dir.display()
            ))),
            Err(err) => Err(self.launch_error(format!(
                "working directory {}: {err}",
                self.working_dir.display()
            ))),
        }
    }

    /// Fills `label` from `label_prefix` once the job id is known.
    pub(crate) fn assign_label(&mut self, id: &str) {
        if self.label.is_some() {
            return;
        }
        if let Some(prefix) = &self.label_prefix {
            let short: String = id.chars().take(8).collect();
            self.label = Some(format!("{prefix}_{short}"));
        }
    }

    pub(crate) fn launch_error(&self, reason: impl Into<String>) -> JobError {
        JobError::Launch {
            program: self.program.clone(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct JobState {
    pub(crate) status: JobStatus,
    pub(crate) started_at: Option<SystemTime>,
    pub(crate) finished_at: Option<SystemTime>,
    pub(crate) exit_code: Option<i32>,
    pub(crate) cancel_requested: bool,
    pub(crate) timed_out: bool,
    pub(crate) error: Option<String>,
}

impl JobState {
    fn new() -> Self {
        Self {
            status: JobStatus::Pending,
            started_at: None,
            finished_at: None,
            exit_code: None,
            cancel_requested: false,
            timed_out: false,
            error: None,
        }
    }

    /// Applies one lifecycle edge and stamps the matching timestamp.
    /// Rejected edges leave the state untouched and return the current status.
    fn advance(&mut self, next: JobStatus) -> std::result::Result<(), JobStatus> {
        if !self.status.can_transition_to(next) {
            return Err(self.status);
        }
        let now = SystemTime::now();
        if next == JobStatus::Running {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.finished_at = Some(now);
        }
        self.status = next;
        Ok(())
    }
}

/// Registry record for one job. The supervisor owns every write to `state`
/// and the log buffers; the single exception is `Pending -> Cancelled`.
pub(crate) struct JobEntry {
    pub(crate) id: String,
    pub(crate) request: JobRequest,
    pub(crate) created_at: SystemTime,
    pub(crate) state: Mutex<JobState>,
    pub(crate) stdout: Arc<LogBuffer>,
    pub(crate) stderr: Arc<LogBuffer>,
    pub(crate) cancel: CancellationToken,
    status_tx: watch::Sender<JobStatus>,
}

impl JobEntry {
    pub(crate) fn new(id: String, request: JobRequest, max_log_bytes: usize) -> Self {
        let (status_tx, _) = watch::channel(JobStatus::Pending);
        Self {
            id,
            request,
            created_at: SystemTime::now(),
            state: Mutex::new(JobState::new()),
            stdout: Arc::new(LogBuffer::new(max_log_bytes)),
            stderr: Arc::new(LogBuffer::new(max_log_bytes)),
            cancel: CancellationToken::new(),
            status_tx,
        }
    }

    /// Moves the job along the state machine. Callers hold the state lock, so
    /// watchers see transitions in the order they were applied.
    pub(crate) fn advance(
        &self,
        state: &mut JobState,
        next: JobStatus,
        action: &'static str,
    ) -> Result<()> {
        state
            .advance(next)
            .map_err(|status| JobError::InvalidState {
                id: self.id.clone(),
                status,
                action,
            })?;
        self.status_tx.send_replace(next);
        Ok(())
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<JobStatus> {
        self.status_tx.subscribe()
    }

    pub(crate) async fn snapshot(&self) -> JobSnapshot {
        let state = self.state.lock().await.clone();
        JobSnapshot {
            id: self.id.clone(),
            label: self.request.label.clone(),
            program: self.request.program.clone(),
            args: self.request.args.clone(),
            working_dir: self.request.working_dir.to_string_lossy().to_string(),
            status: state.status,
            created_at_ms: system_time_ms(self.created_at),
            started_at_ms: state.started_at.map(system_time_ms),
            finished_at_ms: state.finished_at.map(system_time_ms),
            exit_code: state.exit_code,
            cancel_requested: state.cancel_requested,
            timed_out: state.timed_out,
            error: state.error,
        }
    }

    pub(crate) async fn logs(&self) -> CapturedLogs {
        CapturedLogs::collect(&self.stdout, &self.stderr).await
    }
}

pub(crate) fn system_time_ms(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}
