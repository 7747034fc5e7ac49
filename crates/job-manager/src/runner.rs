use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::job::JobRequest;
use crate::logs::LogBuffer;
use crate::process::{apply_process_group, exit_code_of, terminate_child};
use crate::stream::{read_stream_capture, write_stdin};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopReason {
    Cancelled,
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunOutcome {
    /// The process exited on its own (or won the race against a stop request).
    Exited(Option<i32>),
    /// The process was terminated by the manager before it exited.
    Stopped(StopReason),
}

enum Event {
    Exited(io::Result<ExitStatus>),
    Interrupted(StopReason),
}

/// Spawns `request` and drives it until exit, cancellation or deadline.
///
/// The three events race in a biased select that polls process exit first,
/// and a stop request re-checks `try_wait` before signalling, so a process
/// that has already exited always keeps its exit code. Output is fully
/// drained into `stdout`/`stderr` before this returns.
pub(crate) async fn run_process(
    request: &JobRequest,
    stdout: Arc<LogBuffer>,
    stderr: Arc<LogBuffer>,
    cancel: CancellationToken,
    timeout: Option<Duration>,
    grace: Duration,
) -> Result<RunOutcome> {
    let mut cmd = Command::new(&request.program);
    cmd.args(&request.args);
    cmd.current_dir(&request.working_dir);
    if request.stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);
    apply_process_group(&mut cmd);
    let mut child = cmd
        .spawn()
        .map_err(|err| request.launch_error(err.to_string()))?;
    // A deadline past the clock's range never fires.
    let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));

    if let (Some(input), Some(pipe)) = (request.stdin.clone(), child.stdin.take()) {
        tokio::spawn(write_stdin(pipe, input));
    }
    let stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("missing stdout"))?;
    let stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("missing stderr"))?;
    let stdout_task = tokio::spawn(read_stream_capture(stdout_pipe, stdout));
    let stderr_task = tokio::spawn(read_stream_capture(stderr_pipe, stderr));

    let event = tokio::select! {
        biased;
        status = child.wait() => Event::Exited(status),
        _ = cancel.cancelled() => Event::Interrupted(StopReason::Cancelled),
        _ = wait_deadline(deadline) => Event::Interrupted(StopReason::TimedOut),
    };
    let outcome = match event {
        Event::Exited(status) => RunOutcome::Exited(exit_code_of(status?)),
        Event::Interrupted(reason) => match child.try_wait()? {
            Some(status) => RunOutcome::Exited(exit_code_of(status)),
            None => {
                let pid = child.id();
                if terminate_child(&mut child, grace).await.is_none() {
                    tracing::warn!(pid = ?pid, "process still running after kill");
                }
                RunOutcome::Stopped(reason)
            }
        },
    };

    drain_capture(stdout_task, grace, "stdout").await;
    drain_capture(stderr_task, grace, "stderr").await;
    Ok(outcome)
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Waits for a reader to hit EOF. Descendants that inherited the pipe can
/// hold it open past the process exit; such readers are aborted after `bound`.
async fn drain_capture(task: JoinHandle<io::Result<()>>, bound: Duration, stream: &'static str) {
    let abort = task.abort_handle();
    match tokio::time::timeout(bound, task).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(err))) => tracing::warn!(stream, error = %err, "output read failed"),
        Ok(Err(err)) => tracing::warn!(stream, error = %err, "output task join failed"),
        Err(_) => {
            abort.abort();
            tracing::warn!(stream, "output still open after process exit, detaching");
        }
    }
}
