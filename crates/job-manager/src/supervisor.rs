use std::sync::Arc;
use std::time::Duration;

use protocol::JobStatus;
use tokio::task::JoinHandle;

use crate::job::JobEntry;
use crate::runner::{run_process, RunOutcome, StopReason};

pub(crate) fn spawn_supervisor(
    entry: Arc<JobEntry>,
    timeout: Option<Duration>,
    grace: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        supervise(entry, timeout, grace).await;
    })
}

async fn supervise(entry: Arc<JobEntry>, timeout: Option<Duration>, grace: Duration) {
    {
        let mut state = entry.state.lock().await;
        if state.status != JobStatus::Pending {
            tracing::debug!(
                event = "job.skipped",
                id = %entry.id,
                status = %state.status,
                "job left pending before launch"
            );
            return;
        }
        if let Err(err) = entry.advance(&mut state, JobStatus::Running, "start") {
            tracing::error!(event = "job.start_failed", id = %entry.id, error = %err);
            return;
        }
    }
    tracing::info!(
        event = "job.started",
        id = %entry.id,
        program = %entry.request.program,
        args = ?entry.request.args,
        cwd = %entry.request.working_dir.display(),
        timeout_ms = ?timeout.map(|timeout| timeout.as_millis() as u64),
        "job started"
    );

    // The run gets its own task so a panic inside it still settles the job.
    let run = tokio::spawn({
        let entry = Arc::clone(&entry);
        async move {
            run_process(
                &entry.request,
                Arc::clone(&entry.stdout),
                Arc::clone(&entry.stderr),
                entry.cancel.clone(),
                timeout,
                grace,
            )
            .await
        }
    });
    let outcome = run.await;

    let mut state = entry.state.lock().await;
    let next = match outcome {
        Ok(Ok(RunOutcome::Exited(exit_code))) => {
            state.exit_code = exit_code;
            if exit_code == Some(0) {
                JobStatus::Completed
            } else {
                JobStatus::Failed
            }
        }
        Ok(Ok(RunOutcome::Stopped(reason))) => {
            state.cancel_requested = true;
            if reason == StopReason::TimedOut {
                state.timed_out = true;
                state.error = timeout.map(|timeout| format!("timed out after {timeout:?}"));
            }
            JobStatus::Cancelled
        }
        Ok(Err(err)) => {
            tracing::warn!(event = "job.launch_failed", id = %entry.id, error = %err);
            state.error = Some(err.to_string());
            JobStatus::Failed
        }
        Err(err) => {
            tracing::error!(event = "job.run_aborted", id = %entry.id, error = %err);
            state.error = Some(format!("job runner aborted: {err}"));
            JobStatus::Failed
        }
    };
    if let Err(err) = entry.advance(&mut state, next, "finish") {
        tracing::error!(event = "job.finish_failed", id = %entry.id, error = %err);
        return;
    }
    tracing::info!(
        event = "job.finished",
        id = %entry.id,
        status = %next,
        exit_code = ?state.exit_code,
        timed_out = state.timed_out,
        "job finished"
    );
}
