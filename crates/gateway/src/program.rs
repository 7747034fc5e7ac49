use std::time::Duration;

use axum::extract::{Path, State};
use axum::Json;
use job_manager::{ExecOutput, JobRequest, Result as JobResult};
use protocol::api::{ProgramCommandsResponse, ProgramHelpResponse, ProgramVersionResponse};

use crate::error::ApiError;
use crate::server::AppState;

/// Runs `<program> <args...>` in the work dir and waits for it.
///
/// `timeout` of `None` falls back to the configured job timeout.
pub(crate) async fn run_program<I, S>(
    state: &AppState,
    args: I,
    timeout: Option<Duration>,
) -> JobResult<ExecOutput>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut request = JobRequest::new(
        state.config.program.clone(),
        args,
        state.config.work_dir.clone(),
    );
    if let Some(timeout) = timeout {
        request = request.with_timeout(timeout);
    }
    state.manager.execute_sync(request).await
}

pub(crate) async fn version(
    State(state): State<AppState>,
) -> Result<Json<ProgramVersionResponse>, ApiError> {
    let output = run_program(&state, ["--version"], None).await?;
    Ok(Json(ProgramVersionResponse {
        success: output.success(),
        version: output.logs.stdout_text(),
    }))
}

pub(crate) async fn commands(
    State(state): State<AppState>,
) -> Result<Json<ProgramCommandsResponse>, ApiError> {
    let output = run_program(&state, ["help", "commands"], None).await?;
    Ok(Json(ProgramCommandsResponse {
        success: output.success(),
        commands: output.logs.stdout_text(),
    }))
}

/// `<program> <command> -h`; the command is passed as a single argument.
pub(crate) async fn help(
    State(state): State<AppState>,
    Path(command): Path<String>,
) -> Result<Json<ProgramHelpResponse>, ApiError> {
    if command.trim().is_empty() {
        return Err(ApiError::bad_request("command is empty"));
    }
    let output = run_program(&state, [command.as_str(), "-h"], None).await?;
    Ok(Json(ProgramHelpResponse {
        success: output.success(),
        help: output.logs.stdout_text(),
        command,
    }))
}
