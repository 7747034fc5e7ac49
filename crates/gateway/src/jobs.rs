use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::Json;
use job_manager::{JobRequest, JobSnapshot, JobStatus};
use protocol::api::{
    ActionResponse, ExecuteRequest, JobListResponse, JobLogsResponse, SubmitResponse,
    SyncExecResponse,
};
use serde::Deserialize;

use crate::error::ApiError;
use crate::paths::resolve_relative;
use crate::server::AppState;

const DEFAULT_LIST_LIMIT: usize = 100;

/// Turns an API body into `<program> <command> <args...>` run under the work dir.
fn build_request(state: &AppState, body: &ExecuteRequest) -> Result<JobRequest, ApiError> {
    if body.command.trim().is_empty() {
        return Err(ApiError::bad_request("command is empty"));
    }
    let working_dir = resolve_relative(&state.config.work_dir, &body.working_dir)?;
    let args = std::iter::once(body.command.clone()).chain(body.args.iter().cloned());
    let mut request = JobRequest::new(state.config.program.clone(), args, working_dir);
    request = match &body.job_name {
        Some(name) => request.with_label(name.clone()),
        None => request.with_label_prefix(body.command.clone()),
    };
    if let Some(input) = &body.stdin_input {
        request = request.with_stdin(input.clone());
    }
    if let Some(secs) = body.timeout_secs {
        request = request.with_timeout(Duration::from_secs(secs));
    }
    Ok(request)
}

pub(crate) async fn execute(
    State(state): State<AppState>,
    Json(body): Json<ExecuteRequest>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let request = build_request(&state, &body)?;
    let job_id = state.manager.submit(request).await?;
    let snapshot = state.manager.get_status(&job_id).await?;
    Ok(Json(SubmitResponse {
        job_name: snapshot.label.unwrap_or_else(|| job_id.clone()),
        job_id,
        status: JobStatus::Pending,
        message: "Job submitted successfully".to_string(),
    }))
}

pub(crate) async fn execute_sync(
    State(state): State<AppState>,
    Json(body): Json<ExecuteRequest>,
) -> Result<Json<SyncExecResponse>, ApiError> {
    let request = build_request(&state, &body)?;
    let output = state.manager.execute_sync(request).await?;
    Ok(Json(SyncExecResponse {
        success: output.success(),
        stdout: output.logs.stdout_text(),
        stderr: output.logs.stderr_text(),
        returncode: output.exit_code,
        command: body.command,
        args: body.args,
    }))
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListQuery {
    status: Option<String>,
    limit: Option<usize>,
}

/// Newest first; `total` counts every match before `limit` applies.
pub(crate) async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<JobListResponse>, ApiError> {
    let filter = query
        .status
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .map(str::parse::<JobStatus>)
        .transpose()
        .map_err(ApiError::bad_request)?;
    let listing = state.manager.list(filter).await;
    let mut jobs: Vec<JobSnapshot> = listing.iter().cloned().collect();
    jobs.reverse();
    let total = jobs.len();
    jobs.truncate(query.limit.unwrap_or(DEFAULT_LIST_LIMIT));
    Ok(Json(JobListResponse { jobs, total }))
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct GetJobQuery {
    #[serde(default)]
    wait: bool,
}

pub(crate) async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<GetJobQuery>,
) -> Result<Json<JobSnapshot>, ApiError> {
    let snapshot = if query.wait {
        state.manager.wait(&id).await?
    } else {
        state.manager.get_status(&id).await?
    };
    Ok(Json(snapshot))
}

pub(crate) async fn get_job_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobLogsResponse>, ApiError> {
    let logs = state.manager.get_logs(&id).await?;
    Ok(Json(JobLogsResponse {
        stdout: logs.stdout_text(),
        stderr: logs.stderr_text(),
        stdout_truncated: logs.stdout_truncated,
        stderr_truncated: logs.stderr_truncated,
        job_id: id,
    }))
}

pub(crate) async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ActionResponse>, ApiError> {
    state.manager.cancel(&id).await?;
    Ok(Json(ActionResponse::ok("cancel requested")))
}

pub(crate) async fn delete_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ActionResponse>, ApiError> {
    state.manager.delete(&id).await?;
    Ok(Json(ActionResponse::ok(format!("Job {id} deleted"))))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_utils::test_state;
    use axum::http::StatusCode;

    fn body(command: &str, args: &[&str]) -> ExecuteRequest {
        ExecuteRequest {
            command: command.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
            working_dir: ".".to_string(),
            job_name: None,
            stdin_input: None,
            timeout_secs: None,
        }
    }

    async fn wait(state: &AppState, id: &str) -> JobSnapshot {
        let query = Query(GetJobQuery { wait: true });
        tokio::time::timeout(
            Duration::from_secs(10),
            get_job(State(state.clone()), Path(id.to_string()), query),
        )
        .await
        .expect("job settles")
        .expect("job exists")
        .0
    }

    #[tokio::test]
    async fn submitted_job_runs_under_program_prefix() {
        let (state, _dir) = test_state("echo");
        let Json(submitted) = execute(State(state.clone()), Json(body("hello", &["world"])))
            .await
            .expect("submit");
        assert_eq!(submitted.status, JobStatus::Pending);
        assert!(submitted.job_name.starts_with("hello_"));
        assert_eq!(submitted.job_name.len(), "hello_".len() + 8);

        let snapshot = wait(&state, &submitted.job_id).await;
        assert_eq!(snapshot.status, JobStatus::Completed);
        assert_eq!(snapshot.args, vec!["hello", "world"]);
        assert_eq!(snapshot.label.as_deref(), Some(submitted.job_name.as_str()));

        let Json(logs) = get_job_logs(State(state.clone()), Path(submitted.job_id.clone()))
            .await
            .expect("logs");
        assert_eq!(logs.stdout, "hello world\n");
        assert!(!logs.stdout_truncated);
    }

    #[tokio::test]
    async fn job_name_and_working_dir_are_honoured() {
        let (state, dir) = test_state("sh");
        std::fs::create_dir_all(dir.join("run1")).expect("mkdir");
        let mut request = body("-c", &["pwd"]);
        request.working_dir = "run1".to_string();
        request.job_name = Some("where".to_string());
        let Json(submitted) = execute(State(state.clone()), Json(request))
            .await
            .expect("submit");
        assert_eq!(submitted.job_name, "where");
        wait(&state, &submitted.job_id).await;
        let Json(logs) = get_job_logs(State(state.clone()), Path(submitted.job_id))
            .await
            .expect("logs");
        let expected = dir.join("run1").canonicalize().expect("canonical");
        assert_eq!(logs.stdout.trim_end(), expected.display().to_string());
    }

    #[tokio::test]
    async fn escaping_working_dir_is_bad_request() {
        let (state, _dir) = test_state("echo");
        let mut request = body("hello", &[]);
        request.working_dir = "../outside".to_string();
        let err = execute(State(state), Json(request))
            .await
            .expect_err("rejected");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_working_dir_is_unprocessable() {
        let (state, _dir) = test_state("echo");
        let mut request = body("hello", &[]);
        request.working_dir = "not-created".to_string();
        let err = execute(State(state.clone()), Json(request))
            .await
            .expect_err("rejected");
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(state.manager.counts().await.total(), 0);
    }

    #[tokio::test]
    async fn sync_execution_reports_output_and_failures() {
        let (state, _dir) = test_state("sh");
        let Json(ok) = execute_sync(State(state.clone()), Json(body("-c", &["echo out"])))
            .await
            .expect("execute");
        assert!(ok.success);
        assert_eq!(ok.stdout, "out\n");
        assert_eq!(ok.returncode, Some(0));
        assert_eq!(ok.command, "-c");

        let Json(failed) = execute_sync(State(state.clone()), Json(body("-c", &["exit 5"])))
            .await
            .expect("execute");
        assert!(!failed.success);
        assert_eq!(failed.returncode, Some(5));

        let mut slow = body("-c", &["sleep 10"]);
        slow.timeout_secs = Some(1);
        let err = execute_sync(State(state), Json(slow))
            .await
            .expect_err("timeout");
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn stdin_input_reaches_process() {
        let (state, _dir) = test_state("sh");
        let mut request = body("-c", &["cat"]);
        request.stdin_input = Some("13\n".to_string());
        let Json(output) = execute_sync(State(state), Json(request))
            .await
            .expect("execute");
        assert_eq!(output.stdout, "13\n");
    }

    #[tokio::test]
    async fn listing_is_newest_first_with_limit_and_filter() {
        let (state, _dir) = test_state("echo");
        let mut ids = Vec::new();
        for word in ["a", "b", "c"] {
            let Json(submitted) = execute(State(state.clone()), Json(body(word, &[])))
                .await
                .expect("submit");
            wait(&state, &submitted.job_id).await;
            ids.push(submitted.job_id);
        }

        let query = ListQuery {
            status: Some("completed".to_string()),
            limit: Some(2),
        };
        let Json(listed) = list_jobs(State(state.clone()), Query(query))
            .await
            .expect("list");
        assert_eq!(listed.total, 3);
        let listed_ids: Vec<_> = listed.jobs.iter().map(|job| job.id.clone()).collect();
        assert_eq!(listed_ids, vec![ids[2].clone(), ids[1].clone()]);

        let query = ListQuery {
            status: Some("running".to_string()),
            limit: None,
        };
        let Json(running) = list_jobs(State(state.clone()), Query(query))
            .await
            .expect("list");
        assert_eq!(running.total, 0);

        let query = ListQuery {
            status: Some("bogus".to_string()),
            limit: None,
        };
        let err = list_jobs(State(state), Query(query))
            .await
            .expect_err("bad status");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cancel_and_delete_follow_job_lifecycle() {
        let (state, _dir) = test_state("sleep");
        let Json(submitted) = execute(State(state.clone()), Json(body("10", &[])))
            .await
            .expect("submit");
        let id = submitted.job_id;
        for _ in 0..200 {
            let status = state.manager.get_status(&id).await.expect("status").status;
            if status == JobStatus::Running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let err = delete_job(State(state.clone()), Path(id.clone()))
            .await
            .expect_err("running");
        assert_eq!(err.status(), StatusCode::CONFLICT);

        cancel_job(State(state.clone()), Path(id.clone()))
            .await
            .expect("cancel");
        assert_eq!(wait(&state, &id).await.status, JobStatus::Cancelled);

        delete_job(State(state.clone()), Path(id.clone()))
            .await
            .expect("delete");
        let err = get_job(State(state), Path(id), Query(GetJobQuery::default()))
            .await
            .expect_err("deleted");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cancelling_finished_job_conflicts() {
        let (state, _dir) = test_state("echo");
        let Json(submitted) = execute(State(state.clone()), Json(body("done", &[])))
            .await
            .expect("submit");
        wait(&state, &submitted.job_id).await;
        let err = cancel_job(State(state), Path(submitted.job_id))
            .await
            .expect_err("finished");
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }
}
