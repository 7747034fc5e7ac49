use std::sync::Arc;
use std::time::{Duration, SystemTime};

use axum::body::Body;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use job_manager::JobManager;
use protocol::api::{HealthResponse, InfoResponse, MetricsResponse, ServiceIndex};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::config::GatewayConfig;
use crate::program::run_program;
use crate::{files, jobs, program, templates, workspaces};

const VERSION_TIMEOUT: Duration = Duration::from_secs(5);
// Multipart framing on top of the file itself.
const UPLOAD_OVERHEAD_BYTES: u64 = 64 * 1024;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) manager: JobManager,
    pub(crate) config: Arc<GatewayConfig>,
}

impl AppState {
    pub(crate) fn new(config: GatewayConfig) -> Self {
        let manager = JobManager::new(config.limits.clone());
        Self {
            manager,
            config: Arc::new(config),
        }
    }
}

pub(crate) fn build_router(state: AppState) -> Router {
    let upload_limit = state
        .config
        .max_upload_bytes
        .saturating_add(UPLOAD_OVERHEAD_BYTES);
    let upload_limit = usize::try_from(upload_limit).unwrap_or(usize::MAX);
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/info", get(system_info))
        .route("/metrics", get(metrics))
        .route("/gromacs/execute", post(jobs::execute))
        .route("/gromacs/execute/sync", post(jobs::execute_sync))
        .route("/gromacs/version", get(program::version))
        .route("/gromacs/commands", get(program::commands))
        .route("/gromacs/help/:command", get(program::help))
        .route("/execute", post(jobs::execute))
        .route("/execute/sync", post(jobs::execute_sync))
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/:id", get(jobs::get_job).delete(jobs::delete_job))
        .route("/jobs/:id/logs", get(jobs::get_job_logs))
        .route("/jobs/:id/cancel", post(jobs::cancel_job))
        .route(
            "/files/upload",
            post(files::upload_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/files/list", get(files::list_files))
        .route("/files/view/*path", get(files::view_file))
        .route("/files/download/*path", get(files::download_file))
        .route("/files/delete/*path", delete(files::delete_file))
        .route("/workspaces/create", post(workspaces::create_workspace))
        .route("/workspaces/list", get(workspaces::list_workspaces))
        .route(
            "/workspaces",
            get(workspaces::list_workspaces).post(workspaces::create_workspace),
        )
        .route("/workspaces/:name", delete(workspaces::delete_workspace))
        .route("/templates/list", get(templates::list_templates))
        .route("/templates/create", post(templates::create_template))
        .route("/templates/:name", get(templates::get_template))
        .with_state(state)
        .layer(middleware::from_fn(log_http_request))
        .layer(CorsLayer::permissive())
}

async fn root() -> Json<ServiceIndex> {
    Json(ServiceIndex {
        name: "gmx-gateway".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        description: "REST gateway for running command-line jobs".to_string(),
        health: "/health".to_string(),
    })
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let available = program_version(&state).await.is_some();
    Json(HealthResponse {
        status: if available { "healthy" } else { "unhealthy" }.to_string(),
        program: if available { "available" } else { "unavailable" }.to_string(),
        timestamp: humantime::format_rfc3339_seconds(SystemTime::now()).to_string(),
    })
}

async fn system_info(State(state): State<AppState>) -> Json<InfoResponse> {
    let program_version = program_version(&state)
        .await
        .unwrap_or_else(|| format!("Unable to get {} version", state.config.program));
    Json(InfoResponse {
        api_version: env!("CARGO_PKG_VERSION").to_string(),
        program_version,
        work_directory: state.config.work_dir.display().to_string(),
        max_upload_size_mb: state.config.max_upload_bytes as f64 / (1024.0 * 1024.0),
        job_timeout_seconds: state.config.limits.timeout_secs,
    })
}

async fn metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    let jobs = state.manager.counts().await;
    Json(MetricsResponse {
        active_jobs: jobs.running,
        jobs,
    })
}

/// Runs `<program> --version`; `None` when it cannot be run or exits non-zero.
async fn program_version(state: &AppState) -> Option<String> {
    match run_program(state, ["--version"], Some(VERSION_TIMEOUT)).await {
        Ok(output) if output.success() => Some(output.logs.stdout_text()),
        Ok(output) => {
            tracing::debug!(exit_code = ?output.exit_code, "version check exited non-zero");
            None
        }
        Err(err) => {
            tracing::debug!(error = %err, "version check failed");
            None
        }
    }
}

async fn log_http_request(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let started = std::time::Instant::now();
    let response = next.run(req).await;
    let status = response.status();
    tracing::info!(
        method = %method,
        uri = %uri,
        status = %status,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "http request"
    );
    response
}

pub(crate) async fn wait_for_shutdown() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(err) => tracing::error!(error = %err, "failed to listen for shutdown signal"),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_utils::test_state;
    use axum::http::{header, Method, StatusCode};
    use tower::ServiceExt;

    async fn send(state: AppState, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = build_router(state).oneshot(request).await.expect("infallible");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, body)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    #[tokio::test]
    async fn execute_routes_under_program_prefix_and_short_aliases() {
        let (state, _dir) = test_state("echo");
        for uri in ["/gromacs/execute/sync", "/execute/sync"] {
            let request = post_json(uri, serde_json::json!({"command": "hi", "args": ["there"]}));
            let (status, body) = send(state.clone(), request).await;
            assert_eq!(status, StatusCode::OK, "{uri}");
            assert_eq!(body["stdout"], "hi there\n");
            assert_eq!(body["returncode"], 0);
        }

        let request = post_json("/gromacs/execute", serde_json::json!({"command": "hi"}));
        let (status, body) = send(state.clone(), request).await;
        assert_eq!(status, StatusCode::OK);
        let id = body["job_id"].as_str().expect("job id").to_string();
        let snapshot = tokio::time::timeout(Duration::from_secs(10), state.manager.wait(&id))
            .await
            .expect("job settles")
            .expect("job exists");
        assert_eq!(snapshot.args, vec!["hi"]);

        let (status, body) = send(state, get_request("/gromacs/help/mdrun")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["help"], "mdrun -h\n");
    }

    #[tokio::test]
    async fn workspace_and_template_routes_match_client_paths() {
        let (state, _dir) = test_state("echo");
        let request = post_json("/workspaces/create", serde_json::json!({"name": "lyso"}));
        let (status, _) = send(state.clone(), request).await;
        assert_eq!(status, StatusCode::OK);
        for uri in ["/workspaces/list", "/workspaces"] {
            let (status, body) = send(state.clone(), get_request(uri)).await;
            assert_eq!(status, StatusCode::OK, "{uri}");
            assert_eq!(body["workspaces"][0]["name"], "lyso");
        }

        let request = post_json(
            "/templates/create",
            serde_json::json!({"name": "em.mdp", "content": "integrator = steep\n"}),
        );
        let (status, _) = send(state.clone(), request).await;
        assert_eq!(status, StatusCode::OK);
        let (_, listed) = send(state.clone(), get_request("/templates/list")).await;
        assert_eq!(listed["templates"][0]["name"], "em.mdp");
        let (_, read) = send(state.clone(), get_request("/templates/em.mdp")).await;
        assert_eq!(read["content"], "integrator = steep\n");
        let (status, body) = send(state, get_request("/templates/absent.mdp")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "not_found");
    }

    #[tokio::test]
    async fn cross_origin_requests_are_allowed() {
        let (state, _dir) = test_state("echo");
        let preflight = Request::builder()
            .method(Method::OPTIONS)
            .uri("/gromacs/execute")
            .header(header::ORIGIN, "http://localhost:3000")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
            .body(Body::empty())
            .expect("request");
        let response = build_router(state.clone())
            .oneshot(preflight)
            .await
            .expect("infallible");
        assert!(response.status().is_success());
        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert!(headers.contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));

        let request = Request::builder()
            .uri("/metrics")
            .header(header::ORIGIN, "http://localhost:3000")
            .body(Body::empty())
            .expect("request");
        let response = build_router(state).oneshot(request).await.expect("infallible");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn health_reflects_program_availability() {
        let (state, _dir) = test_state("true");
        assert_eq!(health(State(state)).await.0.status, "healthy");

        let (state, _dir) = test_state("definitely-not-a-real-program-7f3a");
        let Json(body) = health(State(state)).await;
        assert_eq!(body.status, "unhealthy");
        assert_eq!(body.program, "unavailable");
    }

    #[tokio::test]
    async fn info_reports_limits() {
        let (state, dir) = test_state("echo");
        let Json(info) = system_info(State(state)).await;
        assert!(!info.program_version.is_empty());
        assert_eq!(info.work_directory, dir.display().to_string());
        assert_eq!(info.max_upload_size_mb, 1.0);
        assert_eq!(info.job_timeout_seconds, 30);

        let (state, _dir) = test_state("definitely-not-a-real-program-7f3a");
        let Json(info) = system_info(State(state)).await;
        assert!(info.program_version.starts_with("Unable to get"));
    }

    #[tokio::test]
    async fn metrics_start_empty() {
        let (state, _dir) = test_state("echo");
        let Json(metrics) = metrics(State(state)).await;
        assert_eq!(metrics.active_jobs, 0);
        assert_eq!(metrics.jobs.total(), 0);
    }
}
