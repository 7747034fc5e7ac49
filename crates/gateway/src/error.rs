use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use job_manager::JobError;
use protocol::api::ErrorPayload;

/// Handler failure rendered as `{code, message}` with a matching status.
#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub(crate) fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
    }

    pub(crate) fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        let (status, code) = match &err {
            JobError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            JobError::InvalidState { .. } => (StatusCode::CONFLICT, "invalid_state"),
            JobError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            JobError::Launch { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "launch_failed"),
            JobError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            JobError::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "cancelled"),
            JobError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io"),
        };
        Self::new(status, code, err.to_string())
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::not_found(err.to_string()),
            _ => Self::new(StatusCode::INTERNAL_SERVER_ERROR, "io", err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::warn!(
                status = %self.status,
                code = self.code,
                error = %self.message,
                "request failed"
            );
        }
        let body = ErrorPayload {
            code: self.code.to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::JobStatus;
    use std::time::Duration;

    #[test]
    fn job_errors_map_to_http_statuses() {
        let cases = [
            (JobError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (
                JobError::InvalidState {
                    id: "x".into(),
                    status: JobStatus::Running,
                    action: "delete",
                },
                StatusCode::CONFLICT,
            ),
            (JobError::InvalidRequest("empty".into()), StatusCode::BAD_REQUEST),
            (
                JobError::Launch {
                    program: "gmx".into(),
                    reason: "not found".into(),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (JobError::Timeout(Duration::from_secs(1)), StatusCode::GATEWAY_TIMEOUT),
            (
                JobError::Io(std::io::Error::other("disk")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = std::io::Error::from(std::io::ErrorKind::NotFound);
        assert_eq!(ApiError::from(err).status(), StatusCode::NOT_FOUND);
    }
}
