use std::time::Duration;

use protocol::JobStatus;

/// Errors returned by [`crate::JobManager`] operations.
///
/// A process that exits with a non-zero code is not an error: it is recorded
/// as a `Failed` job (or a non-zero `exit_code` for synchronous runs).
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("job not found: {0}")]
    NotFound(String),

    #[error("cannot {action} job {id} while it is {status}")]
    InvalidState {
        id: String,
        status: JobStatus,
        action: &'static str,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("failed to launch {program}: {reason}")]
    Launch { program: String, reason: String },

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("execution cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, JobError>;
