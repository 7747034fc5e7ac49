//! Asynchronous supervision of external commands.
//!
//! A [`JobManager`] launches a program in a working directory, captures its
//! output while it runs and enforces a deadline. Jobs stay queryable until
//! they are deleted.

mod config;
mod error;
mod job;
mod listing;
mod logs;
mod manager;
mod process;
mod registry;
mod runner;
mod stream;
mod supervisor;
#[cfg(test)]
mod test_utils;

pub use config::LimitsConfig;
pub use error::{JobError, Result};
pub use job::JobRequest;
pub use listing::{Iter, JobListing};
pub use logs::CapturedLogs;
pub use manager::{ExecOutput, JobManager};
pub use protocol::{JobSnapshot, JobStatus, StatusCounts};
