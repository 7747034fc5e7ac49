use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Default)]
#[command(
    name = "gmx-gateway",
    version,
    about = "REST gateway that runs a command-line binary as tracked jobs"
)]
pub(crate) struct Args {
    /// Optional TOML file with `[gateway]` and `[limits]` tables.
    #[arg(long)]
    pub(crate) config: Option<PathBuf>,
    #[arg(long, env = "LISTEN_ADDR")]
    pub(crate) listen_addr: Option<String>,
    #[arg(long, env = "WORK_DIR")]
    pub(crate) work_dir: Option<PathBuf>,
    /// Binary every request's subcommand is passed to.
    #[arg(long, env = "GATEWAY_PROGRAM")]
    pub(crate) program: Option<String>,
    /// Default job deadline, e.g. `3600` (seconds) or `90m`. `0` disables it.
    #[arg(long, env = "JOB_TIMEOUT", value_parser = parse_timeout)]
    pub(crate) job_timeout: Option<Duration>,
    #[arg(long, env = "MAX_UPLOAD_SIZE")]
    pub(crate) max_upload_bytes: Option<u64>,
    #[arg(long)]
    pub(crate) log_dir: Option<PathBuf>,
    #[arg(long, default_value_t = false)]
    pub(crate) log_to_stderr: bool,
}

/// Accepts bare seconds as well as humantime durations.
pub(crate) fn parse_timeout(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(raw).map_err(|err| format!("invalid duration {raw:?}: {err}"))
}
