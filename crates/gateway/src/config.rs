use anyhow::Context;
use job_manager::LimitsConfig;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::cli::Args;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_WORK_DIR: &str = "/data";
const DEFAULT_PROGRAM: &str = "gmx";
const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;
const TEMPLATES_DIR: &str = ".templates";

/// On-disk layout of the optional TOML file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct FileConfig {
    pub(crate) gateway: GatewaySection,
    pub(crate) limits: LimitsConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct GatewaySection {
    pub(crate) listen_addr: Option<String>,
    pub(crate) work_dir: Option<PathBuf>,
    pub(crate) program: Option<String>,
    pub(crate) max_upload_bytes: Option<u64>,
    pub(crate) log_dir: Option<PathBuf>,
}

/// Effective settings after merging defaults, the file and the command line.
#[derive(Debug, Clone)]
pub(crate) struct GatewayConfig {
    pub(crate) listen_addr: SocketAddr,
    pub(crate) work_dir: PathBuf,
    pub(crate) program: String,
    pub(crate) max_upload_bytes: u64,
    pub(crate) log_dir: PathBuf,
    pub(crate) limits: LimitsConfig,
}

impl GatewayConfig {
    /// Hidden so workspace and file listings skip it.
    pub(crate) fn templates_dir(&self) -> PathBuf {
        self.work_dir.join(TEMPLATES_DIR)
    }
}

pub(crate) fn load_file_config(path: &Path) -> anyhow::Result<FileConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: FileConfig = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    Ok(config)
}

pub(crate) fn resolve_config(args: &Args) -> anyhow::Result<GatewayConfig> {
    let file = match &args.config {
        Some(path) => load_file_config(path)?,
        None => FileConfig::default(),
    };
    merge(args, file)
}

fn merge(args: &Args, file: FileConfig) -> anyhow::Result<GatewayConfig> {
    let FileConfig { gateway, mut limits } = file;
    let listen_addr = args
        .listen_addr
        .clone()
        .or(gateway.listen_addr)
        .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
    let listen_addr = listen_addr
        .parse()
        .with_context(|| format!("invalid listen_addr {listen_addr}"))?;
    let work_dir = args
        .work_dir
        .clone()
        .or(gateway.work_dir)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_WORK_DIR));
    let program = args
        .program
        .clone()
        .or(gateway.program)
        .unwrap_or_else(|| DEFAULT_PROGRAM.to_string());
    if program.trim().is_empty() {
        anyhow::bail!("program must not be empty");
    }
    let max_upload_bytes = args
        .max_upload_bytes
        .or(gateway.max_upload_bytes)
        .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);
    let log_dir = args
        .log_dir
        .clone()
        .or(gateway.log_dir)
        .unwrap_or_else(|| work_dir.join(".logs"));
    if let Some(timeout) = args.job_timeout {
        limits.timeout_secs = timeout.as_secs();
    }
    Ok(GatewayConfig {
        listen_addr,
        work_dir,
        program,
        max_upload_bytes,
        log_dir,
        limits,
    })
}
