mod cli;
mod config;
mod error;
mod files;
mod jobs;
mod logging;
mod paths;
mod program;
mod server;
mod templates;
#[cfg(test)]
mod test_utils;
mod workspaces;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use crate::cli::Args;
use crate::config::resolve_config;
use crate::logging::init_tracing;
use crate::server::{build_router, wait_for_shutdown, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = resolve_config(&args)?;
    std::fs::create_dir_all(&config.work_dir)
        .with_context(|| format!("failed to create work dir {}", config.work_dir.display()))?;
    let _log_guard = init_tracing(&config.log_dir, args.log_to_stderr)
        .with_context(|| format!("failed to init logging in {}", config.log_dir.display()))?;

    info!(
        listen_addr = %config.listen_addr,
        work_dir = %config.work_dir.display(),
        program = %config.program,
        job_timeout_secs = config.limits.timeout_secs,
        max_upload_bytes = config.max_upload_bytes,
        "gateway starting"
    );
    let listen_addr = config.listen_addr;
    let templates_dir = config.templates_dir();
    std::fs::create_dir_all(&templates_dir).with_context(|| {
        format!("failed to create templates dir {}", templates_dir.display())
    })?;
    let app = build_router(AppState::new(config));

    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;
    info!(addr = %listen_addr, "gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown())
        .await?;
    info!("gateway shutting down");
    Ok(())
}
