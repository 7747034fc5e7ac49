use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use job_manager::LimitsConfig;

use crate::config::GatewayConfig;
use crate::server::AppState;

static NEXT: AtomicU64 = AtomicU64::new(0);

pub(crate) fn temp_dir(prefix: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let n = NEXT.fetch_add(1, Ordering::Relaxed);
    dir.push(format!("{prefix}-{}-{nanos}-{n}", std::process::id()));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

/// State rooted in a fresh work directory that wraps `program`.
pub(crate) fn test_state(program: &str) -> (AppState, PathBuf) {
    let work_dir = temp_dir("gateway");
    let config = GatewayConfig {
        listen_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
        work_dir: work_dir.clone(),
        program: program.to_string(),
        max_upload_bytes: 1024 * 1024,
        log_dir: work_dir.join(".logs"),
        limits: LimitsConfig {
            timeout_secs: 30,
            cancel_grace_ms: 500,
            max_log_bytes: 64 * 1024,
        },
    };
    (AppState::new(config), work_dir)
}
