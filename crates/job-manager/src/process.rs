use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::{Child, Command};

/// Puts the child in its own session so signals reach its whole process group.
#[cfg(unix)]
pub(crate) fn apply_process_group(cmd: &mut Command) {
    unsafe {
        cmd.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(not(unix))]
pub(crate) fn apply_process_group(_cmd: &mut Command) {}

#[derive(Clone, Copy)]
enum GroupSignal {
    Terminate,
    Kill,
}

#[cfg(unix)]
fn signal_group(child: &Child, signal: GroupSignal) {
    let signal = match signal {
        GroupSignal::Terminate => libc::SIGTERM,
        GroupSignal::Kill => libc::SIGKILL,
    };
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(-(pid as i32), signal);
        }
    }
}

// Without process groups only the direct child is stopped, via `Child::kill`.
#[cfg(not(unix))]
fn signal_group(_child: &Child, _signal: GroupSignal) {}

/// SIGTERM to the group, then SIGKILL once `grace` runs out.
pub(crate) async fn terminate_child(child: &mut Child, grace: Duration) -> Option<ExitStatus> {
    signal_group(child, GroupSignal::Terminate);
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => status.ok(),
        Err(_) => {
            tracing::warn!(
                pid = ?child.id(),
                grace_ms = grace.as_millis() as u64,
                "process ignored SIGTERM, killing"
            );
            signal_group(child, GroupSignal::Kill);
            let _ = child.kill().await;
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(status) => status.ok(),
                Err(_) => None,
            }
        }
    }
}

/// Exit code of a finished process; death by signal maps to `128 + signal`.
#[cfg(unix)]
pub(crate) fn exit_code_of(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
}

#[cfg(not(unix))]
pub(crate) fn exit_code_of(status: ExitStatus) -> Option<i32> {
    status.code()
}
