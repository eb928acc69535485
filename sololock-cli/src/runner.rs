//! Running a command while holding the lock.

use anyhow::Context;
use log::{error, info, warn};
use sololock::{LockCoordinator, OsHost, ProcessOracle, RuntimeHost, SystemProcesses};
use std::process::ExitStatus;
use std::time::Duration;
use tokio::process::{Child, Command};

/// Exit status reported when the child died from a signal.
const SIGNALLED: i32 = 1;

/// Spawns `command`, waits for it, and releases the lock.
///
/// On SIGINT/SIGTERM the child gets SIGTERM and up to `wait_timeout` to
/// exit before it is killed; the run then ends with status 0. Otherwise the
/// child's own exit status is returned.
pub async fn run_command(
    coordinator: &LockCoordinator,
    command: &[String],
    wait_timeout: Duration,
) -> anyhow::Result<i32> {
    let signalled = OsHost::new()
        .listen()
        .context("failed to install termination handlers")?;

    let mut child = match spawn(command) {
        Ok(child) => child,
        Err(e) => {
            coordinator.release().await;
            return Err(e);
        }
    };

    let code = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => exit_code(status),
            Err(e) => {
                error!("Failed to wait for child: {e}");
                SIGNALLED
            }
        },
        received = signalled => {
            info!("Received {received}; stopping child");
            stop(&mut child, wait_timeout).await;
            0
        }
    };

    coordinator.release().await;
    Ok(code)
}

fn spawn(command: &[String]) -> anyhow::Result<Child> {
    let (program, args) = command.split_first().context("no command given")?;
    let child = Command::new(program)
        .args(args)
        .spawn()
        .with_context(|| format!("failed to start {program}"))?;

    info!("Started {program} (PID {})", child.id().unwrap_or_default());
    Ok(child)
}

/// Sends SIGTERM, then SIGKILL if the child outlives `wait_timeout`.
async fn stop(child: &mut Child, wait_timeout: Duration) {
    let Some(pid) = child.id() else {
        return;
    };

    if let Err(e) = SystemProcesses::new().terminate(pid).await {
        warn!("Failed to forward SIGTERM to PID {pid}: {e}");
    }

    match tokio::time::timeout(wait_timeout, child.wait()).await {
        Ok(Ok(status)) => info!("Child exited with {status}"),
        Ok(Err(e)) => warn!("Failed to wait for child: {e}"),
        Err(_) => {
            warn!("Child PID {pid} still running after {wait_timeout:?}; killing it");
            if let Err(e) = child.kill().await {
                warn!("Failed to kill PID {pid}: {e}");
            }
        }
    }
}

/// Maps a child's exit status onto ours.
pub fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(SIGNALLED)
}
