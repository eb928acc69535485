//! Process probing and signalling through `kill(2)`.

use async_trait::async_trait;
use log::{debug, warn};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::io;

use super::ProcessOracle;
use crate::api::models::Liveness;

/// Probes processes on the local host.
///
/// Liveness uses the null signal: `ESRCH` means the process is gone, `EPERM`
/// means it exists but belongs to someone else. The two are kept apart so a
/// protected live process is never taken for an orphan.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcesses;

impl SystemProcesses {
    /// Creates a process oracle for the local host.
    pub fn new() -> Self {
        Self
    }
}

/// Converts to a nix PID, refusing values that `kill(2)` would treat as groups.
fn to_pid(pid: u32) -> Option<Pid> {
    i32::try_from(pid).ok().filter(|p| *p > 0).map(Pid::from_raw)
}

#[async_trait]
impl ProcessOracle for SystemProcesses {
    async fn liveness(&self, pid: u32) -> Liveness {
        let Some(target) = to_pid(pid) else {
            return Liveness::NotRunning;
        };

        match kill(target, None) {
            Ok(()) => Liveness::Running,
            Err(Errno::ESRCH) => Liveness::NotRunning,
            Err(Errno::EPERM) => {
                debug!("Process {pid} exists but is not ours to signal");
                Liveness::Inaccessible
            }
            Err(e) => {
                warn!("Unexpected error probing process {pid}: {e}");
                Liveness::Inaccessible
            }
        }
    }

    async fn terminate(&self, pid: u32) -> io::Result<()> {
        let target = to_pid(pid).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("invalid PID {pid}"))
        })?;

        kill(target, Signal::SIGTERM).map_err(io::Error::from)
    }
}
