//! Deadline races and waiting for a displaced process to exit.
//!
//! Every bounded wait in the crate goes through [`first_of`]: the operation
//! and a timer run side by side and whichever finishes first decides the
//! result. The loser is dropped on return, so a late completion (for example
//! an answer typed after the prompt gave up) can never be acted upon.
//!
//! Timers come from `futures-timer`, which keeps these waits independent of
//! the executor driving them.

use futures::{FutureExt, select};
use futures_timer::Delay;
use log::{debug, warn};
use std::future::Future;
use std::pin::pin;
use std::time::{Duration, Instant};

use crate::Result;
use crate::api::models::{LockError, Liveness};
use crate::sys::ProcessOracle;

/// Runs `operation` until it completes or `limit` elapses.
///
/// Returns `None` when the timer wins.
pub(crate) async fn first_of<F, T>(operation: F, limit: Duration) -> Option<T>
where
    F: Future<Output = T>,
{
    let mut operation = pin!(operation.fuse());
    let mut deadline = pin!(Delay::new(limit).fuse());

    select! {
        value = operation => Some(value),
        _ = deadline => None,
    }
}

/// Polls `pid` until it disappears or `timeout` elapses.
///
/// The remaining time is recomputed on every iteration and each probe is
/// itself bounded by it, so a slow liveness check cannot stretch the wait.
pub(crate) async fn wait_for_process_exit(
    processes: &dyn ProcessOracle,
    pid: u32,
    check_interval: Duration,
    timeout: Duration,
) -> Result<()> {
    let started = Instant::now();
    let deadline = started + timeout;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());

        match first_of(processes.liveness(pid), remaining).await {
            Some(Liveness::NotRunning) => {
                debug!("Process {pid} exited after {:?}", started.elapsed());
                return Ok(());
            }
            Some(Liveness::Inaccessible) => {
                warn!("Lost the ability to probe process {pid}; cannot confirm it exited");
                return Err(LockError::ExitUnconfirmed { pid });
            }
            Some(Liveness::Running) | None => {}
        }

        let now = Instant::now();
        if now >= deadline {
            warn!("Process {pid} still running after {timeout:?}");
            return Err(LockError::ExitTimeout {
                pid,
                waited: now - started,
            });
        }

        Delay::new(check_interval.min(deadline - now)).await;
    }
}
