//! Inspecting an existing lock record and resolving conflicts.
//!
//! A record that names a dead process is an orphan and is simply ignored; it
//! gets overwritten (or cleared) by the next acquisition. A record that names
//! a live process starts the displacement protocol: ask, signal, wait.

use log::{debug, error, info, warn};
use std::path::Path;

use crate::Result;
use crate::api::models::{CheckOutcome, LockConfig, LockError, LockStatus, Liveness};
use crate::core::state_wait::{first_of, wait_for_process_exit};
use crate::sys::{LockStore, ProcessOracle, Prompter};
use crate::util::utils::{displacement_question, is_affirmative, parse_pid};

/// Reads the lock record and decodes the owner PID.
///
/// `Ok(None)` when no record exists.
pub(crate) async fn read_owner(store: &dyn LockStore, path: &Path) -> Result<Option<u32>> {
    let contents = match store.read(path).await {
        Ok(Some(contents)) => contents,
        Ok(None) => return Ok(None),
        Err(source) => {
            return Err(LockError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    parse_pid(&contents)
        .map(Some)
        .ok_or(LockError::InvalidPid { contents })
}

/// Checks the lock record and clears the way for this process if allowed.
pub(crate) async fn check_lock(
    store: &dyn LockStore,
    processes: &dyn ProcessOracle,
    prompter: &dyn Prompter,
    path: &Path,
    self_pid: u32,
    config: &LockConfig,
) -> Result<CheckOutcome> {
    let owner = read_owner(store, path)
        .await
        .inspect_err(|e| error!("{e}"))?;
    let Some(pid) = owner else {
        debug!("No lock file at {}", path.display());
        return Ok(CheckOutcome::Vacant);
    };

    if pid == self_pid {
        info!("Lock file already names this process ({pid})");
        return Ok(CheckOutcome::Reclaimed);
    }

    let liveness = processes.liveness(pid).await;
    if !liveness.may_be_alive() {
        info!("Found orphaned lock for PID {pid}; process is not running");
        return Ok(CheckOutcome::Orphaned { pid });
    }

    if liveness == Liveness::Inaccessible {
        warn!("Process {pid} exists but cannot be probed; treating it as running");
    }

    displace(processes, prompter, pid, config).await
}

/// Asks whether to terminate `pid`, then signals it and waits for it to exit.
async fn displace(
    processes: &dyn ProcessOracle,
    prompter: &dyn Prompter,
    pid: u32,
    config: &LockConfig,
) -> Result<CheckOutcome> {
    info!("Another instance is running with PID {pid}");

    if !confirm_displacement(prompter, pid, config).await {
        info!("Not terminating PID {pid}; leaving the running instance in place");
        return Ok(CheckOutcome::Declined { pid });
    }

    info!("Sending SIGTERM to PID {pid}");
    processes
        .terminate(pid)
        .await
        .map_err(|source| LockError::Signal { pid, source })
        .inspect_err(|e| error!("{e}"))?;

    wait_for_process_exit(
        processes,
        pid,
        config.check_interval,
        config.wait_for_exit_timeout,
    )
    .await
    .inspect_err(|e| error!("{e}"))?;

    info!("Previous instance (PID {pid}) has exited");
    Ok(CheckOutcome::Displaced { pid })
}

/// Runs the prompt under `kill_timeout` and interprets the answer.
///
/// No answer in time, closed input, an empty line or a prompt error all fall
/// back to `default_answer`.
async fn confirm_displacement(prompter: &dyn Prompter, pid: u32, config: &LockConfig) -> bool {
    let question = displacement_question(pid, &config.default_answer);

    let answer = match first_of(prompter.ask(&question), config.kill_timeout).await {
        Some(Ok(Some(answer))) if !answer.trim().is_empty() => answer,
        Some(Ok(_)) => {
            debug!("No answer given; using default '{}'", config.default_answer);
            config.default_answer.clone()
        }
        Some(Err(e)) => {
            warn!("Prompt failed ({e}); using default '{}'", config.default_answer);
            config.default_answer.clone()
        }
        None => {
            info!(
                "No answer within {:?}; using default '{}'",
                config.kill_timeout, config.default_answer
            );
            config.default_answer.clone()
        }
    };

    is_affirmative(&answer)
}

/// Reports the lock state without prompting, signalling, or exiting.
pub(crate) async fn inspect(
    store: &dyn LockStore,
    processes: &dyn ProcessOracle,
    path: &Path,
) -> Result<LockStatus> {
    let pid = match read_owner(store, path).await {
        Ok(Some(pid)) => pid,
        Ok(None) => return Ok(LockStatus::Vacant),
        Err(LockError::InvalidPid { contents }) => return Ok(LockStatus::Corrupt { contents }),
        Err(e) => return Err(e),
    };

    let liveness = processes.liveness(pid).await;
    if liveness.may_be_alive() {
        Ok(LockStatus::Held { pid, liveness })
    } else {
        Ok(LockStatus::Orphaned { pid })
    }
}
