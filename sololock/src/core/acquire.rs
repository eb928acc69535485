//! Writing the lock record.
//!
//! [`acquire`] is the primary path: it claims the record with an exclusive
//! create, so two instances starting at the same moment cannot both succeed.
//! Only when the record already exists does it fall back to `check_lock`,
//! clear the stale record, and try again. [`create_lock`] is the plain
//! overwrite with fixed-delay retries, used directly by callers that ran
//! `check_lock` themselves and as the fallback when exclusive creation is
//! not possible.

use futures_timer::Delay;
use log::{debug, error, info, warn};
use std::io::ErrorKind;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::Result;
use crate::api::models::{AcquireOutcome, CheckOutcome, LockConfig, LockError};
use crate::core::check::check_lock;
use crate::core::state_wait::first_of;
use crate::sys::{LockStore, ProcessOracle, Prompter};
use crate::types::constants::timeouts;
use crate::util::utils::{aside_path, encode_pid, parse_pid};

/// Overwrites the lock record with `self_pid`.
///
/// Makes at most `1 + retries` write attempts, pausing a fixed backoff between
/// them. With a `timeout`, each attempt is also bounded by the time left, and
/// the loop gives up once the timeout has elapsed. A write cut off by the
/// timeout may have partially landed, so the record is removed before
/// returning.
pub(crate) async fn create_lock(
    store: &dyn LockStore,
    path: &Path,
    self_pid: u32,
    timeout: Option<Duration>,
    retries: u32,
) -> Result<()> {
    let started = Instant::now();
    let contents = encode_pid(self_pid);
    let mut attempts: u32 = 0;

    loop {
        let write = store.write(path, &contents);
        let result = match timeout {
            Some(limit) => {
                let remaining = limit.saturating_sub(started.elapsed());
                match first_of(write, remaining).await {
                    Some(result) => result,
                    None => {
                        let elapsed = started.elapsed();
                        error!("Timed out after {elapsed:?} writing lock file {}", path.display());
                        discard_abandoned_write(store, path).await;
                        return Err(LockError::AcquireTimeout { elapsed });
                    }
                }
            }
            None => write.await,
        };
        attempts += 1;

        let source = match result {
            Ok(()) => {
                info!("Lock acquired at {} (PID {self_pid})", path.display());
                return Ok(());
            }
            Err(e) => e,
        };

        warn!(
            "Attempt {attempts} to write lock file {} failed: {source}",
            path.display()
        );

        if attempts > retries {
            error!("Maximum retries reached writing lock file {}", path.display());
            return Err(LockError::RetriesExhausted { attempts, source });
        }

        if let Some(limit) = timeout {
            let elapsed = started.elapsed();
            if elapsed > limit {
                error!("Timed out after {elapsed:?} writing lock file {}", path.display());
                return Err(LockError::AcquireTimeout { elapsed });
            }
        }

        Delay::new(timeouts::retry_backoff()).await;
    }
}

/// Removes whatever a timed-out write left behind.
async fn discard_abandoned_write(store: &dyn LockStore, path: &Path) {
    match store.remove(path).await {
        Ok(()) => debug!("Removed lock file {} after abandoned write", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove lock file {}: {e}", path.display()),
    }
}

/// Claims the lock record, resolving an existing one through `check_lock`.
///
/// Every `check_lock` that clears the way is followed by another exclusive
/// create. Up to `1 + max_retries` such rounds are run before giving up to a
/// competitor that keeps winning the record.
pub(crate) async fn acquire(
    store: &dyn LockStore,
    processes: &dyn ProcessOracle,
    prompter: &dyn Prompter,
    path: &Path,
    self_pid: u32,
    config: &LockConfig,
) -> Result<AcquireOutcome> {
    let contents = encode_pid(self_pid);
    let rounds = config.max_retries.saturating_add(1);
    let mut round: u32 = 0;

    loop {
        match store.create_new(path, &contents).await {
            Ok(()) => {
                info!("Lock acquired at {} (PID {self_pid})", path.display());
                return Ok(AcquireOutcome::Acquired);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!("Lock file {} already exists", path.display());
            }
            Err(e) => {
                warn!(
                    "Exclusive create of {} failed ({e}); falling back to overwrite",
                    path.display()
                );
                return overwrite(store, processes, prompter, path, self_pid, config).await;
            }
        }

        if round == rounds {
            break;
        }
        round += 1;
        debug!("Resolving existing lock file (round {round} of {rounds})");

        match check_lock(store, processes, prompter, path, self_pid, config).await? {
            CheckOutcome::Declined { pid } => return Ok(AcquireOutcome::Yielded { owner: pid }),
            CheckOutcome::Reclaimed => return Ok(AcquireOutcome::Acquired),
            CheckOutcome::Vacant => {}
            CheckOutcome::Orphaned { pid } | CheckOutcome::Displaced { pid } => {
                if !clear_stale(store, path, self_pid, pid).await? {
                    create_lock(store, path, self_pid, None, config.max_retries).await?;
                    return Ok(AcquireOutcome::Acquired);
                }
            }
        }
    }

    error!("Lost {rounds} acquisition rounds for {}", path.display());
    Err(LockError::Contended {
        path: path.to_path_buf(),
        rounds,
    })
}

/// Overwrite path for stores that cannot create exclusively.
///
/// The record is still checked first, so a running owner is never replaced
/// without going through the displacement prompt.
async fn overwrite(
    store: &dyn LockStore,
    processes: &dyn ProcessOracle,
    prompter: &dyn Prompter,
    path: &Path,
    self_pid: u32,
    config: &LockConfig,
) -> Result<AcquireOutcome> {
    match check_lock(store, processes, prompter, path, self_pid, config).await? {
        CheckOutcome::Declined { pid } => Ok(AcquireOutcome::Yielded { owner: pid }),
        CheckOutcome::Reclaimed => Ok(AcquireOutcome::Acquired),
        CheckOutcome::Vacant | CheckOutcome::Orphaned { .. } | CheckOutcome::Displaced { .. } => {
            create_lock(store, path, self_pid, None, config.max_retries).await?;
            Ok(AcquireOutcome::Acquired)
        }
    }
}

/// Clears the record if it still names `stale_pid`.
///
/// The record is first renamed to a name private to `self_pid`, so of two
/// instances clearing the same stale record only one gets it. If the parked
/// record turns out to name another process (it was replaced after
/// `check_lock` read it), it is put back.
///
/// Returns `false` when the record could not be moved and the caller should
/// overwrite it instead.
async fn clear_stale(
    store: &dyn LockStore,
    path: &Path,
    self_pid: u32,
    stale_pid: u32,
) -> Result<bool> {
    let aside = aside_path(path, self_pid);

    match store.rename(path, &aside).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("Stale lock for PID {stale_pid} already removed");
            return Ok(true);
        }
        Err(e) => {
            warn!("Could not move stale lock for PID {stale_pid} aside: {e}");
            return Ok(false);
        }
    }

    let parked = match store.read(&aside).await {
        Ok(parked) => parked,
        Err(source) => {
            error!("Failed to read parked lock file {}: {source}", aside.display());
            return Err(LockError::Read {
                path: aside,
                source,
            });
        }
    };

    match parked.as_deref() {
        Some(record) if parse_pid(record) != Some(stale_pid) => {
            info!("Lock file was claimed by another instance in the meantime; restoring it");
            match store.create_new(path, record).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    warn!("Lock file {} was claimed again before it could be restored", path.display());
                }
                Err(e) => warn!("Failed to restore lock file {}: {e}", path.display()),
            }
        }
        _ => debug!("Removed stale lock for PID {stale_pid}"),
    }

    if let Err(e) = store.remove(&aside).await {
        warn!("Failed to remove parked lock file {}: {e}", aside.display());
    }
    Ok(true)
}
