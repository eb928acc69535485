use futures::{FutureExt, select};
use log::{debug, info};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::Result;
use crate::api::models::{
    AcquireOutcome, CheckOutcome, LockConfig, LockError, LockStatus, Supervised,
};
use crate::core::{acquire, check, release};
use crate::sys::{
    FsLockStore, LockStore, OsHost, ProcessOracle, Prompter, RuntimeHost, StdioPrompter,
    SystemProcesses,
};
use crate::types::constants::exit_code;

/// Guards a lock file so that only one instance of an application runs.
///
/// This is the main entry point of the crate. A coordinator owns the lock
/// file path, the timing configuration and the collaborators it needs to
/// read the lock record, probe and signal processes, ask the user, and react
/// to termination signals.
///
/// # Creating an Instance
///
/// ```no_run
/// use sololock::{LockConfig, LockCoordinator};
///
/// let coordinator = LockCoordinator::new(
///     LockConfig::new().with_lock_file_name("reindex.lock"),
/// );
/// ```
///
/// # Typical Use
///
/// ```no_run
/// use sololock::{LockConfig, LockCoordinator};
///
/// # async fn example() -> sololock::Result<()> {
/// let coordinator = LockCoordinator::new(LockConfig::default());
///
/// // Exits the process if another instance keeps running or on any fatal error.
/// coordinator.ensure_single_instance().await?;
///
/// // Releases the lock file on SIGINT/SIGTERM.
/// coordinator.initialize_termination_handlers()?;
///
/// // ... do the work ...
///
/// coordinator.release().await;
/// # Ok(())
/// # }
/// ```
///
/// # Collaborators
///
/// By default the coordinator uses the local filesystem, `kill(2)`, the
/// terminal, and the real process. Each can be replaced with the `with_*`
/// methods, which is how the protocol is tested without real processes.
///
/// # Sharing
///
/// `LockCoordinator` is `Clone`; clones share the "lock acquired" state, so a
/// clone moved into a signal handler sees acquisitions made by the original.
#[derive(Clone)]
pub struct LockCoordinator {
    config: LockConfig,
    lock_path: PathBuf,
    pid: u32,
    acquired: Arc<AtomicBool>,
    store: Arc<dyn LockStore>,
    processes: Arc<dyn ProcessOracle>,
    prompter: Arc<dyn Prompter>,
    host: Arc<dyn RuntimeHost>,
}

impl fmt::Debug for LockCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockCoordinator")
            .field("lock_path", &self.lock_path)
            .field("pid", &self.pid)
            .field("acquired", &self.is_acquired())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LockCoordinator {
    /// Creates a coordinator bound to the current process and the local system.
    pub fn new(config: LockConfig) -> Self {
        let lock_path = config.lock_path();
        Self {
            config,
            lock_path,
            pid: std::process::id(),
            acquired: Arc::new(AtomicBool::new(false)),
            store: Arc::new(FsLockStore::new()),
            processes: Arc::new(SystemProcesses::new()),
            prompter: Arc::new(StdioPrompter::new()),
            host: Arc::new(OsHost::new()),
        }
    }

    /// Replaces the lock record storage.
    #[must_use]
    pub fn with_store(mut self, store: impl LockStore + 'static) -> Self {
        self.store = Arc::new(store);
        self
    }

    /// Replaces the process liveness oracle.
    #[must_use]
    pub fn with_process_oracle(mut self, processes: impl ProcessOracle + 'static) -> Self {
        self.processes = Arc::new(processes);
        self
    }

    /// Replaces the displacement prompt.
    #[must_use]
    pub fn with_prompter(mut self, prompter: impl Prompter + 'static) -> Self {
        self.prompter = Arc::new(prompter);
        self
    }

    /// Replaces signal handling and process exit.
    #[must_use]
    pub fn with_host(mut self, host: impl RuntimeHost + 'static) -> Self {
        self.host = Arc::new(host);
        self
    }

    /// Overrides the PID written to the lock record (defaults to this process).
    #[must_use]
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    /// Returns the configuration this coordinator was built with.
    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Full path of the lock file.
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// PID this coordinator writes to the lock record.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Whether this coordinator currently holds the lock.
    pub fn is_acquired(&self) -> bool {
        self.acquired.load(Ordering::SeqCst)
    }

    /// Inspects the lock record and resolves any conflict.
    ///
    /// - No record, or a record naming a dead process: returns immediately.
    /// - A record naming a live process: asks whether to terminate it (falling
    ///   back to `default_answer` after `kill_timeout`), sends SIGTERM, and
    ///   waits up to `wait_for_exit_timeout` for it to exit.
    ///
    /// Returns [`CheckOutcome::Declined`] when displacement was refused; the
    /// caller should not run. Unreadable records, invalid PIDs, failed
    /// signals and exit timeouts are errors.
    pub async fn check_lock(&self) -> Result<CheckOutcome> {
        check::check_lock(
            self.store.as_ref(),
            self.processes.as_ref(),
            self.prompter.as_ref(),
            &self.lock_path,
            self.pid,
            &self.config,
        )
        .await
    }

    /// Writes this process's PID to the lock file, retrying up to `max_retries` times.
    ///
    /// This overwrites whatever is there; run [`check_lock`](Self::check_lock)
    /// first, or use [`acquire`](Self::acquire) which does both atomically.
    pub async fn create_lock(&self) -> Result<()> {
        self.create_lock_with(None, self.config.max_retries).await
    }

    /// Like [`create_lock`](Self::create_lock) with an explicit deadline and retry budget.
    ///
    /// When the deadline cuts a write short the lock file is removed. The
    /// filesystem store performs writes on a blocking thread that cannot be
    /// interrupted, so a write already in flight may still land afterwards;
    /// the record then names this process and reads as an orphan once it exits.
    pub async fn create_lock_with(&self, timeout: Option<Duration>, retries: u32) -> Result<()> {
        acquire::create_lock(
            self.store.as_ref(),
            &self.lock_path,
            self.pid,
            timeout,
            retries,
        )
        .await?;
        self.acquired.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Claims the lock with an exclusive create, resolving an existing record
    /// through [`check_lock`](Self::check_lock) when necessary.
    pub async fn acquire(&self) -> Result<AcquireOutcome> {
        let outcome = acquire::acquire(
            self.store.as_ref(),
            self.processes.as_ref(),
            self.prompter.as_ref(),
            &self.lock_path,
            self.pid,
            &self.config,
        )
        .await?;

        if outcome == AcquireOutcome::Acquired {
            self.acquired.store(true, Ordering::SeqCst);
        }
        Ok(outcome)
    }

    /// Acquires the lock or ends the process.
    ///
    /// Exits with status 0 when another instance keeps running, and with
    /// status 1 on any error (each failing step logs its own diagnostic). The outcome is
    /// still returned for hosts whose exit request returns.
    pub async fn ensure_single_instance(&self) -> Result<AcquireOutcome> {
        let result = self.acquire().await;

        match &result {
            Ok(AcquireOutcome::Acquired) => {}
            Ok(AcquireOutcome::Yielded { owner }) => {
                info!("Instance with PID {owner} keeps running; exiting");
                self.host.request_exit(exit_code::SUCCESS);
            }
            Err(e) => {
                // The failing step has already logged the diagnostic.
                debug!("Lock acquisition failed: {e}");
                self.host.request_exit(e.exit_code());
            }
        }

        result
    }

    /// Deletes the lock file unconditionally.
    ///
    /// Failures are logged, never returned. Returns whether the file was deleted.
    pub async fn remove_lock(&self) -> bool {
        let removed = release::remove_lock(self.store.as_ref(), &self.lock_path).await;
        self.acquired.store(false, Ordering::SeqCst);
        removed
    }

    /// Deletes the lock file if this coordinator holds it.
    pub async fn release(&self) -> bool {
        if self.acquired.swap(false, Ordering::SeqCst) {
            release::remove_lock(self.store.as_ref(), &self.lock_path).await
        } else {
            debug!("Lock not held; nothing to release");
            false
        }
    }

    /// Reports the lock state without prompting, signalling, or exiting.
    pub async fn inspect(&self) -> Result<LockStatus> {
        check::inspect(self.store.as_ref(), self.processes.as_ref(), &self.lock_path).await
    }

    /// Releases the lock and exits on SIGINT or SIGTERM.
    ///
    /// Listeners are installed before this returns. On the first signal the
    /// spawned task removes the lock file (if held), waits for the removal to
    /// finish, then exits with status 0.
    ///
    /// Must be called from within a tokio runtime.
    pub fn initialize_termination_handlers(&self) -> Result<JoinHandle<()>> {
        let signalled = self.host.listen().map_err(LockError::Handlers)?;
        let coordinator = self.clone();

        Ok(tokio::spawn(async move {
            let received = signalled.await;
            info!("Received {received}; shutting down");
            coordinator.release().await;
            coordinator.host.request_exit(exit_code::SUCCESS);
        }))
    }

    /// Runs `work` until it completes or a termination signal arrives.
    ///
    /// Either way the lock is released before this returns. On a signal,
    /// `work` is dropped without being polled again.
    pub async fn supervise<F, T>(&self, work: F) -> Result<Supervised<T>>
    where
        F: Future<Output = T>,
    {
        let signalled = self.host.listen().map_err(LockError::Handlers)?;

        let mut work = pin!(work.fuse());
        let mut signalled = signalled.fuse();

        let outcome = select! {
            value = work => Supervised::Completed(value),
            received = signalled => {
                info!("Received {received}; stopping supervised work");
                Supervised::Interrupted(received)
            }
        };

        self.release().await;
        Ok(outcome)
    }
}
