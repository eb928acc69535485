use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::types::constants::{defaults, exit_code};

/// Result of probing a process identifier for liveness.
///
/// `Inaccessible` exists so that a process we are not allowed to signal is
/// never mistaken for a dead one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// A process with this identifier exists and can be signalled.
    Running,
    /// No process with this identifier exists.
    NotRunning,
    /// A process exists (or may exist) but the probe was refused.
    Inaccessible,
}

impl Liveness {
    /// Returns `true` unless the process is known to be gone.
    pub fn may_be_alive(self) -> bool {
        !matches!(self, Self::NotRunning)
    }
}

impl Display for Liveness {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::NotRunning => write!(f, "not running"),
            Self::Inaccessible => write!(f, "inaccessible"),
        }
    }
}

/// How `check_lock` resolved the existing lock record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// No lock record exists.
    Vacant,
    /// The record points at a process that no longer exists.
    Orphaned { pid: u32 },
    /// The record already holds this process's identifier.
    Reclaimed,
    /// The previous owner was asked to terminate and has exited.
    Displaced { pid: u32 },
    /// The previous owner is alive and displacement was declined.
    Declined { pid: u32 },
}

impl CheckOutcome {
    /// Whether the caller may go on to write its own lock record.
    pub fn may_proceed(self) -> bool {
        !matches!(self, Self::Declined { .. })
    }
}

impl Display for CheckOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vacant => write!(f, "no existing lock"),
            Self::Orphaned { pid } => write!(f, "orphaned lock (pid {pid})"),
            Self::Reclaimed => write!(f, "lock already held by this process"),
            Self::Displaced { pid } => write!(f, "displaced previous owner (pid {pid})"),
            Self::Declined { pid } => write!(f, "declined to displace running owner (pid {pid})"),
        }
    }
}

/// Result of a full acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The lock record now holds this process's identifier.
    Acquired,
    /// Another instance keeps running; this one should not.
    Yielded { owner: u32 },
}

/// Read-only view of the lock file, as reported by `inspect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockStatus {
    /// No lock record exists.
    Vacant,
    /// The record names a process that may be alive.
    Held { pid: u32, liveness: Liveness },
    /// The record names a process that no longer exists.
    Orphaned { pid: u32 },
    /// The record does not contain a valid process identifier.
    Corrupt { contents: String },
}

impl Display for LockStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vacant => write!(f, "vacant"),
            Self::Held { pid, liveness } => write!(f, "held by pid {pid} ({liveness})"),
            Self::Orphaned { pid } => write!(f, "orphaned (pid {pid} is not running)"),
            Self::Corrupt { contents } => write!(f, "corrupt (contents: {contents:?})"),
        }
    }
}

/// Termination request delivered to the current process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT (Ctrl-C).
    Interrupt,
    /// SIGTERM.
    Terminate,
}

impl Display for ShutdownSignal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Interrupt => write!(f, "SIGINT"),
            Self::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// How a supervised unit of work ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Supervised<T> {
    /// The work ran to completion.
    Completed(T),
    /// A termination signal arrived first; the work was dropped.
    Interrupted(ShutdownSignal),
}

/// Configuration for a [`LockCoordinator`](crate::LockCoordinator).
///
/// All fields have defaults; use the `with_*` methods to override them.
///
/// # Examples
///
/// ```rust
/// use sololock::LockConfig;
/// use std::time::Duration;
///
/// let config = LockConfig::new()
///     .with_lock_file_name("nightly-backup.lock")
///     .with_lock_file_dir("/var/run")
///     .with_kill_timeout(Duration::from_secs(2))
///     .with_default_answer("no");
///
/// assert_eq!(config.lock_path().to_str(), Some("/var/run/nightly-backup.lock"));
/// assert_eq!(config.max_retries, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// File name of the lock record (default `app.lock`).
    pub lock_file_name: String,
    /// Directory holding the lock record (default: current directory).
    pub lock_file_dir: PathBuf,
    /// How long to wait for an interactive answer before using `default_answer`.
    #[serde(with = "millis")]
    pub kill_timeout: Duration,
    /// Total time to wait for a displaced process to exit.
    #[serde(with = "millis")]
    pub wait_for_exit_timeout: Duration,
    /// Polling period while waiting for a displaced process.
    #[serde(with = "millis")]
    pub check_interval: Duration,
    /// Lock-file write attempts allowed beyond the first.
    pub max_retries: u32,
    /// Answer used when nobody responds to the displacement prompt.
    pub default_answer: String,
}

impl Default for LockConfig {
    /// Returns the default configuration.
    ///
    /// Defaults:
    /// - `lock_file_name`: `app.lock`
    /// - `lock_file_dir`: current working directory (`.` if it cannot be read)
    /// - `kill_timeout`: 5 s
    /// - `wait_for_exit_timeout`: 10 s
    /// - `check_interval`: 500 ms
    /// - `max_retries`: 3
    /// - `default_answer`: `yes`
    fn default() -> Self {
        Self {
            lock_file_name: defaults::LOCK_FILE_NAME.to_string(),
            lock_file_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            kill_timeout: defaults::kill_timeout(),
            wait_for_exit_timeout: defaults::wait_for_exit_timeout(),
            check_interval: defaults::check_interval(),
            max_retries: defaults::MAX_RETRIES,
            default_answer: defaults::DEFAULT_ANSWER.to_string(),
        }
    }
}

impl LockConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the lock file name.
    #[must_use]
    pub fn with_lock_file_name(mut self, name: impl Into<String>) -> Self {
        self.lock_file_name = name.into();
        self
    }

    /// Sets the directory holding the lock file.
    #[must_use]
    pub fn with_lock_file_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lock_file_dir = dir.into();
        self
    }

    /// Sets how long the displacement prompt waits for an answer.
    #[must_use]
    pub fn with_kill_timeout(mut self, timeout: Duration) -> Self {
        self.kill_timeout = timeout;
        self
    }

    /// Sets how long to wait for a displaced process to exit.
    #[must_use]
    pub fn with_wait_for_exit_timeout(mut self, timeout: Duration) -> Self {
        self.wait_for_exit_timeout = timeout;
        self
    }

    /// Sets the liveness polling period.
    #[must_use]
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Sets how many extra write attempts `create_lock` may make.
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the answer applied when the prompt times out.
    #[must_use]
    pub fn with_default_answer(mut self, answer: impl Into<String>) -> Self {
        self.default_answer = answer.into();
        self
    }

    /// Full path of the lock record.
    pub fn lock_path(&self) -> PathBuf {
        self.lock_file_dir.join(&self.lock_file_name)
    }
}

/// Durations in config files are plain millisecond counts.
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let ms = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(ms)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Errors that can occur while acquiring or holding the lock.
///
/// Every variant is fatal to the acquisition: the process-level helpers log
/// it and exit with [`exit_code`](LockError::exit_code). Failures while
/// releasing the lock are logged and never surface as a `LockError`.
///
/// # Examples
///
/// ```no_run
/// use sololock::{LockConfig, LockCoordinator, LockError};
///
/// # async fn example() -> sololock::Result<()> {
/// let coordinator = LockCoordinator::new(LockConfig::default());
///
/// match coordinator.check_lock().await {
///     Ok(outcome) => println!("{outcome}"),
///     Err(LockError::InvalidPid { contents }) => {
///         eprintln!("lock file is corrupt: {contents:?}");
///     }
///     Err(e) => return Err(e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Error)]
pub enum LockError {
    /// The lock file exists but could not be read.
    #[error("failed to read lock file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The lock file does not contain a positive process identifier.
    #[error("invalid PID in lock file: {contents:?}")]
    InvalidPid { contents: String },

    /// The termination request to the previous owner could not be sent.
    #[error("failed to send SIGTERM to process {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: io::Error,
    },

    /// The previous owner did not exit in time.
    #[error("timed out after {waited:?} waiting for process {pid} to exit")]
    ExitTimeout { pid: u32, waited: Duration },

    /// Liveness of the previous owner could no longer be determined.
    #[error("cannot confirm that process {pid} exited: liveness check was refused")]
    ExitUnconfirmed { pid: u32 },

    /// Every permitted write attempt failed.
    #[error("maximum retries reached after {attempts} attempts writing lock file: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: io::Error,
    },

    /// The acquisition deadline passed before the lock file was written.
    #[error("timed out after {elapsed:?} acquiring lock file")]
    AcquireTimeout { elapsed: Duration },

    /// Exclusive creation kept finding a lock record after it was cleared.
    #[error("lock file {path} is contended: {rounds} acquisition rounds lost")]
    Contended { path: PathBuf, rounds: u32 },

    /// Termination signal handlers could not be installed.
    #[error("failed to install termination handlers: {0}")]
    Handlers(#[source] io::Error),
}

impl LockError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        exit_code::FAILURE
    }
}
