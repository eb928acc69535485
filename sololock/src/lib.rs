//! A Rust library that keeps a single instance of an application running.
//!
//! `sololock` guards long-running or periodically started processes (daemons,
//! cron jobs, batch tools) against overlapping runs with a PID lock file:
//!
//! - Claiming the lock file atomically with an exclusive create
//! - Recognising orphaned lock files left by processes that died
//! - Displacing a running owner: confirm, send SIGTERM, wait for it to exit
//! - Releasing the lock file on SIGINT, SIGTERM, or normal completion
//!
//! # Example
//!
//! ```no_run
//! use sololock::{LockConfig, LockCoordinator, Supervised};
//! use std::time::Duration;
//!
//! # async fn example() -> sololock::Result<()> {
//! let config = LockConfig::new()
//!     .with_lock_file_name("hourly-export.lock")
//!     .with_lock_file_dir("/var/tmp")
//!     .with_default_answer("no");
//!
//! let coordinator = LockCoordinator::new(config);
//! coordinator.ensure_single_instance().await?;
//!
//! let outcome = coordinator
//!     .supervise(async {
//!         tokio::time::sleep(Duration::from_secs(60)).await;
//!     })
//!     .await?;
//!
//! if let Supervised::Interrupted(signal) = outcome {
//!     println!("stopped early by {signal}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! All fallible operations return `Result<T, LockError>`. Every error is fatal
//! to the acquisition and maps to exit status 1 through
//! [`LockError::exit_code`]. Releasing the lock never fails; problems are
//! logged and leave an orphan for the next run to detect.
//!
//! # Non-goals
//!
//! The lock is host-local and PID based. It does not use `flock(2)` or other
//! advisory locks and does not coordinate across machines.
//!
//! # Logging
//!
//! This crate uses the [`log`](https://docs.rs/log) facade for logging. To see
//! log output, add a logging implementation like `env_logger`. For example:

//! ```no_run,ignore
//! env_logger::init();
//! // ...
//! ```

// Internal implementation modules
mod core;
mod types;
mod util;

// Public API modules
pub mod api;
pub mod sys;

// Re-exported public API
pub use api::lock_coordinator::LockCoordinator;
pub use api::models::{
    AcquireOutcome, CheckOutcome, Liveness, LockConfig, LockError, LockStatus, ShutdownSignal,
    Supervised,
};
pub use sys::{
    FsLockStore, LockStore, OsHost, ProcessOracle, Prompter, RuntimeHost, StdioPrompter,
    SystemProcesses,
};

/// A specialized `Result` type for lock operations.
pub type Result<T> = std::result::Result<T, LockError>;
