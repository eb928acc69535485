//! Collaborators the coordinator talks to.
//!
//! Each external effect (the lock file, process probing and signalling, the
//! interactive prompt, signal delivery and process exit) sits behind a trait
//! so the acquisition protocol can be driven by in-memory fakes. The
//! production implementations live in the submodules:
//!
//! - [`FsLockStore`] - lock record on the local filesystem
//! - [`SystemProcesses`] - `kill(2)` based probing and SIGTERM delivery
//! - [`StdioPrompter`] - question on stdout, answer from stdin
//! - [`OsHost`] - SIGINT/SIGTERM listeners and `std::process::exit`

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::io;
use std::path::Path;

use crate::api::models::{Liveness, ShutdownSignal};

pub mod host;
pub mod process;
pub mod prompt;
pub mod store;

pub use host::OsHost;
pub use process::SystemProcesses;
pub use prompt::StdioPrompter;
pub use store::FsLockStore;

/// Storage for the lock record.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Reads the record. `Ok(None)` means the file does not exist.
    async fn read(&self, path: &Path) -> io::Result<Option<String>>;

    /// Overwrites the record, creating it if needed.
    async fn write(&self, path: &Path, contents: &str) -> io::Result<()>;

    /// Creates the record only if it does not exist yet.
    ///
    /// Must fail with [`io::ErrorKind::AlreadyExists`] when it does.
    async fn create_new(&self, path: &Path, contents: &str) -> io::Result<()>;

    /// Deletes the record.
    async fn remove(&self, path: &Path) -> io::Result<()>;

    /// Atomically moves the record from `from` to `to`.
    ///
    /// Must fail with [`io::ErrorKind::NotFound`] when `from` does not exist.
    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
}

/// Answers "is this PID alive?" and delivers termination requests.
#[async_trait]
pub trait ProcessOracle: Send + Sync {
    /// Probes a process without affecting it.
    async fn liveness(&self, pid: u32) -> Liveness;

    /// Sends a graceful termination request (SIGTERM).
    async fn terminate(&self, pid: u32) -> io::Result<()>;
}

/// Line-based interactive question.
#[async_trait]
pub trait Prompter: Send + Sync {
    /// Asks `question` and returns the answer line.
    ///
    /// `Ok(None)` means no answer can arrive (input closed). Callers race
    /// this against a timer, so implementations must tolerate being dropped
    /// mid-read.
    async fn ask(&self, question: &str) -> io::Result<Option<String>>;
}

/// Process-wide facilities: termination signals and exit.
pub trait RuntimeHost: Send + Sync {
    /// Installs interrupt/terminate listeners.
    ///
    /// Listeners are active once this returns; the future resolves on the
    /// first signal received.
    fn listen(&self) -> io::Result<BoxFuture<'static, ShutdownSignal>>;

    /// Ends the current process with `code`.
    ///
    /// The production host never returns; test hosts record the request.
    fn request_exit(&self, code: i32);
}
