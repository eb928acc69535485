//! In-memory collaborators for driving the lock protocol in tests.
//!
//! Every fake is a cheap handle around shared state so a test can keep a
//! clone for assertions after handing another clone to the coordinator.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use futures_timer::Delay;
use sololock::{
    Liveness, LockConfig, LockCoordinator, LockStore, ProcessOracle, Prompter, RuntimeHost,
    ShutdownSignal,
};
use std::collections::HashMap;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

pub const OTHER_PID: u32 = 4242;
pub const SELF_PID: u32 = 1001;

/// Lock files held in memory, keyed by path.
///
/// `contents` and friends refer to the record at [`fast_config`]'s lock path.
#[derive(Clone)]
pub struct MemoryStore(Arc<Mutex<StoreState>>);

#[derive(Default)]
struct StoreState {
    primary: PathBuf,
    files: HashMap<PathBuf, String>,
    read_error: Option<ErrorKind>,
    write_failures: u32,
    write_delay: Duration,
    writes: u32,
    create_error: Option<ErrorKind>,
    removes: u32,
    removed_paths: Vec<PathBuf>,
    swap_before_rename: Option<String>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self(Arc::new(Mutex::new(StoreState {
            primary: fast_config().lock_path(),
            ..StoreState::default()
        })))
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(contents: &str) -> Self {
        let store = Self::new();
        store.set_contents(contents);
        store
    }

    pub fn set_contents(&self, contents: &str) {
        let mut state = self.0.lock().unwrap();
        let primary = state.primary.clone();
        state.files.insert(primary, contents.to_string());
    }

    pub fn contents(&self) -> Option<String> {
        let state = self.0.lock().unwrap();
        state.files.get(&state.primary).cloned()
    }

    /// Every path currently holding a record.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.0.lock().unwrap().files.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Makes every read fail with `kind`.
    pub fn fail_reads(&self, kind: ErrorKind) {
        self.0.lock().unwrap().read_error = Some(kind);
    }

    /// Makes the next `count` overwrites fail.
    pub fn fail_writes(&self, count: u32) {
        self.0.lock().unwrap().write_failures = count;
    }

    /// Makes every overwrite take `delay` before completing.
    pub fn slow_writes(&self, delay: Duration) {
        self.0.lock().unwrap().write_delay = delay;
    }

    /// Makes exclusive creation fail with `kind`.
    pub fn fail_creates(&self, kind: ErrorKind) {
        self.0.lock().unwrap().create_error = Some(kind);
    }

    /// Another instance replaces the record with `contents` right before the
    /// next rename, as if it had cleared the same stale record first.
    pub fn swap_before_rename(&self, contents: &str) {
        self.0.lock().unwrap().swap_before_rename = Some(contents.to_string());
    }

    /// Overwrite attempts started so far.
    pub fn writes(&self) -> u32 {
        self.0.lock().unwrap().writes
    }

    pub fn removes(&self) -> u32 {
        self.0.lock().unwrap().removes
    }

    pub fn removed_paths(&self) -> Vec<PathBuf> {
        self.0.lock().unwrap().removed_paths.clone()
    }
}

#[async_trait]
impl LockStore for MemoryStore {
    async fn read(&self, path: &Path) -> io::Result<Option<String>> {
        let state = self.0.lock().unwrap();
        if let Some(kind) = state.read_error {
            return Err(io::Error::new(kind, "injected read failure"));
        }
        Ok(state.files.get(path).cloned())
    }

    async fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        let delay = {
            let mut state = self.0.lock().unwrap();
            state.writes += 1;
            state.write_delay
        };
        if !delay.is_zero() {
            Delay::new(delay).await;
        }

        let mut state = self.0.lock().unwrap();
        if state.write_failures > 0 {
            state.write_failures -= 1;
            return Err(io::Error::other("injected write failure"));
        }
        state.files.insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    async fn create_new(&self, path: &Path, contents: &str) -> io::Result<()> {
        let mut state = self.0.lock().unwrap();
        if let Some(kind) = state.create_error {
            return Err(io::Error::new(kind, "injected create failure"));
        }
        if state.files.contains_key(path) {
            return Err(io::Error::new(ErrorKind::AlreadyExists, "lock file exists"));
        }
        state.files.insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        let mut state = self.0.lock().unwrap();
        state.removes += 1;
        state.removed_paths.push(path.to_path_buf());
        match state.files.remove(path) {
            Some(_) => Ok(()),
            None => Err(io::Error::new(ErrorKind::NotFound, "no lock file")),
        }
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut guard = self.0.lock().unwrap();
        let state = &mut *guard;
        if let Some(contents) = state.swap_before_rename.take() {
            state.files.insert(state.primary.clone(), contents);
        }
        match state.files.remove(from) {
            Some(contents) => {
                state.files.insert(to.to_path_buf(), contents);
                Ok(())
            }
            None => Err(io::Error::new(ErrorKind::NotFound, "no lock file")),
        }
    }
}

/// Process table with scripted liveness.
#[derive(Clone, Default)]
pub struct FakeProcesses(Arc<Mutex<ProcessState>>);

#[derive(Default)]
struct ProcessState {
    table: HashMap<u32, Liveness>,
    exit_after_probes: Option<u32>,
    countdown: HashMap<u32, u32>,
    terminate_error: Option<ErrorKind>,
    terminated: Vec<u32>,
    probes: u32,
}

impl FakeProcesses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn running(self, pid: u32) -> Self {
        self.0.lock().unwrap().table.insert(pid, Liveness::Running);
        self
    }

    pub fn inaccessible(self, pid: u32) -> Self {
        self.0.lock().unwrap().table.insert(pid, Liveness::Inaccessible);
        self
    }

    /// After SIGTERM, the process stays visible for `probes` more probes.
    pub fn exits_after(self, probes: u32) -> Self {
        self.0.lock().unwrap().exit_after_probes = Some(probes);
        self
    }

    pub fn failing_terminate(self, kind: ErrorKind) -> Self {
        self.0.lock().unwrap().terminate_error = Some(kind);
        self
    }

    pub fn terminated(&self) -> Vec<u32> {
        self.0.lock().unwrap().terminated.clone()
    }

    pub fn probes(&self) -> u32 {
        self.0.lock().unwrap().probes
    }
}

#[async_trait]
impl ProcessOracle for FakeProcesses {
    async fn liveness(&self, pid: u32) -> Liveness {
        let mut guard = self.0.lock().unwrap();
        let state = &mut *guard;
        state.probes += 1;

        if let Some(left) = state.countdown.get_mut(&pid) {
            if *left == 0 {
                state.table.remove(&pid);
                state.countdown.remove(&pid);
            } else {
                *left -= 1;
            }
        }

        state
            .table
            .get(&pid)
            .copied()
            .unwrap_or(Liveness::NotRunning)
    }

    async fn terminate(&self, pid: u32) -> io::Result<()> {
        let mut state = self.0.lock().unwrap();
        if let Some(kind) = state.terminate_error {
            return Err(io::Error::new(kind, "injected kill failure"));
        }
        state.terminated.push(pid);
        if let Some(probes) = state.exit_after_probes {
            state.countdown.insert(pid, probes);
        }
        Ok(())
    }
}

/// How a [`ScriptedPrompter`] responds.
#[derive(Clone, Debug)]
pub enum Reply {
    Answer(String),
    After(Duration, String),
    Never,
    Closed,
    Fail,
}

#[derive(Clone)]
pub struct ScriptedPrompter {
    reply: Reply,
    asked: Arc<Mutex<Vec<String>>>,
}

impl ScriptedPrompter {
    pub fn new(reply: Reply) -> Self {
        Self {
            reply,
            asked: Arc::default(),
        }
    }

    pub fn answering(answer: &str) -> Self {
        Self::new(Reply::Answer(answer.to_string()))
    }

    pub fn silent() -> Self {
        Self::new(Reply::Never)
    }

    pub fn questions(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    async fn ask(&self, question: &str) -> io::Result<Option<String>> {
        self.asked.lock().unwrap().push(question.to_string());
        match &self.reply {
            Reply::Answer(answer) => Ok(Some(answer.clone())),
            Reply::After(delay, answer) => {
                Delay::new(*delay).await;
                Ok(Some(answer.clone()))
            }
            Reply::Never => futures::future::pending().await,
            Reply::Closed => Ok(None),
            Reply::Fail => Err(io::Error::other("injected prompt failure")),
        }
    }
}

/// Host that records exit requests and delivers signals on demand.
#[derive(Clone)]
pub struct RecordingHost {
    signals: Arc<watch::Sender<Option<ShutdownSignal>>>,
    exits: Arc<Mutex<Vec<i32>>>,
    refuse_listen: bool,
}

impl RecordingHost {
    pub fn new() -> Self {
        let (signals, _) = watch::channel(None);
        Self {
            signals: Arc::new(signals),
            exits: Arc::default(),
            refuse_listen: false,
        }
    }

    pub fn refusing_signals() -> Self {
        Self {
            refuse_listen: true,
            ..Self::new()
        }
    }

    pub fn deliver(&self, signal: ShutdownSignal) {
        self.signals.send_replace(Some(signal));
    }

    pub fn exits(&self) -> Vec<i32> {
        self.exits.lock().unwrap().clone()
    }
}

impl RuntimeHost for RecordingHost {
    fn listen(&self) -> io::Result<BoxFuture<'static, ShutdownSignal>> {
        if self.refuse_listen {
            return Err(io::Error::new(ErrorKind::Unsupported, "no signal support"));
        }

        let mut rx = self.signals.subscribe();
        Ok(async move {
            let received = match rx.wait_for(Option::is_some).await {
                Ok(value) => *value,
                Err(_) => None,
            };
            match received {
                Some(signal) => signal,
                None => futures::future::pending().await,
            }
        }
        .boxed())
    }

    fn request_exit(&self, code: i32) {
        self.exits.lock().unwrap().push(code);
    }
}

/// Configuration with short timings suitable for tests.
pub fn fast_config() -> LockConfig {
    LockConfig::new()
        .with_lock_file_dir("/run/test")
        .with_lock_file_name("job.lock")
        .with_kill_timeout(Duration::from_millis(20))
        .with_wait_for_exit_timeout(Duration::from_millis(500))
        .with_check_interval(Duration::from_millis(5))
}

/// Bundle of fakes wired into a coordinator.
pub struct Harness {
    pub coordinator: LockCoordinator,
    pub store: MemoryStore,
    pub processes: FakeProcesses,
    pub prompter: ScriptedPrompter,
    pub host: RecordingHost,
}

impl Harness {
    pub fn new(
        config: LockConfig,
        store: MemoryStore,
        processes: FakeProcesses,
        prompter: ScriptedPrompter,
    ) -> Self {
        let host = RecordingHost::new();
        let coordinator = LockCoordinator::new(config)
            .with_pid(SELF_PID)
            .with_store(store.clone())
            .with_process_oracle(processes.clone())
            .with_prompter(prompter.clone())
            .with_host(host.clone());

        Self {
            coordinator,
            store,
            processes,
            prompter,
            host,
        }
    }
}
