//! End-to-end scenarios against a real lock file and real processes.
//!
//! Only the prompt and the runtime host are faked; the lock file lives in a
//! temporary directory and liveness/termination go through `kill(2)`.

mod common;

use common::{RecordingHost, ScriptedPrompter};
use sololock::{
    AcquireOutcome, CheckOutcome, LockConfig, LockCoordinator, LockStatus, SystemProcesses,
};
use std::process::{Child, Command};
use std::thread::JoinHandle;
use std::time::Duration;

fn config_in(dir: &tempfile::TempDir) -> LockConfig {
    LockConfig::new()
        .with_lock_file_dir(dir.path())
        .with_lock_file_name("scenario.lock")
        .with_kill_timeout(Duration::from_millis(20))
        .with_wait_for_exit_timeout(Duration::from_secs(5))
        .with_check_interval(Duration::from_millis(20))
}

fn coordinator(config: LockConfig, prompter: ScriptedPrompter) -> (LockCoordinator, RecordingHost) {
    let host = RecordingHost::new();
    let coordinator = LockCoordinator::new(config)
        .with_process_oracle(SystemProcesses::new())
        .with_prompter(prompter)
        .with_host(host.clone());
    (coordinator, host)
}

/// PID of a process that has already exited and been reaped.
fn dead_pid() -> u32 {
    let mut child = Command::new("true").spawn().unwrap();
    let pid = child.id();
    child.wait().unwrap();
    pid
}

/// Reaps `child` in the background so it disappears as soon as it exits.
fn reap(mut child: Child) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let _ = child.wait();
    })
}

#[tokio::test]
async fn test_fresh_lock_then_second_instance_yields() {
    let dir = tempfile::tempdir().unwrap();
    let (first, _) = coordinator(config_in(&dir), ScriptedPrompter::silent());

    assert_eq!(first.check_lock().await.unwrap(), CheckOutcome::Vacant);
    first.create_lock().await.unwrap();

    let path = first.lock_path().to_path_buf();
    let expected = std::process::id().to_string();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), expected);

    // A second instance sees this (live) test process as the owner.
    let (second, second_host) = coordinator(
        config_in(&dir).with_default_answer("no"),
        ScriptedPrompter::silent(),
    );
    let second = second.with_pid(dead_pid());
    let modified = std::fs::metadata(&path).unwrap().modified().unwrap();

    let outcome = second.ensure_single_instance().await.unwrap();

    assert!(matches!(outcome, AcquireOutcome::Yielded { .. }));
    assert_eq!(second_host.exits(), vec![0]);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), expected);
    assert_eq!(std::fs::metadata(&path).unwrap().modified().unwrap(), modified);

    assert!(first.remove_lock().await);
    assert!(!path.exists());
}

#[tokio::test]
async fn test_orphaned_lock_is_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let (coordinator, _) = coordinator(config_in(&dir), ScriptedPrompter::silent());
    let stale = dead_pid();
    std::fs::write(coordinator.lock_path(), stale.to_string()).unwrap();

    assert_eq!(
        coordinator.inspect().await.unwrap(),
        LockStatus::Orphaned { pid: stale }
    );
    assert_eq!(
        coordinator.check_lock().await.unwrap(),
        CheckOutcome::Orphaned { pid: stale }
    );

    coordinator.create_lock().await.unwrap();

    let contents = std::fs::read_to_string(coordinator.lock_path()).unwrap();
    assert_eq!(contents, std::process::id().to_string());
}

#[tokio::test]
async fn test_running_owner_is_displaced() {
    let dir = tempfile::tempdir().unwrap();
    let (coordinator, _) = coordinator(config_in(&dir), ScriptedPrompter::silent());

    let child = Command::new("sleep").arg("30").spawn().unwrap();
    let owner = child.id();
    let reaper = reap(child);
    std::fs::write(coordinator.lock_path(), format!("{owner}\n")).unwrap();

    let outcome = coordinator.check_lock().await.unwrap();

    assert_eq!(outcome, CheckOutcome::Displaced { pid: owner });
    reaper.join().unwrap();
}

#[tokio::test]
async fn test_acquire_replaces_displaced_owner_record() {
    let dir = tempfile::tempdir().unwrap();
    let (coordinator, _) = coordinator(config_in(&dir), ScriptedPrompter::answering("yes"));

    let child = Command::new("sleep").arg("30").spawn().unwrap();
    let owner = child.id();
    let reaper = reap(child);
    std::fs::write(coordinator.lock_path(), owner.to_string()).unwrap();

    let outcome = coordinator.acquire().await.unwrap();

    assert_eq!(outcome, AcquireOutcome::Acquired);
    assert!(coordinator.is_acquired());
    let contents = std::fs::read_to_string(coordinator.lock_path()).unwrap();
    assert_eq!(contents, std::process::id().to_string());
    reaper.join().unwrap();

    assert!(coordinator.release().await);
    assert!(!coordinator.lock_path().exists());
}

#[tokio::test]
async fn test_acquire_is_exclusive_between_coordinators() {
    let dir = tempfile::tempdir().unwrap();
    let (first, _) = coordinator(config_in(&dir), ScriptedPrompter::silent());
    let (second, _) = coordinator(
        config_in(&dir).with_default_answer("no"),
        ScriptedPrompter::silent(),
    );
    let second = second.with_pid(dead_pid());

    assert_eq!(first.acquire().await.unwrap(), AcquireOutcome::Acquired);
    assert!(matches!(
        second.acquire().await.unwrap(),
        AcquireOutcome::Yielded { .. }
    ));
    assert!(!second.is_acquired());
}

#[tokio::test]
async fn test_unwritable_directory_exhausts_retries() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir)
        .with_lock_file_dir(dir.path().join("missing"))
        .with_max_retries(1);
    let (coordinator, host) = coordinator(config, ScriptedPrompter::silent());

    let err = coordinator.create_lock().await.unwrap_err();
    assert!(err.to_string().contains("maximum retries reached"));

    let err = coordinator.ensure_single_instance().await.unwrap_err();
    assert_eq!(err.exit_code(), 1);
    assert_eq!(host.exits(), vec![1]);
}

#[tokio::test]
async fn test_acquire_without_retries_replaces_orphan() {
    let dir = tempfile::tempdir().unwrap();
    let (coordinator, _) = coordinator(
        config_in(&dir).with_max_retries(0),
        ScriptedPrompter::silent(),
    );
    std::fs::write(coordinator.lock_path(), dead_pid().to_string()).unwrap();

    assert_eq!(coordinator.acquire().await.unwrap(), AcquireOutcome::Acquired);

    let contents = std::fs::read_to_string(coordinator.lock_path()).unwrap();
    assert_eq!(contents, std::process::id().to_string());
    // The parked stale record is gone; only the lock file remains.
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}
