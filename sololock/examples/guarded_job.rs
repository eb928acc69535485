/// Example of a periodic job that must never overlap with itself.
///
/// Run it twice in separate terminals: the second run asks whether to stop
/// the first one. Press Ctrl+C to see the lock file removed on shutdown.
use sololock::{LockConfig, LockCoordinator, LockStatus, Supervised};
use std::time::Duration;

#[tokio::main]
async fn main() -> sololock::Result<()> {
    env_logger::init();

    let config = LockConfig::new()
        .with_lock_file_name("guarded_job.lock")
        .with_lock_file_dir(std::env::temp_dir())
        .with_kill_timeout(Duration::from_secs(10))
        .with_default_answer("no");

    let coordinator = LockCoordinator::new(config);

    match coordinator.inspect().await? {
        LockStatus::Vacant => println!("No other instance found"),
        status => println!("Current lock state: {status}"),
    }

    // Exits with status 0 if the other instance is kept running.
    coordinator.ensure_single_instance().await?;
    println!("Holding {}", coordinator.lock_path().display());

    let outcome = coordinator
        .supervise(async {
            for step in 1..=30 {
                println!("  working ({step}/30)");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        })
        .await?;

    match outcome {
        Supervised::Completed(()) => println!("Job finished"),
        Supervised::Interrupted(signal) => println!("Job stopped by {signal}"),
    }

    Ok(())
}
