pub mod lock_dir;
pub mod runner;

use anyhow::Context;
use clap::{ArgAction, Parser};
use log::info;
use sololock::{AcquireOutcome, LockConfig, LockCoordinator};
use std::path::PathBuf;
use std::time::Duration;

use crate::lock_dir::user_lock_dir;
use crate::runner::run_command;

#[derive(Parser, Debug)]
#[command(name = "sololock")]
#[command(about = "Run a command as the only instance on this host")]
#[command(disable_version_flag = true)]
#[command(version)]
struct Args {
    /// Lock file name
    #[arg(short = 'n', long = "name")]
    name: Option<String>,

    /// Directory holding the lock file [default: current directory]
    #[arg(short = 'd', long = "dir", conflicts_with = "user_dir")]
    dir: Option<PathBuf>,

    /// Keep the lock file in the per-user runtime directory
    #[arg(long = "user-dir")]
    user_dir: bool,

    /// How long to wait for an answer before using the default (ms)
    #[arg(long = "kill-timeout", value_name = "MS")]
    kill_timeout: Option<u64>,

    /// How long to wait for a displaced instance to exit (ms)
    #[arg(long = "wait-timeout", value_name = "MS")]
    wait_timeout: Option<u64>,

    /// Polling period while waiting for a displaced instance (ms)
    #[arg(long = "check-interval", value_name = "MS")]
    check_interval: Option<u64>,

    /// Extra attempts when writing the lock file fails
    #[arg(long = "max-retries", value_name = "N")]
    max_retries: Option<u32>,

    /// Answer used when nobody responds to the prompt
    #[arg(long = "default-answer", value_parser = ["yes", "no"])]
    default_answer: Option<String>,

    /// Print the state of the lock file and exit
    #[arg(long = "status")]
    status: bool,

    #[arg(short = 'V', long = "version", action = ArgAction::SetTrue)]
    version: bool,

    /// Command to run while holding the lock
    #[arg(last = true, value_name = "COMMAND")]
    command: Vec<String>,
}

impl Args {
    fn lock_config(&self) -> LockConfig {
        let mut config = LockConfig::new();

        if let Some(name) = &self.name {
            config = config.with_lock_file_name(name);
        }
        if let Some(dir) = &self.dir {
            config = config.with_lock_file_dir(dir);
        } else if self.user_dir {
            config = config.with_lock_file_dir(user_lock_dir());
        }
        if let Some(ms) = self.kill_timeout {
            config = config.with_kill_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.wait_timeout {
            config = config.with_wait_for_exit_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.check_interval {
            config = config.with_check_interval(Duration::from_millis(ms));
        }
        if let Some(retries) = self.max_retries {
            config = config.with_max_retries(retries);
        }
        if let Some(answer) = &self.default_answer {
            config = config.with_default_answer(answer);
        }

        config
    }
}

/// Parses the command line and runs; returns the process exit status.
pub async fn run() -> anyhow::Result<i32> {
    let args = Args::parse();

    if args.version {
        println!("sololock {}", env!("CARGO_PKG_VERSION"));
        return Ok(0);
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = args.lock_config();
    let wait_timeout = config.wait_for_exit_timeout;
    let coordinator = LockCoordinator::new(config);

    if args.status {
        let status = coordinator.inspect().await?;
        println!("{}: {status}", coordinator.lock_path().display());
        return Ok(0);
    }

    // Exits on its own when we yield or fail.
    if coordinator.ensure_single_instance().await? != AcquireOutcome::Acquired {
        return Ok(0);
    }

    if args.command.is_empty() {
        info!("Holding {} until signalled", coordinator.lock_path().display());
        coordinator
            .initialize_termination_handlers()?
            .await
            .context("termination handler failed")?;
        return Ok(0);
    }

    run_command(&coordinator, &args.command, wait_timeout).await
}
