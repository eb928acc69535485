//! Defaults and fixed timings for lock acquisition.

/// Default values for [`LockConfig`](crate::LockConfig).
pub mod defaults {
    use std::time::Duration;

    /// Lock file name used when none is configured.
    pub const LOCK_FILE_NAME: &str = "app.lock";

    /// Extra write attempts allowed after the first.
    pub const MAX_RETRIES: u32 = 3;

    /// Answer applied when the displacement prompt goes unanswered.
    pub const DEFAULT_ANSWER: &str = "yes";

    /// Time to wait for an interactive answer (5 seconds).
    const KILL_TIMEOUT_MS: u64 = 5_000;

    /// Time to wait for a displaced process to exit (10 seconds).
    const WAIT_FOR_EXIT_TIMEOUT_MS: u64 = 10_000;

    /// Liveness polling period while waiting (500 ms).
    const CHECK_INTERVAL_MS: u64 = 500;

    /// Returns the prompt timeout.
    pub fn kill_timeout() -> Duration {
        Duration::from_millis(KILL_TIMEOUT_MS)
    }

    /// Returns the exit wait timeout.
    pub fn wait_for_exit_timeout() -> Duration {
        Duration::from_millis(WAIT_FOR_EXIT_TIMEOUT_MS)
    }

    /// Returns the polling interval.
    pub fn check_interval() -> Duration {
        Duration::from_millis(CHECK_INTERVAL_MS)
    }
}

/// Fixed timings that are not user configurable.
pub mod timeouts {
    use std::time::Duration;

    /// Fixed pause between failed lock-file writes.
    const RETRY_BACKOFF_MS: u64 = 100;

    /// Returns the delay between write attempts.
    pub fn retry_backoff() -> Duration {
        Duration::from_millis(RETRY_BACKOFF_MS)
    }
}

/// Process exit statuses.
pub mod exit_code {
    /// Normal termination, including declining to displace another instance.
    pub const SUCCESS: i32 = 0;
    /// Any fatal lock condition.
    pub const FAILURE: i32 = 1;
}

/// Answer that confirms displacement, compared case-insensitively.
pub const AFFIRMATIVE: &str = "yes";
