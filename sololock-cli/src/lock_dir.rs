use std::path::PathBuf;

/// Per-user directory for lock files.
///
/// Prefers `$XDG_RUNTIME_DIR` (cleared on logout, so stale records don't
/// survive a reboot), then the local data directory, then the temp directory.
pub fn user_lock_dir() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(std::env::temp_dir)
}
