//! Releasing the lock record.

use log::{info, warn};
use std::path::Path;

use crate::sys::LockStore;

/// Deletes the lock record, logging the outcome.
///
/// Never fails: a record left behind becomes an orphan that the next
/// `check_lock` recognises. Returns whether the file was deleted.
pub(crate) async fn remove_lock(store: &dyn LockStore, path: &Path) -> bool {
    match store.remove(path).await {
        Ok(()) => {
            info!("Lock released ({})", path.display());
            true
        }
        Err(e) => {
            warn!("Failed to remove lock file {}: {e}", path.display());
            false
        }
    }
}
