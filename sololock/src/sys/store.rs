//! Lock record on the local filesystem.

use async_trait::async_trait;
use log::{debug, warn};
use std::io::{self, ErrorKind};
use std::path::Path;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::LockStore;

/// Stores the lock record as a plain text file.
///
/// Writes are flushed to disk before returning so a record that was reported
/// as written survives a crash of the writer.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLockStore;

impl FsLockStore {
    /// Creates a filesystem store.
    pub fn new() -> Self {
        Self
    }
}

async fn write_and_sync(file: &mut fs::File, contents: &str) -> io::Result<()> {
    file.write_all(contents.as_bytes()).await?;
    file.flush().await?;
    file.sync_all().await
}

#[async_trait]
impl LockStore for FsLockStore {
    async fn read(&self, path: &Path) -> io::Result<Option<String>> {
        match fs::read_to_string(path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .await?;
        write_and_sync(&mut file, contents).await
    }

    async fn create_new(&self, path: &Path, contents: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;

        if let Err(e) = write_and_sync(&mut file, contents).await {
            // An empty record would read back as an invalid PID.
            drop(file);
            if let Err(cleanup) = fs::remove_file(path).await {
                warn!("Failed to remove partially written lock file {}: {cleanup}", path.display());
            }
            return Err(e);
        }

        debug!("Created lock file {}", path.display());
        Ok(())
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to).await
    }
}
