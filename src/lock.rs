//! Opt-in advisory lock around refresh-and-save.
//!
//! Without it concurrent refreshes race and the last save wins. With it,
//! processes sharing a credential file take turns, and a waiter can reuse
//! the token the previous holder just saved.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone)]
pub struct RefreshLock {
    path: PathBuf,
}

impl RefreshLock {
    pub fn for_credentials(credential_path: &Path) -> Self {
        let parent = match credential_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let key = credential_path.display().to_string();
        Self {
            path: parent.join(refresh_lock_file_name(&key)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `operation` while holding the lock. If the lock cannot be taken
    /// the operation still runs, unlocked.
    pub fn with_exclusive<T, F>(&self, operation: F) -> T
    where
        F: FnOnce() -> T,
    {
        let file = match self.acquire() {
            Ok(file) => Some(file),
            Err(err) => {
                tracing::warn!(lock = %self.path.display(), error = %err, "refresh lock unavailable, refreshing unlocked");
                None
            }
        };

        let result = operation();
        if let Some(file) = file {
            let _ = FileExt::unlock(&file);
            tracing::debug!(lock = %self.path.display(), "refresh lock released");
        }
        result
    }

    fn acquire(&self) -> std::io::Result<File> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.path)?;
        tracing::debug!(lock = %self.path.display(), "waiting for refresh lock");
        file.lock_exclusive()?;
        tracing::debug!(lock = %self.path.display(), "refresh lock acquired");
        Ok(file)
    }
}

fn refresh_lock_file_name(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    let hex = hex::encode(digest);
    format!(".refresh-{}.lock", &hex[..24])
}
