use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::NamedTempFile;

use crate::error::AuthError;
use crate::record::CredentialRecord;

pub type PersistObserver = Arc<dyn Fn(&AuthError) + Send + Sync>;

#[derive(Clone)]
pub struct CredentialStore {
    path: PathBuf,
    observer: Option<PersistObserver>,
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("path", &self.path)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: PersistObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the record. Missing, unreadable or malformed files all come back
    /// as `None`.
    pub fn load(&self) -> Option<CredentialRecord> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(err) => {
                tracing::debug!(path = %self.path.display(), error = %err, "unable to read OAuth credentials");
                return None;
            }
        };
        match CredentialRecord::from_slice(&data) {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::debug!(path = %self.path.display(), error = %err, "unable to parse OAuth credentials");
                None
            }
        }
    }

    /// Writes the record and reports a failure to the observer instead of the
    /// caller. Returns whether the write landed.
    pub fn save(&self, record: &CredentialRecord) -> bool {
        match self.try_save(record) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "failed to persist refreshed OAuth credentials");
                if let Some(observer) = &self.observer {
                    observer(&err);
                }
                false
            }
        }
    }

    pub fn try_save(&self, record: &CredentialRecord) -> Result<(), AuthError> {
        let data = record
            .to_vec_pretty()
            .map_err(|err| self.persist_failed(format!("failed to encode credentials: {}", err)))?;
        write_file_atomic(&self.path, &data).map_err(|message| self.persist_failed(message))
    }

    fn persist_failed(&self, message: String) -> AuthError {
        AuthError::PersistFailed {
            path: self.path.clone(),
            message,
        }
    }
}

/// Temp file in the target's own directory, so the final rename stays on one
/// filesystem. The temp file is removed when any step fails.
fn write_file_atomic(path: &Path, data: &[u8]) -> Result<(), String> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)
        .map_err(|err| format!("failed to create dir {}: {}", parent.display(), err))?;

    let mut temp_file = NamedTempFile::new_in(parent)
        .map_err(|err| format!("failed to create temp file: {}", err))?;
    temp_file
        .write_all(data)
        .and_then(|()| temp_file.as_file().sync_all())
        .map_err(|err| format!("failed to write temp file: {}", err))?;
    restrict_permissions(temp_file.as_file());

    temp_file
        .persist(path)
        .map_err(|err| format!("failed to replace {}: {}", path.display(), err.error))?;
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(file: &fs::File) {
    use std::os::unix::fs::PermissionsExt;
    let _ = file.set_permissions(fs::Permissions::from_mode(0o600));
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &fs::File) {}
