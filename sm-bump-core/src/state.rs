use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::contract::StateStore;
use crate::error::SyncError;

/// Changeset record kept as a single-line plain-text file (e.g. `etc/COMMIT`).
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for FileStateStore {
    fn read(&self) -> Result<Option<String>, SyncError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => {
                let changeset = content.trim();
                debug!(path = %self.path.display(), changeset, "Read persisted changeset");
                Ok((!changeset.is_empty()).then(|| changeset.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::io(&self.path, e)),
        }
    }

    /// Replaces the record atomically: the new content is written to a temporary
    /// file next to the target and renamed over it.
    fn write(&self, changeset: &str) -> Result<(), SyncError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| SyncError::io(&dir, e))?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| SyncError::io(&dir, e))?;
        tmp.write_all(changeset.as_bytes())
            .map_err(|e| SyncError::io(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| SyncError::io(&self.path, e.error))?;
        info!(path = %self.path.display(), changeset, "Persisted changeset");
        Ok(())
    }

    fn tracked_path(&self) -> PathBuf {
        self.path.clone()
    }
}

/// In-memory record for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    path: PathBuf,
    changeset: Mutex<Option<String>>,
}

impl MemoryStateStore {
    pub fn new(path: impl Into<PathBuf>, initial: Option<&str>) -> Self {
        Self {
            path: path.into(),
            changeset: Mutex::new(initial.map(str::to_string)),
        }
    }

    pub fn current(&self) -> Option<String> {
        self.changeset
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl StateStore for MemoryStateStore {
    fn read(&self) -> Result<Option<String>, SyncError> {
        Ok(self.current())
    }

    fn write(&self, changeset: &str) -> Result<(), SyncError> {
        *self
            .changeset
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(changeset.to_string());
        Ok(())
    }

    fn tracked_path(&self) -> PathBuf {
        self.path.clone()
    }
}

/// Persisted changeset, or [`SyncError::MissingState`] when nothing is recorded.
pub fn require_changeset(state: &dyn StateStore) -> Result<String, SyncError> {
    state.read()?.ok_or_else(|| SyncError::MissingState {
        path: state.tracked_path(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_store_round_trips_a_single_line() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("etc").join("COMMIT"));
        assert_eq!(store.read().unwrap(), None);

        store.write("abc123").unwrap();
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "abc123");

        store.write("def456").unwrap();
        assert_eq!(store.read().unwrap().as_deref(), Some("def456"));
    }

    #[test]
    fn file_store_trims_trailing_newline() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("COMMIT");
        fs::write(&path, "abc123\n").unwrap();
        assert_eq!(FileStateStore::new(&path).read().unwrap().as_deref(), Some("abc123"));
    }

    #[test]
    fn require_changeset_reports_missing_record() {
        let store = MemoryStateStore::new("etc/COMMIT", None);
        let err = require_changeset(&store).unwrap_err();
        assert!(matches!(err, SyncError::MissingState { ref path } if path == Path::new("etc/COMMIT")));
    }
}
