//! The process-wide exclusive advisory lock file (`spec.md` §5).
//!
//! Grounded on `alpm-db/src/db/database.rs`'s `DatabaseLock`: a lock is a file created
//! with `create_new` (so a second acquisition fails instead of silently succeeding) and
//! released by deleting it on `Drop`.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::Error;

const LOCK_FILE_NAME: &str = "entomb.lck";

/// An acquired exclusive lock over one registry directory.
///
/// No two transactions over the same installed registry may run concurrently
/// (`spec.md` §5); holding a [`RegistryLock`] is the only way to obtain a
/// [`crate::db::Registry`] handle opened for mutation.
#[derive(Debug)]
pub struct RegistryLock {
    path: PathBuf,
    _file: fs::File,
}

impl RegistryLock {
    /// Acquires the lock for the registry rooted at `state_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Locked`] if another process already holds it.
    pub fn acquire(state_dir: &Path) -> Result<Self, Error> {
        fs::create_dir_all(state_dir).map_err(|source| Error::Io {
            path: state_dir.to_path_buf(),
            source,
        })?;
        let path = state_dir.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|_| Error::Locked(path.clone()))?;
        Ok(RegistryLock { path, _file: file })
    }
}

impl Drop for RegistryLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
