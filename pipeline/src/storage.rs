//! Durable key/value storage for client snapshots.
//!
//! SYSTEM CONTEXT
//! ==============
//! The session store and the preference store persist one JSON record each
//! under a well-known key. Reads and writes go through [`load_json`] and
//! [`save_json`], which are best-effort: a missing or unparseable record reads
//! as `None`, and a failed write is logged and dropped.
//!
//! TRADE-OFFS
//! ==========
//! `FileStorage` writes to a temp file and renames it over the record, so a
//! failed write leaves the previous record intact instead of a truncated one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::StorageError;

pub const SESSION_STORAGE_KEY: &str = "skilltrack_session";
pub const PREFERENCES_STORAGE_KEY: &str = "skilltrack_preferences";

/// A string-valued key/value store.
pub trait SnapshotStorage: Send + Sync {
    /// Read the raw record for `key`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replace the record for `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record could not be written. The previous
    /// record must still be readable in that case.
    fn write(&self, key: &str, raw: &str) -> Result<(), StorageError>;

    /// Remove the record for `key`. Removing an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be modified.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Load a JSON value for `key`. Absence, read failure, and parse failure all
/// yield `None`.
pub fn load_json<T: DeserializeOwned>(storage: &dyn SnapshotStorage, key: &str) -> Option<T> {
    let raw = match storage.read(key) {
        Ok(raw) => raw?,
        Err(e) => {
            warn!(error = %e, key, "snapshot read failed");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, key, "discarding unparseable snapshot");
            None
        }
    }
}

/// Save a JSON value for `key`. Errors are logged and swallowed.
pub fn save_json<T: Serialize>(storage: &dyn SnapshotStorage, key: &str, value: &T) {
    let raw = match serde_json::to_string(value) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, key, "snapshot serialization failed; keeping previous record");
            return;
        }
    };
    if let Err(e) = storage.write(key, &raw) {
        warn!(error = %e, key, "snapshot write failed; keeping previous record");
    }
}

// =============================================================================
// FILE STORAGE
// =============================================================================

/// One `<key>.json` file per record inside a state directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl SnapshotStorage for FileStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(self.record_path(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, raw: &str) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.record_path(key);
        let tmp = self.dir.join(format!(".{key}.json.tmp"));

        std::fs::write(&tmp, raw)?;

        // Records hold bearer tokens: owner read/write only.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
        }

        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match std::fs::remove_file(self.record_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// =============================================================================
// MEMORY STORAGE
// =============================================================================

/// In-process storage; state is lost on exit. Useful for embedding the
/// pipeline where no durable location exists.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    records: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStorage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let records = self.records.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(records.get(key).cloned())
    }

    fn write(&self, key: &str, raw: &str) -> Result<(), StorageError> {
        let mut records = self.records.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        records.insert(key.to_owned(), raw.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut records = self.records.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        records.remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[path = "storage_test.rs"]
mod tests;
