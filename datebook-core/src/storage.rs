//! Durable key/value storage for tokens, settings and caches.
//!
//! Values are plain strings, the same way a browser's local storage holds
//! them. Structured values (settings, weather cache) are JSON text.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use fs2::FileExt;

use crate::error::{DatebookError, DatebookResult};

/// A string key/value store that survives restarts.
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> DatebookResult<Option<String>>;

    /// Write several entries at once. Either all are persisted or none are.
    fn set_many(&self, entries: &[(&str, &str)]) -> DatebookResult<()>;

    /// Remove several entries at once. Missing keys are ignored.
    fn remove_many(&self, keys: &[&str]) -> DatebookResult<()>;

    fn set(&self, key: &str, value: &str) -> DatebookResult<()> {
        self.set_many(&[(key, value)])
    }

    fn remove(&self, key: &str) -> DatebookResult<()> {
        self.remove_many(&[key])
    }
}

fn lock<T>(mutex: &Mutex<T>) -> DatebookResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| DatebookError::Storage("storage lock poisoned".into()))
}

/// Storage backed by a single JSON file shared by every process using the
/// same data directory.
///
/// Nothing is cached: reads go to the file under a shared lock, and writes
/// re-read, change and replace it under an exclusive one, so concurrent
/// processes never overwrite each other's entries.
pub struct FileStorage {
    path: PathBuf,
    lock_path: PathBuf,
}

/// Holds a lock on the sidecar lock file until dropped.
struct FileLock {
    _file: File,
}

impl FileStorage {
    /// Open the store at `path`, creating nothing until the first write.
    pub fn open(path: impl Into<PathBuf>) -> DatebookResult<Self> {
        let path = path.into();
        let lock_path = path.with_extension("json.lock");
        Ok(FileStorage { path, lock_path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // The data file is replaced by rename on every write, so the lock lives
    // on a separate file that is never replaced.
    fn lock_file(&self) -> DatebookResult<File> {
        if let Some(parent) = self.lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)?)
    }

    fn lock_shared(&self) -> DatebookResult<FileLock> {
        let file = self.lock_file()?;
        FileExt::lock_shared(&file)
            .map_err(|e| DatebookError::Storage(format!("failed to lock storage: {e}")))?;
        Ok(FileLock { _file: file })
    }

    fn lock_exclusive(&self) -> DatebookResult<FileLock> {
        let file = self.lock_file()?;
        FileExt::lock_exclusive(&file)
            .map_err(|e| DatebookError::Storage(format!("failed to lock storage: {e}")))?;
        Ok(FileLock { _file: file })
    }

    /// Current entries on disk. A file that can't be parsed is treated as
    /// empty so a corrupted store doesn't lock the user out; the next write
    /// replaces it.
    fn read(&self) -> DatebookResult<BTreeMap<String, String>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&contents) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "discarding unreadable storage file");
                Ok(BTreeMap::new())
            }
        }
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> DatebookResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(entries)?;

        // Write to a sibling file and rename so a crash never leaves half a pair
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)?;

        // Owner-only (0600) since the file holds credentials:
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
        }

        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Apply `change` to the entries on disk while holding the exclusive
    /// lock. Nothing is written when `change` returns false.
    fn update(&self, change: impl FnOnce(&mut BTreeMap<String, String>) -> bool) -> DatebookResult<()> {
        let _lock = self.lock_exclusive()?;
        let mut entries = self.read()?;
        if change(&mut entries) {
            self.persist(&entries)?;
        }
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> DatebookResult<Option<String>> {
        let _lock = self.lock_shared()?;
        Ok(self.read()?.remove(key))
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> DatebookResult<()> {
        self.update(|current| {
            for (key, value) in entries {
                current.insert((*key).to_string(), (*value).to_string());
            }
            true
        })
    }

    fn remove_many(&self, keys: &[&str]) -> DatebookResult<()> {
        self.update(|current| {
            let mut changed = false;
            for key in keys {
                changed |= current.remove(*key).is_some();
            }
            changed
        })
    }
}

/// In-process storage, lost on exit. Used by tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> DatebookResult<Option<String>> {
        Ok(lock(&self.entries)?.get(key).cloned())
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> DatebookResult<()> {
        let mut current = lock(&self.entries)?;
        for (key, value) in entries {
            current.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> DatebookResult<()> {
        let mut current = lock(&self.entries)?;
        for key in keys {
            current.remove(*key);
        }
        Ok(())
    }
}
