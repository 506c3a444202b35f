//! Process-wide digest ledger for cached files
//!
//! Reads and records touch memory only, and a single writer persists the
//! ledger when it is dirty. Build caches flush after every store and the
//! sweep flushes after deleting builds.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::CacheResult;

/// Hex SHA-256 of `data`
pub(crate) fn digest(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Map of absolute cache path to content digest
#[derive(Debug)]
pub struct IntegrityManifest {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
    dirty: AtomicBool,
    writer: Mutex<()>,
}

impl IntegrityManifest {
    /// Load the ledger at `path`
    ///
    /// A missing or unreadable ledger starts empty, which invalidates every
    /// file already in the cache.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|s| serde_json::from_str(&s).map_err(|e| e.to_string()))
        {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unable to load cache integrity, entire cache will be invalidated");
                HashMap::new()
            }
        };

        Self {
            path,
            entries: RwLock::new(entries),
            dirty: AtomicBool::new(false),
            writer: Mutex::new(()),
        }
    }

    /// Whether `data` matches the digest recorded for `file`
    pub fn verify(&self, file: &Path, data: &[u8]) -> bool {
        let key = file.to_string_lossy();
        let entries = self.entries.read();
        let Some(expected) = entries.get(&*key) else {
            debug!(path = %key, "cannot verify integrity of file, rejecting cache");
            return false;
        };

        let actual = digest(data);
        if *expected != actual {
            warn!(path = %key, %expected, %actual, "bad integrity for cached file, rejecting cache");
            return false;
        }
        true
    }

    /// Record the digest of `data` for `file`
    pub fn record(&self, file: &Path, data: &[u8]) {
        let key = file.to_string_lossy().into_owned();
        self.entries.write().insert(key, digest(data));
        self.dirty.store(true, Ordering::Release);
    }

    /// Drop every entry under `dir`
    pub fn forget_dir(&self, dir: &Path) {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|path, _| !Path::new(path).starts_with(dir));
        if entries.len() != before {
            self.dirty.store(true, Ordering::Release);
        }
    }

    /// Number of recorded files
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing is recorded
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Whether there are changes not yet written
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Persist the ledger if it changed, returning whether a write happened
    pub fn flush(&self) -> CacheResult<bool> {
        let _writer = self.writer.lock();
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(false);
        }

        let result = serde_json::to_vec(&*self.entries.read())
            .map_err(Into::into)
            .and_then(|json| {
                if let Some(parent) = self.path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&self.path, json).map_err(Into::into)
            });

        if result.is_err() {
            self.dirty.store(true, Ordering::Release);
        }
        result.map(|()| true)
    }
}
