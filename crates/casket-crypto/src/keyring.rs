//! Process-wide decryption keyring
//!
//! The keyring is created once at startup, shared by every content source and
//! mutated as keys arrive (from the on-disk cache, the remote key list, or a
//! user). Writes never hit the disk directly: mutations only raise a dirty flag
//! and a single writer persists the ring on [`Keyring::flush`]. Bursts of
//! additions therefore coalesce into one write.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::CryptoError;
use crate::keys::{KeyName, TactKey, parse_key_list};
use crate::provider::KeyProvider;

#[derive(Debug)]
struct KeyringInner {
    keys: RwLock<HashMap<KeyName, [u8; 16]>>,
    path: Option<PathBuf>,
    dirty: AtomicBool,
    writer: Mutex<()>,
}

/// Shared, persistable store of TACT keys
///
/// Cloning is cheap and every clone observes the same keys.
#[derive(Debug, Clone)]
pub struct Keyring {
    inner: Arc<KeyringInner>,
}

impl Keyring {
    fn with_path(path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(KeyringInner {
                keys: RwLock::new(HashMap::new()),
                path,
                dirty: AtomicBool::new(false),
                writer: Mutex::new(()),
            }),
        }
    }

    /// Create a keyring that is never persisted
    pub fn in_memory() -> Self {
        Self::with_path(None)
    }

    /// Open the keyring backed by a JSON file
    ///
    /// A missing file yields an empty ring. Entries that fail validation are
    /// skipped and logged; they do not fail the load.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CryptoError> {
        let path = path.as_ref();
        let keyring = Self::with_path(Some(path.to_path_buf()));

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no cached keyring found");
                return Ok(keyring);
            }
            Err(e) => return Err(e.into()),
        };

        let entries: BTreeMap<String, String> = serde_json::from_str(&content)?;
        let mut added = 0;
        {
            let mut keys = keyring.inner.keys.write();
            for (name, key) in &entries {
                match TactKey::from_hex_pair(name, key) {
                    Ok(key) => {
                        keys.insert(key.name, key.key);
                        added += 1;
                    }
                    Err(e) => warn!(%name, %key, error = %e, "skipping invalid cached tact key"),
                }
            }
        }

        info!(count = added, "loaded tact keys from local cache");
        Ok(keyring)
    }

    /// Location of the backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    /// Add a key from its textual form
    ///
    /// Returns `false` when the pair fails validation. A pair that repeats an
    /// existing entry is accepted without marking the ring dirty.
    pub fn add_key(&self, name: &str, key: &str) -> bool {
        match TactKey::from_hex_pair(name, key) {
            Ok(key) => {
                if self.insert(key) {
                    info!(name = %key.name, key = %key.key_hex(), "registered new decryption key");
                }
                true
            }
            Err(_) => false,
        }
    }

    /// Insert a parsed key, returning whether the ring changed
    pub fn insert(&self, key: TactKey) -> bool {
        let previous = self.inner.keys.write().insert(key.name, key.key);
        let changed = previous != Some(key.key);
        if changed {
            self.inner.dirty.store(true, Ordering::Release);
        }
        changed
    }

    /// Merge a `name key` per line list, returning how many keys were added
    pub fn merge_key_list(&self, content: &str) -> usize {
        let (keys, rejected) = parse_key_list(content);
        for line in &rejected {
            warn!(%line, "skipping invalid remote tact key");
        }

        keys.into_iter().filter(|key| self.insert(*key)).count()
    }

    /// Number of keys held
    pub fn len(&self) -> usize {
        self.inner.keys.read().len()
    }

    /// Whether the ring holds no keys
    pub fn is_empty(&self) -> bool {
        self.inner.keys.read().is_empty()
    }

    /// Whether there are changes not yet written
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::Acquire)
    }

    /// Write the ring to its backing file if it changed since the last flush
    ///
    /// Returns `true` when a write happened. In-memory rings never write.
    pub fn flush(&self) -> Result<bool, CryptoError> {
        let Some(path) = self.inner.path.as_deref() else {
            self.inner.dirty.store(false, Ordering::Release);
            return Ok(false);
        };

        let _writer = self.inner.writer.lock();
        if !self.inner.dirty.swap(false, Ordering::AcqRel) {
            return Ok(false);
        }

        let snapshot: BTreeMap<String, String> = self
            .inner
            .keys
            .read()
            .iter()
            .map(|(name, key)| (name.to_string(), hex::encode(key)))
            .collect();

        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        if let Err(e) = snapshot.serialize(&mut serializer) {
            self.inner.dirty.store(true, Ordering::Release);
            return Err(e.into());
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if let Err(e) = std::fs::write(path, &out) {
            self.inner.dirty.store(true, Ordering::Release);
            return Err(e.into());
        }

        debug!(path = %path.display(), count = snapshot.len(), "saved tact keys");
        Ok(true)
    }
}

impl KeyProvider for Keyring {
    fn key(&self, name: KeyName) -> Option<[u8; 16]> {
        self.inner.keys.read().get(&name).copied()
    }
}
