//! Key lookup seam consumed by the block decoder
//!
//! The decoder only ever needs "name in, key out". Keeping that behind a trait
//! lets the process-wide [`Keyring`](crate::Keyring) back real sources while
//! tests and tools pass a fixed [`StaticKeys`] map.

use std::collections::HashMap;
use std::sync::Arc;

use crate::keys::{KeyName, TactKey};

/// Read-only source of decryption keys
pub trait KeyProvider: Send + Sync {
    /// Look up a key by name
    fn key(&self, name: KeyName) -> Option<[u8; 16]>;

    /// Check whether a key is available
    fn contains(&self, name: KeyName) -> bool {
        self.key(name).is_some()
    }
}

impl<T: KeyProvider + ?Sized> KeyProvider for Arc<T> {
    fn key(&self, name: KeyName) -> Option<[u8; 16]> {
        (**self).key(name)
    }
}

impl<T: KeyProvider + ?Sized> KeyProvider for &T {
    fn key(&self, name: KeyName) -> Option<[u8; 16]> {
        (**self).key(name)
    }
}

/// Fixed in-memory key set
#[derive(Debug, Clone, Default)]
pub struct StaticKeys {
    keys: HashMap<KeyName, [u8; 16]>,
}

impl StaticKeys {
    /// Create an empty key set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key, replacing any previous key of the same name
    #[must_use]
    pub fn with_key(mut self, key: TactKey) -> Self {
        self.keys.insert(key.name, key.key);
        self
    }

    /// Number of keys held
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no keys are held
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl FromIterator<TactKey> for StaticKeys {
    fn from_iter<I: IntoIterator<Item = TactKey>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().map(|k| (k.name, k.key)).collect(),
        }
    }
}

impl KeyProvider for StaticKeys {
    fn key(&self, name: KeyName) -> Option<[u8; 16]> {
        self.keys.get(&name).copied()
    }
}
