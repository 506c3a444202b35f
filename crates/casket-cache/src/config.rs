//! Cache configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default number of days an unused build cache is kept
pub const DEFAULT_EXPIRY_DAYS: u64 = 7;

/// Disk cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache root directory
    pub root: PathBuf,
    /// Days since last access after which a build cache is swept; 0 disables
    pub expiry_days: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            expiry_days: DEFAULT_EXPIRY_DAYS,
        }
    }
}

impl CacheConfig {
    /// Create a configuration rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Create configuration from `CASKET_CACHE_DIR` and `CASKET_CACHE_EXPIRY_DAYS`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            root: std::env::var_os("CASKET_CACHE_DIR").map_or(defaults.root, PathBuf::from),
            expiry_days: std::env::var("CASKET_CACHE_EXPIRY_DAYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.expiry_days),
        }
    }

    /// Set the expiry in days
    #[must_use]
    pub fn with_expiry_days(mut self, days: u64) -> Self {
        self.expiry_days = days;
        self
    }

    /// Directory holding per-build caches
    pub fn builds_dir(&self) -> PathBuf {
        self.root.join("builds")
    }

    /// Path of the integrity manifest
    pub fn integrity_path(&self) -> PathBuf {
        self.root.join("cacheintegrity")
    }
}

/// `$XDG_CACHE_HOME/casket`, `~/.cache/casket`, or a temp directory
fn default_root() -> PathBuf {
    std::env::var("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".cache")))
        .unwrap_or_else(|_| std::env::temp_dir())
        .join("casket")
}
