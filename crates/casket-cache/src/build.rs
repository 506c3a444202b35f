//! Per-build cache directory

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CacheError, CacheResult};
use crate::integrity::IntegrityManifest;
use crate::traits::{CacheNamespace, ContentCache};

/// Name of the per-build manifest file
pub const BUILD_MANIFEST: &str = "manifest.json";

/// Per-build metadata stored in `manifest.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildManifest {
    /// Milliseconds since the Unix epoch of the last time the build was opened
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_access: Option<u64>,
    /// Fields written by other tools, preserved on save
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

/// Cache scoped to one build
///
/// Cloning is cheap; clones share the integrity ledger and byte counter.
#[derive(Debug, Clone)]
pub struct BuildCache {
    key: String,
    dir: PathBuf,
    root: PathBuf,
    integrity: Arc<IntegrityManifest>,
    stored_bytes: Arc<AtomicU64>,
    manifest: BuildManifest,
}

impl BuildCache {
    /// Open (creating if needed) the cache of build `key` and stamp its access time
    pub(crate) async fn open(
        root: &Path,
        key: &str,
        integrity: Arc<IntegrityManifest>,
        stored_bytes: Arc<AtomicU64>,
    ) -> CacheResult<Self> {
        check_key(key)?;
        let dir = root.join("builds").join(key);
        tokio::fs::create_dir_all(&dir).await?;

        let manifest_path = dir.join(BUILD_MANIFEST);
        let mut manifest = match tokio::fs::read_to_string(&manifest_path).await {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(build = %key, error = %e, "malformed build cache manifest");
                BuildManifest::default()
            }),
            Err(_) => {
                debug!(build = %key, "no cache manifest found");
                BuildManifest::default()
            }
        };

        manifest.last_access = Some(now_ms());
        let json = serde_json::to_vec(&manifest)?;
        if let Err(e) = tokio::fs::write(&manifest_path, json).await {
            warn!(build = %key, error = %e, "unable to save build cache manifest");
        }

        Ok(Self {
            key: key.to_string(),
            dir,
            root: root.to_path_buf(),
            integrity,
            stored_bytes,
            manifest,
        })
    }

    /// Build key this cache belongs to
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Per-build directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Manifest as stamped on open
    pub fn manifest(&self) -> &BuildManifest {
        &self.manifest
    }

    /// Location of `key` in `namespace`
    pub fn path_for(&self, namespace: CacheNamespace, key: &str) -> CacheResult<PathBuf> {
        check_key(key)?;
        Ok(match namespace.dir_name() {
            None => self.dir.join(key),
            Some(name) => self.root.join(name).join(key),
        })
    }

    /// Bytes stored through any cache of this store during the session
    pub fn stored_bytes(&self) -> u64 {
        self.stored_bytes.load(Ordering::Relaxed)
    }
}

fn check_key(key: &str) -> CacheResult<()> {
    let mut components = Path::new(key).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(CacheError::InvalidKey(key.to_string())),
    }
}

#[async_trait]
impl ContentCache for BuildCache {
    async fn get(&self, namespace: CacheNamespace, key: &str) -> Option<Bytes> {
        let path = self.path_for(namespace, key).ok()?;
        let data = tokio::fs::read(&path).await.ok()?;
        self.integrity
            .verify(&path, &data)
            .then(|| Bytes::from(data))
    }

    async fn put(&self, namespace: CacheNamespace, key: &str, data: Bytes) -> CacheResult<()> {
        let path = self.path_for(namespace, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&path, &data).await?;
        self.integrity.record(&path, &data);
        self.stored_bytes
            .fetch_add(data.len() as u64, Ordering::Relaxed);
        debug!(path = %path.display(), size = data.len(), "stored file in cache");

        // write-through; a failed write stays dirty for the next put or flush
        let integrity = Arc::clone(&self.integrity);
        match tokio::task::spawn_blocking(move || integrity.flush()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(error = %e, "unable to save cache integrity, will retry on next store"),
            Err(e) => warn!(error = %e, "cache integrity writer failed"),
        }
        Ok(())
    }
}
