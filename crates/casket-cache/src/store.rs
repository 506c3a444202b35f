//! Cache root: opens build caches and sweeps stale ones

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info, warn};

use crate::build::{BUILD_MANIFEST, BuildCache, BuildManifest, now_ms};
use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::integrity::IntegrityManifest;

const DAY_MS: u64 = 24 * 60 * 60 * 1000;

/// Outcome of an expiry sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Build directories deleted
    pub removed: usize,
    /// Bytes freed, manifests excluded
    pub bytes_freed: u64,
}

/// Process-wide cache root
#[derive(Debug, Clone)]
pub struct CacheStore {
    config: CacheConfig,
    integrity: Arc<IntegrityManifest>,
    stored_bytes: Arc<AtomicU64>,
}

impl CacheStore {
    /// Create the cache root and load the integrity ledger
    pub fn open(config: CacheConfig) -> CacheResult<Self> {
        std::fs::create_dir_all(config.builds_dir())?;
        let integrity = Arc::new(IntegrityManifest::load(config.integrity_path()));
        info!(root = %config.root.display(), entries = integrity.len(), "opened cache");

        Ok(Self {
            config,
            integrity,
            stored_bytes: Arc::default(),
        })
    }

    /// Configuration in use
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Shared integrity ledger
    pub fn integrity(&self) -> &Arc<IntegrityManifest> {
        &self.integrity
    }

    /// Bytes stored during this session
    pub fn stored_bytes(&self) -> u64 {
        self.stored_bytes.load(Ordering::Relaxed)
    }

    /// Open the cache of one build
    pub async fn build(&self, build_key: &str) -> CacheResult<BuildCache> {
        BuildCache::open(
            &self.config.root,
            build_key,
            Arc::clone(&self.integrity),
            Arc::clone(&self.stored_bytes),
        )
        .await
    }

    /// Delete build caches not accessed within the configured expiry
    ///
    /// Only directories with 32 character names are considered. A missing
    /// or unreadable manifest counts as expired.
    pub fn sweep(&self) -> CacheResult<SweepReport> {
        let mut report = SweepReport::default();
        if self.config.expiry_days == 0 {
            warn!("cache clean-up skipped, expiry is 0");
            return Ok(report);
        }

        let expiry = self.config.expiry_days.saturating_mul(DAY_MS);
        let now = now_ms();

        for entry in std::fs::read_dir(self.config.builds_dir())? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !entry.file_type()?.is_dir() || name.len() != 32 {
                continue;
            }

            let dir = entry.path();
            let manifest_path = dir.join(BUILD_MANIFEST);
            let (expired, manifest_size) = match std::fs::read_to_string(&manifest_path) {
                Ok(raw) => match serde_json::from_str::<BuildManifest>(&raw) {
                    Ok(BuildManifest {
                        last_access: Some(last),
                        ..
                    }) => {
                        let age = now.saturating_sub(last);
                        if age > expiry {
                            debug!(build = %name, age_ms = age, "build cache expired");
                        }
                        (age > expiry, raw.len() as u64)
                    }
                    _ => {
                        debug!(build = %name, "unable to read lastAccess, marking for deletion");
                        (true, raw.len() as u64)
                    }
                },
                Err(_) => {
                    debug!(build = %name, "missing build manifest, marking for deletion");
                    (true, 0)
                }
            };

            if expired {
                let size = dir_size(&dir);
                std::fs::remove_dir_all(&dir)?;
                self.integrity.forget_dir(&dir);
                report.removed += 1;
                report.bytes_freed += size.saturating_sub(manifest_size);
            }
        }

        if report.removed > 0 {
            self.integrity.flush()?;
        }

        info!(
            removed = report.removed,
            bytes_freed = report.bytes_freed,
            "build cache clean-up complete"
        );
        Ok(report)
    }

    /// Run [`sweep`](Self::sweep) on the blocking pool
    pub async fn sweep_async(&self) -> CacheResult<SweepReport> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.sweep())
            .await
            .map_err(|e| CacheError::Io(std::io::Error::other(e)))?
    }
}

fn dir_size(dir: &Path) -> u64 {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(Result::ok)
        .map(|entry| match entry.file_type() {
            Ok(t) if t.is_dir() => dir_size(&entry.path()),
            Ok(_) => entry.metadata().map_or(0, |m| m.len()),
            Err(_) => 0,
        })
        .sum()
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::traits::{CacheNamespace, ContentCache};
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const FRESH: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const STALE: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
    const BROKEN: &str = "cccccccccccccccccccccccccccccccc";

    #[tokio::test]
    async fn test_sweep_removes_stale_builds() {
        let dir = TempDir::new().expect("Test operation should succeed");
        let store = CacheStore::open(CacheConfig::new(dir.path()).with_expiry_days(7))
            .expect("Store should open");

        store.build(FRESH).await.expect("Build should open");
        let stale = store.build(STALE).await.expect("Build should open");
        stale
            .put(CacheNamespace::Build, "root", Bytes::from_static(&[0u8; 100]))
            .await
            .expect("Put should succeed");
        std::fs::write(
            stale.dir().join(BUILD_MANIFEST),
            format!("{{\"lastAccess\":{}}}", now_ms() - 8 * DAY_MS),
        )
        .expect("Test operation should succeed");

        let broken = dir.path().join("builds").join(BROKEN);
        std::fs::create_dir_all(&broken).expect("Test operation should succeed");
        std::fs::write(broken.join(BUILD_MANIFEST), "{}").expect("Test operation should succeed");

        let other = dir.path().join("builds").join("short-name");
        std::fs::create_dir_all(&other).expect("Test operation should succeed");

        let report = store.sweep().expect("Sweep should succeed");
        assert_eq!(report.removed, 2);
        assert_eq!(report.bytes_freed, 100);
        assert!(dir.path().join("builds").join(FRESH).exists());
        assert!(!dir.path().join("builds").join(STALE).exists());
        assert!(other.exists());
        assert!(store.integrity().is_empty());
    }

    #[tokio::test]
    async fn test_zero_expiry_disables_sweep() {
        let dir = TempDir::new().expect("Test operation should succeed");
        let store = CacheStore::open(CacheConfig::new(dir.path()).with_expiry_days(0))
            .expect("Store should open");
        let broken = dir.path().join("builds").join(BROKEN);
        std::fs::create_dir_all(&broken).expect("Test operation should succeed");

        assert_eq!(store.sweep().expect("Sweep should succeed"), SweepReport::default());
        assert!(broken.exists());
    }

    #[tokio::test]
    async fn test_builds_share_ledger_and_counter() {
        let dir = TempDir::new().expect("Test operation should succeed");
        let store = CacheStore::open(CacheConfig::new(dir.path())).expect("Store should open");
        let a = store.build(FRESH).await.expect("Build should open");
        let b = store.build(STALE).await.expect("Build should open");

        a.put(CacheNamespace::Data, "k", Bytes::from_static(b"abc"))
            .await
            .expect("Put should succeed");
        assert_eq!(b.get(CacheNamespace::Data, "k").await.as_deref(), Some(&b"abc"[..]));
        assert_eq!(store.stored_bytes(), 3);
        assert!(!store.integrity().is_dirty());
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = TempDir::new().expect("Test operation should succeed");
        {
            let store = CacheStore::open(CacheConfig::new(dir.path())).expect("Store should open");
            let build = store.build(FRESH).await.expect("Build should open");
            build
                .put(CacheNamespace::Data, "k", Bytes::from_static(b"abc"))
                .await
                .expect("Put should succeed");
        }

        let store = CacheStore::open(CacheConfig::new(dir.path())).expect("Store should reopen");
        let build = store.build(STALE).await.expect("Build should open");
        assert_eq!(
            build.get(CacheNamespace::Data, "k").await.as_deref(),
            Some(&b"abc"[..])
        );
    }

    #[tokio::test]
    async fn test_reopen_while_first_store_alive() {
        let dir = TempDir::new().expect("Test operation should succeed");
        let first = CacheStore::open(CacheConfig::new(dir.path())).expect("Store should open");
        let writer = first.build(FRESH).await.expect("Build should open");
        writer
            .put(CacheNamespace::Build, "root", Bytes::from_static(b"root"))
            .await
            .expect("Put should succeed");

        let second = CacheStore::open(CacheConfig::new(dir.path())).expect("Store should open");
        let reader = second.build(FRESH).await.expect("Build should open");
        assert_eq!(
            reader.get(CacheNamespace::Build, "root").await.as_deref(),
            Some(&b"root"[..])
        );
    }

    #[tokio::test]
    async fn test_sweep_persists_ledger() {
        let dir = TempDir::new().expect("Test operation should succeed");
        let store = CacheStore::open(CacheConfig::new(dir.path()).with_expiry_days(7))
            .expect("Store should open");
        let stale = store.build(STALE).await.expect("Build should open");
        stale
            .put(CacheNamespace::Build, "root", Bytes::from_static(b"root"))
            .await
            .expect("Put should succeed");
        std::fs::write(
            stale.dir().join(BUILD_MANIFEST),
            format!("{{\"lastAccess\":{}}}", now_ms() - 8 * DAY_MS),
        )
        .expect("Test operation should succeed");

        let report = store.sweep_async().await.expect("Sweep should succeed");
        assert_eq!(report.removed, 1);
        assert!(!store.integrity().is_dirty());

        let reopened = IntegrityManifest::load(store.config().integrity_path());
        assert!(reopened.is_empty());
    }
}
