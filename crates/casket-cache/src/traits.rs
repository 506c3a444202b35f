//! Cache seam consumed by content sources

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::CacheResult;

/// Directory a cached file lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheNamespace {
    /// The per-build directory (`encoding`, `root`)
    Build,
    /// Shared fetched blobs, named by encoding key
    Data,
    /// Shared CDN archive indexes
    Indices,
}

impl CacheNamespace {
    /// Directory name under the cache root; `None` for the per-build directory
    pub const fn dir_name(self) -> Option<&'static str> {
        match self {
            Self::Build => None,
            Self::Data => Some("data"),
            Self::Indices => Some("indices"),
        }
    }
}

/// Namespaced get/put of opaque cache keys
#[async_trait]
pub trait ContentCache: Send + Sync {
    /// Cached bytes for `key`, or `None` on a miss or failed integrity check
    async fn get(&self, namespace: CacheNamespace, key: &str) -> Option<Bytes>;

    /// Store `data` under `key` and record its digest
    async fn put(&self, namespace: CacheNamespace, key: &str, data: Bytes) -> CacheResult<()>;
}
