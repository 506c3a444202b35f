//! Read access to one game installation

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use casket_crypto::EncodingKey;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, trace};

use crate::build_info::BuildInfo;
use crate::config::StorageConfig;
use crate::index::{LocalIndex, LocalLocation};
use crate::{Result, StorageError};

/// Bytes preceding each blob in `data.NNN`: reversed key, size and checksums
pub const LOCAL_HEADER_SIZE: u32 = 0x1E;

/// An opened local installation
#[derive(Debug, Clone)]
pub struct LocalInstallation {
    config: StorageConfig,
    index: LocalIndex,
}

impl LocalInstallation {
    /// Open the installation and load its indexes
    pub async fn open(config: StorageConfig) -> Result<Self> {
        let index = LocalIndex::load_dir(&config.storage_dir()).await?;
        Ok(Self { config, index })
    }

    /// Read `.build.info` from the installation root
    pub async fn read_build_info(config: &StorageConfig) -> Result<BuildInfo> {
        BuildInfo::from_path(&config.build_info_path()).await
    }

    /// Installation layout
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Merged local index
    pub fn index(&self) -> &LocalIndex {
        &self.index
    }

    /// Whether `key` is present locally
    pub fn contains(&self, key: &EncodingKey) -> bool {
        self.index.lookup(key).is_some()
    }

    /// Read the encoded (BLTE) bytes of `key`
    pub async fn read_encoded(&self, key: &EncodingKey) -> Result<Vec<u8>> {
        let location = self
            .index
            .lookup(key)
            .ok_or_else(|| StorageError::NotFound(key.to_hex()))?;
        self.read_location(key, location).await
    }

    /// Locate the encoded blob of `key` without reading it
    pub fn blob(&self, key: &EncodingKey) -> Result<LocalBlob> {
        let location = self
            .index
            .lookup(key)
            .ok_or_else(|| StorageError::NotFound(key.to_hex()))?;
        if location.size <= LOCAL_HEADER_SIZE {
            return Err(StorageError::EmptyData(key.to_hex()));
        }
        Ok(LocalBlob {
            path: self.config.archive_path(location.archive_id),
            start: u64::from(location.offset) + u64::from(LOCAL_HEADER_SIZE),
            size: u64::from(location.size - LOCAL_HEADER_SIZE),
        })
    }

    /// Read up to `len` encoded bytes of `key` starting at `offset`
    pub async fn read_encoded_range(&self, key: &EncodingKey, offset: u64, len: u64) -> Result<Vec<u8>> {
        self.blob(key)?.read(offset, len).await
    }

    async fn read_location(&self, key: &EncodingKey, location: LocalLocation) -> Result<Vec<u8>> {
        if location.size <= LOCAL_HEADER_SIZE {
            return Err(StorageError::EmptyData(key.to_hex()));
        }

        let path = self.config.archive_path(location.archive_id);
        trace!(path = %path.display(), offset = location.offset, size = location.size, "reading local blob");

        let mut file = File::open(&path).await?;
        file.seek(SeekFrom::Start(u64::from(location.offset) + u64::from(LOCAL_HEADER_SIZE)))
            .await?;
        let mut buffer = vec![0u8; (location.size - LOCAL_HEADER_SIZE) as usize];
        file.read_exact(&mut buffer).await?;

        // Reclaimed space is zeroed, the index can still point at it
        if buffer.iter().all(|&b| b == 0) {
            return Err(StorageError::EmptyData(key.to_hex()));
        }
        Ok(buffer)
    }

    /// Read a config file by its hex key
    ///
    /// Returns `None` when the installation does not have it.
    pub async fn read_config(&self, key: &str) -> Result<Option<String>> {
        read_config_file(&self.config, key).await
    }
}

/// Encoded bytes of one file inside a `data.NNN` archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalBlob {
    path: PathBuf,
    start: u64,
    size: u64,
}

impl LocalBlob {
    /// Archive file holding the blob
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Encoded size, without the local blob header
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Read up to `len` bytes at `offset`, clamped to the end of the blob
    pub async fn read(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        if offset >= self.size {
            return Err(StorageError::EmptyData(self.path.display().to_string()));
        }
        let len = len.min(self.size - offset);
        trace!(path = %self.path.display(), offset, len, "reading local blob range");

        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(self.start + offset)).await?;
        let mut buffer = vec![0u8; len as usize];
        file.read_exact(&mut buffer).await?;
        Ok(buffer)
    }
}

/// Read a config file of the installation at `config` without loading its
/// indexes; `None` when absent
pub async fn read_config_file(config: &StorageConfig, key: &str) -> Result<Option<String>> {
    let path = config.config_path(key);
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config not present locally");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::index::build_index_file;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    async fn installation(blobs: &[(EncodingKey, Vec<u8>)]) -> (TempDir, LocalInstallation) {
        let dir = TempDir::new().expect("Test operation should succeed");
        let config = StorageConfig::new(dir.path());
        std::fs::create_dir_all(config.storage_dir()).expect("Test operation should succeed");

        let mut archive = Vec::new();
        let mut records = Vec::new();
        for (key, payload) in blobs {
            let offset = archive.len() as u32;
            archive.extend_from_slice(&[0xEE; LOCAL_HEADER_SIZE as usize]);
            archive.extend_from_slice(payload);
            records.push((
                *key,
                LocalLocation {
                    archive_id: 0,
                    offset,
                    size: payload.len() as u32 + LOCAL_HEADER_SIZE,
                },
            ));
        }
        std::fs::write(config.archive_path(0), archive).expect("Test operation should succeed");
        std::fs::write(
            config.storage_dir().join("0000000001.idx"),
            build_index_file(&records).expect("Build should succeed"),
        )
        .expect("Test operation should succeed");

        let install = LocalInstallation::open(config).await.expect("Open should succeed");
        (dir, install)
    }

    #[tokio::test]
    async fn test_read_encoded_skips_local_header() {
        let a = EncodingKey::from_bytes([1; 16]);
        let b = EncodingKey::from_bytes([2; 16]);
        let (_dir, install) = installation(&[(a, b"BLTE first".to_vec()), (b, b"BLTE second".to_vec())]).await;

        assert_eq!(install.read_encoded(&b).await.expect("Read should succeed"), b"BLTE second");
        assert_eq!(install.read_encoded(&a).await.expect("Read should succeed"), b"BLTE first");
    }

    #[tokio::test]
    async fn test_read_encoded_range() {
        let a = EncodingKey::from_bytes([1; 16]);
        let b = EncodingKey::from_bytes([2; 16]);
        let (_dir, install) = installation(&[(a, b"BLTE first".to_vec()), (b, b"BLTE second".to_vec())]).await;

        assert_eq!(install.blob(&b).expect("Blob should exist").size(), 11);
        assert_eq!(
            install.read_encoded_range(&b, 5, 3).await.expect("Read should succeed"),
            b"sec"
        );
        assert_eq!(
            install.read_encoded_range(&b, 0, 4096).await.expect("Read should succeed"),
            b"BLTE second"
        );
        assert!(matches!(
            install.read_encoded_range(&a, 10, 1).await,
            Err(StorageError::EmptyData(_))
        ));
    }

    #[tokio::test]
    async fn test_zeroed_blob_is_empty() {
        let key = EncodingKey::from_bytes([3; 16]);
        let (_dir, install) = installation(&[(key, vec![0; 16])]).await;
        assert!(matches!(
            install.read_encoded(&key).await,
            Err(StorageError::EmptyData(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_key() {
        let (_dir, install) = installation(&[]).await;
        assert!(matches!(
            install.read_encoded(&EncodingKey::from_bytes([4; 16])).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_read_config() {
        let (_dir, install) = installation(&[]).await;
        let key = "0123456789abcdef0123456789abcdef";
        assert!(install.read_config(key).await.expect("Read should succeed").is_none());

        let path = install.config().config_path(key);
        std::fs::create_dir_all(path.parent().expect("Config path has a parent"))
            .expect("Test operation should succeed");
        std::fs::write(&path, "root = abc\n").expect("Test operation should succeed");
        assert_eq!(
            install.read_config(key).await.expect("Read should succeed"),
            Some("root = abc\n".to_string())
        );
    }
}
