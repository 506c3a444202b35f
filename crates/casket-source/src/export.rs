//! Batch export with a per-file tally

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use casket_crypto::FileDataId;
use tracing::{debug, info, warn};

use crate::config::FetchOptions;
use crate::error::Result;
use crate::source::ContentSource;

/// Destination of exported files
#[async_trait]
pub trait ExportSink: Send {
    /// Accept the decoded content of `id`
    async fn write(&mut self, id: FileDataId, content: Vec<u8>) -> Result<()>;
}

/// Writes each file to `<dir>/<file data id>`
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// Sink writing into `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ExportSink for DirectorySink {
    async fn write(&mut self, id: FileDataId, content: Vec<u8>) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.dir.join(id.to_string()), content).await?;
        Ok(())
    }
}

/// Outcome of a batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Files exported
    pub succeeded: usize,
    /// Files that failed, with the reason
    pub failed: Vec<(FileDataId, String)>,
    /// Whether the batch stopped early
    pub cancelled: bool,
}

impl BatchReport {
    /// Files attempted
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed.len()
    }

    /// Whether every attempted file succeeded and the batch ran to completion
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }
}

async fn export_one<S: ContentSource + ?Sized>(
    source: &S,
    id: FileDataId,
    options: FetchOptions,
    sink: &mut dyn ExportSink,
) -> Result<()> {
    let content = source.get_file(id, options).await?.into_bytes()?;
    sink.write(id, content).await
}

/// Export `ids` into `sink`, one file at a time
///
/// A failing file is recorded and the batch moves on. Files whose bytes
/// turn out damaged are retried once, skipping local data. `cancel` is
/// checked between files.
pub async fn export_batch<S: ContentSource + ?Sized>(
    source: &S,
    ids: &[FileDataId],
    sink: &mut dyn ExportSink,
    cancel: &AtomicBool,
) -> BatchReport {
    let options = FetchOptions::for_config(source.config());
    let mut report = BatchReport::default();

    for &id in ids {
        if cancel.load(Ordering::Acquire) {
            info!(remaining = ids.len() - report.attempted(), "export cancelled");
            report.cancelled = true;
            break;
        }

        let result = match export_one(source, id, options, sink).await {
            Err(e) if e.is_corruption() => {
                warn!(file_data_id = %id, error = %e, "file is corrupt, retrying without local data");
                export_one(source, id, options.forced(), sink).await
            }
            result => result,
        };

        match result {
            Ok(()) => {
                debug!(file_data_id = %id, "exported file");
                report.succeeded += 1;
            }
            Err(e) => {
                warn!(file_data_id = %id, error = %e, "failed to export file");
                report.failed.push((id, e.to_string()));
            }
        }
    }

    info!(
        succeeded = report.succeeded,
        failed = report.failed.len(),
        "export finished"
    );
    report
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::SourceConfig;
    use crate::error::SourceError;
    use crate::stream::{BlteStream, Origin};
    use crate::tables::BuildTables;
    use bytes::Bytes;
    use casket_crypto::{ContentKey, EncodingKey, KeyProvider, StaticKeys};
    use casket_formats::encoding::EncodingBuilder;
    use casket_formats::root::{ContentFlags, LocaleFlags, RootBuilder, RootVariant};
    use casket_formats::{BlteBuilder, EncodingTable, InstallManifest, RootTable};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    /// Serves fixed containers; `corrupt` keys return damaged bytes unless forced
    struct MemorySource {
        config: SourceConfig,
        tables: BuildTables,
        blobs: HashMap<EncodingKey, Vec<u8>>,
        corrupt: Vec<EncodingKey>,
        forced_fetches: AtomicUsize,
    }

    impl MemorySource {
        fn new() -> Self {
            let mut blobs = HashMap::new();
            let mut encoding = EncodingBuilder::new();
            let mut records = Vec::new();
            for id in 1..=3u8 {
                let ckey = ContentKey::from_bytes([id; 16]);
                let container = BlteBuilder::new()
                    .zlib(format!("file {id}").as_bytes())
                    .build()
                    .expect("Build should succeed");
                // id 3 is in root only
                if id != 3 {
                    encoding = encoding.entry(ckey, &[container.key], 6);
                }
                blobs.insert(container.key, container.bytes);
                records.push((FileDataId(u32::from(id)), ckey));
            }
            let root = RootBuilder::modern(2)
                .block(
                    RootVariant {
                        content_flags: ContentFlags::LOAD_ON_WINDOWS,
                        locale_flags: LocaleFlags::EN_US,
                    },
                    &records,
                )
                .build();

            let tables = BuildTables::new(
                EncodingTable::parse(&encoding.build()).expect("Encoding should parse"),
                RootTable::parse(&root).expect("Root should parse"),
            );
            let corrupt = vec![
                tables
                    .resolve(FileDataId(2), LocaleFlags::EN_US)
                    .expect("File 2 should resolve"),
            ];

            Self {
                config: SourceConfig::default(),
                tables,
                blobs,
                corrupt,
                forced_fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ContentSource for MemorySource {
        fn config(&self) -> &SourceConfig {
            &self.config
        }

        fn keys(&self) -> Arc<dyn KeyProvider> {
            Arc::new(StaticKeys::new())
        }

        fn tables(&self) -> Result<&BuildTables> {
            Ok(&self.tables)
        }

        async fn get_encoded(&self, ekey: &EncodingKey, options: FetchOptions) -> Result<Bytes> {
            if options.force_fallback {
                self.forced_fetches.fetch_add(1, Ordering::SeqCst);
            }
            let mut data = self
                .blobs
                .get(ekey)
                .cloned()
                .ok_or_else(|| SourceError::StorageUnavailable(ekey.to_hex()))?;
            if !options.force_fallback && self.corrupt.contains(ekey) {
                let last = data.len() - 1;
                data[last] ^= 0xFF;
            }
            Ok(Bytes::from(data))
        }

        async fn get_install_manifest(&self) -> Result<InstallManifest> {
            Err(SourceError::Lookup("no install manifest".to_string()))
        }

        async fn open_stream(&self, ekey: &EncodingKey, options: FetchOptions) -> Result<BlteStream> {
            let data = self.get_encoded(ekey, options).await?;
            BlteStream::open(Origin::Memory(data), *ekey, self.keys(), options.partial_decrypt).await
        }
    }

    #[derive(Default)]
    struct MemorySink {
        files: HashMap<FileDataId, Vec<u8>>,
    }

    #[async_trait]
    impl ExportSink for MemorySink {
        async fn write(&mut self, id: FileDataId, content: Vec<u8>) -> Result<()> {
            self.files.insert(id, content);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_batch_tallies_without_aborting() {
        let source = MemorySource::new();
        let mut sink = MemorySink::default();
        let ids = [FileDataId(1), FileDataId(2), FileDataId(3), FileDataId(4)];

        let report = export_batch(&source, &ids, &mut sink, &AtomicBool::new(false)).await;

        assert_eq!(report.succeeded, 2);
        assert_eq!(report.attempted(), 4);
        assert!(!report.cancelled);
        let failed: Vec<FileDataId> = report.failed.iter().map(|(id, _)| *id).collect();
        assert_eq!(failed, vec![FileDataId(3), FileDataId(4)]);

        // file 2 came back intact through the forced retry
        assert_eq!(sink.files[&FileDataId(2)], b"file 2");
        assert_eq!(source.forced_fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_file_stream_resolves_like_get_file() {
        let source = MemorySource::new();
        let stream = source
            .get_file_stream(FileDataId(1), FetchOptions::default())
            .await
            .expect("Stream should open");
        assert_eq!(stream.block_count(), 1);
        assert_eq!(stream.read_to_end().await.expect("Stream should decode"), b"file 1");

        let err = source
            .get_file_stream(FileDataId(3), FetchOptions::default())
            .await
            .expect_err("File 3 has no encoding entry");
        assert!(matches!(err, SourceError::Lookup(_)));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let source = MemorySource::new();
        let mut sink = MemorySink::default();

        let report = export_batch(&source, &[FileDataId(1)], &mut sink, &AtomicBool::new(true)).await;

        assert!(report.cancelled);
        assert_eq!(report.attempted(), 0);
        assert!(!report.is_complete());
        assert!(sink.files.is_empty());
    }

    #[tokio::test]
    async fn test_directory_sink() {
        let dir = tempfile::TempDir::new().expect("Test operation should succeed");
        let mut sink = DirectorySink::new(dir.path().join("out"));
        sink.write(FileDataId(42), b"content".to_vec())
            .await
            .expect("Write should succeed");
        assert_eq!(
            std::fs::read(dir.path().join("out").join("42")).expect("File should exist"),
            b"content"
        );
    }
}
