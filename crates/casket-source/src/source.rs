//! The content source seam

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use casket_crypto::{ContentKey, EncodingKey, FileDataId, KeyProvider};
use casket_formats::InstallManifest;
use casket_formats::blte::BlteReader;
use tracing::debug;

use crate::config::{FetchOptions, SourceConfig};
use crate::error::Result;
use crate::stream::BlteStream;
use crate::tables::{self, BuildTables};

/// A loaded build that can serve files
///
/// Implementors supply the fetch path for encoded bytes; resolution and
/// decoding are shared.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Source settings
    fn config(&self) -> &SourceConfig;

    /// Decryption keys
    fn keys(&self) -> Arc<dyn KeyProvider>;

    /// Tables of the loaded build
    fn tables(&self) -> Result<&BuildTables>;

    /// Encoded (BLTE) bytes of `ekey`
    async fn get_encoded(&self, ekey: &EncodingKey, options: FetchOptions) -> Result<Bytes>;

    /// The build's install manifest
    async fn get_install_manifest(&self) -> Result<InstallManifest>;

    /// Encoded content of `ekey` as a stream fetching one block per read
    async fn open_stream(&self, ekey: &EncodingKey, options: FetchOptions) -> Result<BlteStream>;

    /// Content of `ckey` as a lazily decoding stream
    async fn get_file_by_content_key(
        &self,
        ckey: &ContentKey,
        options: FetchOptions,
    ) -> Result<BlteReader> {
        let ekey = self.tables()?.encoding_key(ckey)?;
        let bytes = self.get_encoded(&ekey, options).await?;
        tables::open_container(Vec::from(bytes), &ekey, self.keys(), options.partial_decrypt)
    }

    /// Content of `id` in the configured locale
    async fn get_file(&self, id: FileDataId, options: FetchOptions) -> Result<BlteReader> {
        let locale = self.config().locale_flags();
        let ckey = self.tables()?.content_key(id, locale)?;
        debug!(file_data_id = %id, %ckey, "resolved file");
        self.get_file_by_content_key(&ckey, options).await
    }

    /// Content of `id` decoded block by block as it is fetched
    async fn get_file_stream(&self, id: FileDataId, options: FetchOptions) -> Result<BlteStream> {
        let locale = self.config().locale_flags();
        let tables = self.tables()?;
        let ckey = tables.content_key(id, locale)?;
        let ekey = tables.encoding_key(&ckey)?;
        debug!(file_data_id = %id, %ckey, key = %ekey, "streaming file");
        self.open_stream(&ekey, options).await
    }

    /// Whether `id` has content in the configured locale
    fn file_exists(&self, id: FileDataId) -> bool {
        let locale = self.config().locale_flags();
        self.tables()
            .is_ok_and(|tables| tables.root().file_exists(id, locale))
    }
}
