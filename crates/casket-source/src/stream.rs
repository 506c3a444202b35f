//! Block-by-block retrieval of encoded content
//!
//! A [`BlteStream`] reads the container header with one bounded request, then
//! fetches and decodes one block per request. Nothing past the block being
//! decoded is held in memory, and a caller that stops early never downloads
//! the rest of the file.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use casket_crypto::{EncodingKey, KeyName, KeyProvider};
use casket_formats::blte::{self, BlteHeader};
use casket_protocol::CdnClient;
use casket_storage::LocalBlob;
use futures::{Stream, stream};
use tracing::{debug, trace};

use crate::error::{Result, SourceError};

/// Bytes requested for the header before the block table size is known
pub const HEADER_READ_SIZE: u64 = 4096;

/// Where the encoded bytes of a streamed file live
#[derive(Debug, Clone)]
pub(crate) enum Origin {
    /// Blob in a local `data.NNN`
    Local(LocalBlob),
    /// Range of a CDN data file: an archive, or the file itself at offset 0
    Cdn {
        cdn: CdnClient,
        file: EncodingKey,
        base: u64,
        size: Option<u64>,
    },
    /// Already in memory, e.g. from the build cache
    Memory(Bytes),
}

impl Origin {
    /// Encoded size when known without a request
    fn size(&self) -> Option<u64> {
        match self {
            Self::Local(blob) => Some(blob.size()),
            Self::Cdn { size, .. } => *size,
            Self::Memory(data) => Some(data.len() as u64),
        }
    }

    async fn read(&self, offset: u64, len: u64) -> Result<Bytes> {
        match self {
            Self::Local(blob) => Ok(Bytes::from(blob.read(offset, len).await?)),
            Self::Cdn { cdn, file, base, .. } => {
                Ok(cdn.fetch_data_range(file, *base + offset, len).await?)
            }
            Self::Memory(data) => {
                let start = (offset as usize).min(data.len());
                let end = start.saturating_add(len as usize).min(data.len());
                Ok(data.slice(start..end))
            }
        }
    }

    /// The whole container
    async fn read_all(&self) -> Result<Bytes> {
        match (self, self.size()) {
            (Self::Memory(data), _) => Ok(data.clone()),
            (_, Some(size)) => self.read(0, size).await,
            (Self::Cdn { cdn, file, .. }, None) => Ok(cdn.fetch_data(file).await?),
            (Self::Local(blob), None) => Ok(Bytes::from(blob.read(0, blob.size()).await?)),
        }
    }
}

/// Lazily fetched, block-at-a-time decoded BLTE content
pub struct BlteStream {
    ekey: EncodingKey,
    header: BlteHeader,
    origin: Origin,
    keys: Arc<dyn KeyProvider>,
    partial_decrypt: bool,
    next_block: usize,
    offset: u64,
    missing_keys: Vec<KeyName>,
}

impl fmt::Debug for BlteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlteStream")
            .field("ekey", &self.ekey)
            .field("blocks", &self.header.blocks.len())
            .field("blocks_decoded", &self.next_block)
            .field("partial_decrypt", &self.partial_decrypt)
            .finish_non_exhaustive()
    }
}

impl BlteStream {
    /// Read and verify the header of `ekey` from `origin`
    ///
    /// The first read is at most [`HEADER_READ_SIZE`] bytes; a block table
    /// larger than that is read again at its exact size. A headerless
    /// container can only be verified whole, so it is read whole and served
    /// from memory.
    pub(crate) async fn open(
        origin: Origin,
        ekey: EncodingKey,
        keys: Arc<dyn KeyProvider>,
        partial_decrypt: bool,
    ) -> Result<Self> {
        let first_read = origin.size().map_or(HEADER_READ_SIZE, |size| size.min(HEADER_READ_SIZE));
        let prefix = origin.read(0, first_read).await?;

        let (header, origin) = match BlteHeader::required_len(&prefix)? {
            Some(len) if len <= prefix.len() => (BlteHeader::parse(&prefix, &ekey)?, origin),
            Some(len) => {
                trace!(key = %ekey, header_size = len, "block table exceeds first read");
                let full = origin.read(0, len as u64).await?;
                (BlteHeader::parse(&full, &ekey)?, origin)
            }
            None => {
                let whole = if origin.size() == Some(prefix.len() as u64) {
                    prefix
                } else {
                    origin.read_all().await?
                };
                (BlteHeader::parse(&whole, &ekey)?, Origin::Memory(whole))
            }
        };

        debug!(key = %ekey, blocks = header.blocks.len(), header_size = header.header_size, "opened block stream");
        Ok(Self {
            offset: header.data_offset() as u64,
            ekey,
            header,
            origin,
            keys,
            partial_decrypt,
            next_block: 0,
            missing_keys: Vec::new(),
        })
    }

    /// Encoding key of the streamed file
    pub fn encoding_key(&self) -> &EncodingKey {
        &self.ekey
    }

    /// Parsed header
    pub fn header(&self) -> &BlteHeader {
        &self.header
    }

    /// Total number of blocks
    pub fn block_count(&self) -> usize {
        self.header.blocks.len()
    }

    /// Number of blocks returned so far
    pub fn blocks_decoded(&self) -> usize {
        self.next_block
    }

    /// Sum of the declared decoded block sizes
    pub fn declared_size(&self) -> u64 {
        self.header.declared_size()
    }

    /// Keys that were missing for zero-filled blocks
    pub fn missing_keys(&self) -> &[KeyName] {
        &self.missing_keys
    }

    /// Fetch, verify and decode the next block; `None` once all are returned
    pub async fn next_block(&mut self) -> Result<Option<Vec<u8>>> {
        let index = self.next_block;
        let Some(info) = self.header.blocks.get(index).copied() else {
            return Ok(None);
        };

        let raw = self
            .origin
            .read(self.offset, u64::from(info.compressed_size))
            .await?;
        let block = blte::decode_table_block(
            &raw,
            &info,
            index,
            self.header.is_single_block(),
            self.keys.as_ref(),
            self.partial_decrypt,
        )?;
        trace!(key = %self.ekey, block = index, size = block.data.len(), "decoded streamed block");

        self.missing_keys.extend(block.missing_key);
        self.offset += u64::from(info.compressed_size);
        self.next_block += 1;
        Ok(Some(block.data))
    }

    /// Decoded blocks as an async stream
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes>> + Send {
        stream::try_unfold(self, |mut this| async move {
            let block = this.next_block().await?;
            Ok::<_, SourceError>(block.map(|block| (Bytes::from(block), this)))
        })
    }

    /// Decode every remaining block into one buffer
    pub async fn read_to_end(mut self) -> Result<Vec<u8>> {
        let remaining = self.header.blocks[self.next_block..]
            .iter()
            .map(|b| b.decompressed_size as usize)
            .sum();
        let mut out = Vec::with_capacity(remaining);
        while let Some(block) = self.next_block().await? {
            out.extend_from_slice(&block);
        }
        Ok(out)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use casket_crypto::StaticKeys;
    use casket_formats::blte::BlteBuilder;
    use futures::TryStreamExt;
    use pretty_assertions::assert_eq;

    fn no_keys() -> Arc<dyn KeyProvider> {
        Arc::new(StaticKeys::new())
    }

    #[tokio::test]
    async fn test_blocks_from_memory() {
        let encoded = BlteBuilder::new()
            .raw(b"one ")
            .zlib(b"two ")
            .lz4(b"three")
            .build()
            .expect("Build should succeed");
        let origin = Origin::Memory(Bytes::from(encoded.bytes));

        let mut stream = BlteStream::open(origin, encoded.key, no_keys(), false)
            .await
            .expect("Open should succeed");
        assert_eq!(stream.block_count(), 3);
        assert_eq!(stream.declared_size(), 13);

        assert_eq!(stream.next_block().await.expect("Block should decode"), Some(b"one ".to_vec()));
        assert_eq!(stream.blocks_decoded(), 1);

        let rest: Vec<Bytes> = stream
            .into_stream()
            .try_collect()
            .await
            .expect("Blocks should decode");
        assert_eq!(rest, vec![Bytes::from_static(b"two "), Bytes::from_static(b"three")]);
    }

    #[tokio::test]
    async fn test_headerless_container() {
        let encoded = BlteBuilder::new()
            .zlib(b"single block content")
            .headerless()
            .build()
            .expect("Build should succeed");
        let stream = BlteStream::open(Origin::Memory(Bytes::from(encoded.bytes)), encoded.key, no_keys(), false)
            .await
            .expect("Open should succeed");
        assert!(stream.header().is_single_block());
        assert_eq!(stream.read_to_end().await.expect("Decode should succeed"), b"single block content");
    }

    #[tokio::test]
    async fn test_damaged_block_fails_at_that_block() {
        let encoded = BlteBuilder::new()
            .raw(b"good")
            .raw(b"evil")
            .build()
            .expect("Build should succeed");
        let mut bytes = encoded.bytes;
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        let mut stream = BlteStream::open(Origin::Memory(Bytes::from(bytes)), encoded.key, no_keys(), false)
            .await
            .expect("Header is intact");
        assert_eq!(stream.next_block().await.expect("First block is intact"), Some(b"good".to_vec()));
        let err = stream.next_block().await.expect_err("Damage should be detected");
        assert!(matches!(err, SourceError::Integrity(_)));
    }

    #[tokio::test]
    async fn test_wrong_key_rejected() {
        let encoded = BlteBuilder::new().raw(b"data").build().expect("Build should succeed");
        let result = BlteStream::open(
            Origin::Memory(Bytes::from(encoded.bytes)),
            EncodingKey::from_bytes([7; 16]),
            no_keys(),
            false,
        )
        .await;
        assert!(matches!(result, Err(SourceError::Integrity(_))));
    }
}
