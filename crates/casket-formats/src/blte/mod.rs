//! BLTE (Block Table Encoded) container decoding
//!
//! BLTE wraps every piece of content CASC stores. A container is a header,
//! an optional block table and a run of blocks, each independently stored
//! raw, zlib or LZ4 compressed, or encrypted around another typed block.
//!
//! [`BlteReader`] decodes blocks on demand: reading a range only decodes the
//! blocks up to the end of that range, always in stream order, since the
//! decryption nonce of a block depends on its index.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use casket_crypto::StaticKeys;
//! use casket_formats::blte::{BlteBuilder, BlteReader};
//!
//! let encoded = BlteBuilder::new()
//!     .raw(b"first ")
//!     .zlib(b"second")
//!     .build()
//!     .expect("build");
//!
//! let reader = BlteReader::new(encoded.bytes, &encoded.key, Arc::new(StaticKeys::new()))
//!     .expect("valid container");
//! assert_eq!(reader.into_bytes().expect("decode"), b"first second");
//! ```

mod block;
mod builder;
mod compression;
mod encryption;
mod error;
mod header;

pub use block::{BlockMode, BlockOutcome, MAX_MODE_TAGS, decode_block};
pub use builder::{BlteBuilder, EncodedBlte};
pub use compression::{MAX_DECOMPRESSION_SIZE, deflate, encode_lz4, inflate};
pub use encryption::{EncryptedHeader, EncryptionType};
pub use error::{BlteError, BlteResult};
pub use header::{BLTE_MAGIC, BlockInfo, BlteHeader};

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use casket_crypto::{EncodingKey, KeyName, KeyProvider, md5_of};
use tracing::{debug, warn};

/// Lazily decoding BLTE reader
pub struct BlteReader {
    data: Vec<u8>,
    header: BlteHeader,
    keys: Arc<dyn KeyProvider>,
    partial_decrypt: bool,
    next_block: usize,
    input_offset: usize,
    out: Vec<u8>,
    pending_declared: usize,
    missing_keys: Vec<KeyName>,
    position: u64,
}

impl fmt::Debug for BlteReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlteReader")
            .field("blocks", &self.header.blocks.len())
            .field("blocks_decoded", &self.next_block)
            .field("decoded_len", &self.out.len())
            .field("partial_decrypt", &self.partial_decrypt)
            .finish_non_exhaustive()
    }
}

impl BlteReader {
    /// Whether `data` starts with the BLTE magic
    pub fn check(data: &[u8]) -> bool {
        data.starts_with(&BLTE_MAGIC)
    }

    /// Open a container, verifying its header against `expected`
    ///
    /// No block is decoded yet.
    pub fn new(
        data: Vec<u8>,
        expected: &EncodingKey,
        keys: Arc<dyn KeyProvider>,
    ) -> BlteResult<Self> {
        let header = BlteHeader::parse(&data, expected)?;
        let declared = header
            .blocks
            .iter()
            .map(|b| b.decompressed_size as usize)
            .sum();

        Ok(Self {
            input_offset: header.data_offset(),
            data,
            header,
            keys,
            partial_decrypt: false,
            next_block: 0,
            out: Vec::with_capacity(declared),
            pending_declared: declared,
            missing_keys: Vec::new(),
            position: 0,
        })
    }

    /// Zero-fill blocks whose key is missing instead of failing
    #[must_use]
    pub fn with_partial_decrypt(mut self, partial_decrypt: bool) -> Self {
        self.partial_decrypt = partial_decrypt;
        self
    }

    /// Parsed header
    pub fn header(&self) -> &BlteHeader {
        &self.header
    }

    /// Best known decoded length: decoded bytes plus the declared size of
    /// blocks not decoded yet
    pub fn len(&self) -> usize {
        self.out.len() + self.pending_declared
    }

    /// Whether the decoded content is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of blocks decoded so far
    pub fn blocks_decoded(&self) -> usize {
        self.next_block
    }

    /// Total number of blocks
    pub fn block_count(&self) -> usize {
        self.header.blocks.len()
    }

    /// Keys that were missing for zero-filled blocks
    pub fn missing_keys(&self) -> &[KeyName] {
        &self.missing_keys
    }

    /// Decode the next block, returning `false` once every block is decoded
    pub fn process_next_block(&mut self) -> BlteResult<bool> {
        let index = self.next_block;
        let Some(info) = self.header.blocks.get(index).copied() else {
            return Ok(false);
        };

        let start = self.input_offset;
        let end = start + info.compressed_size as usize;
        let raw = self.data.get(start..end).ok_or(BlteError::Truncated {
            needed: end,
            available: self.data.len(),
        })?;

        let declared = info.decompressed_size as usize;
        let block = decode_table_block(
            raw,
            &info,
            index,
            self.header.is_single_block(),
            self.keys.as_ref(),
            self.partial_decrypt,
        )?;
        self.out.extend_from_slice(&block.data);
        self.missing_keys.extend(block.missing_key);

        self.pending_declared -= declared;
        self.input_offset = end;
        self.next_block += 1;
        Ok(true)
    }

    /// Decode every remaining block
    pub fn process_all_blocks(&mut self) -> BlteResult<()> {
        while self.process_next_block()? {}
        Ok(())
    }

    /// Decode blocks until at least `end` bytes are available or none remain
    fn ensure(&mut self, end: usize) -> BlteResult<()> {
        while self.out.len() < end && self.process_next_block()? {}
        Ok(())
    }

    /// Borrow `len` decoded bytes at `offset`, decoding only what is needed
    pub fn read_range(&mut self, offset: usize, len: usize) -> BlteResult<&[u8]> {
        let end = offset.saturating_add(len);
        self.ensure(end)?;
        self.out.get(offset..end).ok_or(BlteError::OutOfBounds {
            offset,
            len,
            total: self.out.len(),
        })
    }

    /// Decode everything and return the content
    pub fn into_bytes(mut self) -> BlteResult<Vec<u8>> {
        self.process_all_blocks()?;
        Ok(self.out)
    }
}

/// One decoded block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBlock {
    /// Decoded bytes; zeros of the declared size when the key is missing
    pub data: Vec<u8>,
    /// Key of a zero-filled block
    pub missing_key: Option<KeyName>,
}

fn check_block_hash(raw: &[u8], info: &BlockInfo, index: usize) -> BlteResult<()> {
    if info.is_unchecked() {
        return Ok(());
    }
    let actual = md5_of(raw);
    if actual != info.hash {
        return Err(BlteError::ChecksumMismatch {
            block: index,
            expected: hex::encode(info.hash),
            actual: hex::encode(actual),
        });
    }
    Ok(())
}

/// Verify and decode the encoded bytes of block `index` of a block table
///
/// `single_block` marks the implicit block of a headerless container, whose
/// declared size is only an estimate.
pub fn decode_table_block(
    raw: &[u8],
    info: &BlockInfo,
    index: usize,
    single_block: bool,
    keys: &dyn KeyProvider,
    partial_decrypt: bool,
) -> BlteResult<DecodedBlock> {
    if raw.len() != info.compressed_size as usize {
        return Err(BlteError::Truncated {
            needed: info.compressed_size as usize,
            available: raw.len(),
        });
    }
    check_block_hash(raw, info, index)?;

    let declared = info.decompressed_size as usize;
    match decode_block(raw, index, keys)? {
        BlockOutcome::Decoded(data) => {
            if data.len() != declared {
                if single_block {
                    debug!(
                        block = index,
                        declared,
                        actual = data.len(),
                        "headerless block size corrected"
                    );
                } else {
                    warn!(
                        block = index,
                        declared,
                        actual = data.len(),
                        "block decoded to a different size than declared"
                    );
                }
            }
            Ok(DecodedBlock {
                data,
                missing_key: None,
            })
        }
        BlockOutcome::MissingKey(name) => {
            if !partial_decrypt {
                return Err(BlteError::EncryptionKeyMissing(name));
            }
            warn!(block = index, key = %name, "missing decryption key, zero-filling block");
            Ok(DecodedBlock {
                data: vec![0; declared],
                missing_key: Some(name),
            })
        }
    }
}

/// Check the header and every block hash of a container without decoding it
pub fn verify(data: &[u8], expected: &EncodingKey) -> BlteResult<BlteHeader> {
    let header = BlteHeader::parse(data, expected)?;
    let mut offset = header.data_offset();
    for (index, info) in header.blocks.iter().enumerate() {
        let end = offset + info.compressed_size as usize;
        let raw = data.get(offset..end).ok_or(BlteError::Truncated {
            needed: end,
            available: data.len(),
        })?;
        check_block_hash(raw, info, index)?;
        offset = end;
    }
    Ok(header)
}

/// Decode a whole container in one call
pub fn decode(
    data: Vec<u8>,
    expected: &EncodingKey,
    keys: Arc<dyn KeyProvider>,
    partial_decrypt: bool,
) -> BlteResult<Vec<u8>> {
    BlteReader::new(data, expected, keys)?
        .with_partial_decrypt(partial_decrypt)
        .into_bytes()
}

impl Read for BlteReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let pos = usize::try_from(self.position).unwrap_or(usize::MAX);
        self.ensure(pos.saturating_add(buf.len()))
            .map_err(io::Error::other)?;

        let available = self.out.len().saturating_sub(pos);
        let n = available.min(buf.len());
        if n > 0 {
            buf[..n].copy_from_slice(&self.out[pos..pos + n]);
            self.position += n as u64;
        }
        Ok(n)
    }
}

impl Seek for BlteReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => (self.len() as u64).checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };

        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of stream")
        })?;
        self.position = target;
        Ok(target)
    }
}
