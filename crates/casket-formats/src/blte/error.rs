//! BLTE error types

use casket_crypto::KeyName;
use thiserror::Error;

/// BLTE-specific error type
#[derive(Debug, Error)]
pub enum BlteError {
    /// Input shorter than the structure being read
    #[error("not enough data: needed {needed} bytes, have {available}")]
    Truncated {
        /// Bytes required
        needed: usize,
        /// Bytes available
        available: usize,
    },

    /// Invalid BLTE magic bytes
    #[error("invalid BLTE magic: expected [42 4C 54 45], got {0:02X?}")]
    InvalidMagic([u8; 4]),

    /// Header size does not match the block table it describes
    #[error("invalid header size: {header_size} (block table needs {expected})")]
    InvalidHeaderSize {
        /// Header size field
        header_size: u32,
        /// Size implied by the block count
        expected: u64,
    },

    /// Block table flag byte or count is not usable
    #[error("invalid block table: flags 0x{flags:02X}, {count} blocks")]
    InvalidTable {
        /// Flag byte
        flags: u8,
        /// Block count
        count: u32,
    },

    /// Hash of the header (or of the whole headerless container) does not match
    #[error("container hash mismatch: expected {expected}, got {actual}")]
    HeaderHashMismatch {
        /// Expected hash
        expected: String,
        /// Computed hash
        actual: String,
    },

    /// Hash of a block's raw bytes does not match its table entry
    #[error("block {block} hash mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Block index
        block: usize,
        /// Expected checksum
        expected: String,
        /// Computed checksum
        actual: String,
    },

    /// Block carries no mode byte
    #[error("block {0} is empty")]
    EmptyBlock(usize),

    /// Unknown block mode
    #[error("unknown block mode: 0x{0:02X}")]
    UnknownBlockMode(u8),

    /// Recursive frame blocks are not supported
    #[error("recursive frame blocks are not supported")]
    UnsupportedFrame,

    /// Encryption type other than Salsa20
    #[error("unsupported encryption type: 0x{0:02X}")]
    UnsupportedEncryption(u8),

    /// Malformed encrypted block header
    #[error("invalid encrypted block: {0}")]
    InvalidEncryptedBlock(String),

    /// Encrypted block names a key that is not available
    #[error("encryption key not found: {0}")]
    EncryptionKeyMissing(KeyName),

    /// Encryption wrapped more times than any real container does
    #[error("block {0} nests encryption too deeply")]
    NestingTooDeep(usize),

    /// Decompression failed
    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    /// Read past the decoded content
    #[error("read of {len} bytes at {offset} is beyond the {total} decoded bytes")]
    OutOfBounds {
        /// Requested offset
        offset: usize,
        /// Requested length
        len: usize,
        /// Total decoded length
        total: usize,
    },

    /// Compression failed while building a container
    #[error("compression error: {0}")]
    CompressionError(String),

    /// Binary parsing error
    #[error("binary parsing error: {0}")]
    BinRw(#[from] binrw::Error),
}

impl BlteError {
    /// Whether the error indicates damaged bytes rather than a missing capability
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            Self::HeaderHashMismatch { .. } | Self::ChecksumMismatch { .. }
        )
    }
}

/// Result type for BLTE operations
pub type BlteResult<T> = Result<T, BlteError>;
