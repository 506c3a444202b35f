//! Error types for encoding table parsing

use thiserror::Error;

/// Errors that can occur when parsing an encoding table
#[derive(Debug, Error)]
pub enum EncodingError {
    /// Header does not start with `EN`
    #[error("Invalid encoding magic: expected 'EN', got {0:02X?}")]
    InvalidMagic([u8; 2]),

    /// Key sizes other than 16 bytes
    #[error("Invalid {field} hash size: expected 16, got {value}")]
    InvalidHashSize {
        /// Which hash size field is invalid
        field: &'static str,
        /// The invalid value
        value: u8,
    },

    /// Page size of zero
    #[error("Invalid page size: {0} KiB")]
    InvalidPageSize(u16),

    /// Table ends before a page or record it declares
    #[error("Encoding table truncated at offset {offset} (length {len})")]
    Truncated {
        /// Offset that could not be read
        offset: usize,
        /// Length of the table
        len: usize,
    },

    /// Binary parsing error
    #[error("Binary parsing error: {0}")]
    BinRw(#[from] binrw::Error),
}
