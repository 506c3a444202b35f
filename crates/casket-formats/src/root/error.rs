//! Root table errors

use casket_crypto::FileDataId;
use thiserror::Error;

use super::flags::LocaleFlags;

/// Errors that can occur when parsing a root table
#[derive(Debug, Error)]
pub enum RootError {
    /// Modern header with an unknown version
    #[error("Unknown root version: {0}")]
    UnsupportedVersion(u32),

    /// A block declares more records than the table holds
    #[error("Root block at offset {offset} declares {count} records past the end of the table")]
    Truncated {
        /// Block offset
        offset: u64,
        /// Declared record count
        count: u32,
    },

    /// Delta decoding produced an identifier outside `u32`
    #[error("Root block at offset {offset} yields invalid file data ID {value}")]
    InvalidFileDataId {
        /// Block offset
        offset: u64,
        /// Decoded value
        value: i64,
    },

    /// Binary parsing error
    #[error("Binary parsing error: {0}")]
    BinRw(#[from] binrw::Error),
}

/// Why an identifier did not resolve to a content key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Unresolved {
    /// The identifier is not in the root table
    #[error("file data ID {0} does not exist in root")]
    UnknownFileDataId(FileDataId),

    /// The identifier exists but no usable variant matches the locale
    #[error("no root entry for file data ID {id} in locale {locale}")]
    NoMatchingVariant {
        /// Identifier
        id: FileDataId,
        /// Requested locale
        locale: LocaleFlags,
    },
}
