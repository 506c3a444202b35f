//! Error types for local storage

use casket_formats::BpsvError;
use thiserror::Error;

/// Errors from reading a local installation
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `.build.info` is not a valid BPSV document.
    #[error("Invalid .build.info: {0}")]
    BuildInfo(#[from] BpsvError),

    /// Invalid data format.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Key is not in any local index.
    #[error("Requested file does not exist in local data: {0}")]
    NotFound(String),

    /// The indexed region of the data file is empty or zeroed.
    #[error("Requested data file is empty or missing: {0}")]
    EmptyData(String),
}

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;
