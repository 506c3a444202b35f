//! Error types for cache operations

use thiserror::Error;

/// Errors that can occur during cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    /// IO error during cache operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Cache key would escape its namespace directory
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;
