//! Error types for cryptographic operations

use thiserror::Error;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Invalid key size
    #[error("Invalid key size: expected {expected}, got {actual}")]
    InvalidKeySize {
        /// Expected key size in bytes
        expected: usize,
        /// Actual key size in bytes
        actual: usize,
    },

    /// Invalid key name
    #[error("Invalid key name: {0}")]
    InvalidKeyName(String),

    /// Invalid key format
    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    /// Keyring file could not be read or written
    #[error("Keyring I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Keyring file is not a JSON object of name/key strings
    #[error("Keyring serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
