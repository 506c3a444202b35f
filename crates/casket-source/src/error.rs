//! Error taxonomy of content retrieval
//!
//! Lower crates report what went wrong in their own terms; here every failure
//! is sorted into the class that decides what happens next: try the next
//! storage tier, retry from the CDN, ask for a key or give up on one file.

use casket_cache::CacheError;
use casket_crypto::KeyName;
use casket_formats::blte::BlteError;
use casket_formats::root::Unresolved;
use casket_formats::{
    ArchiveIndexError, BpsvError, ConfigError, EncodingError, InstallError, RootError,
};
use casket_protocol::ProtocolError;
use casket_storage::StorageError;
use thiserror::Error;

/// Errors from a content source
#[derive(Debug, Error)]
pub enum SourceError {
    /// Bad magic, malformed header or size fields
    #[error("{stage}: {message}")]
    Format {
        /// Which format or step failed
        stage: &'static str,
        /// What was wrong
        message: String,
    },

    /// Content does not match its declared hash
    #[error("integrity check failed: {0}")]
    Integrity(String),

    /// An encrypted block names a key the keyring does not hold
    #[error("missing decryption key {key_name}")]
    EncryptionKeyMissing {
        /// Name of the missing key
        key_name: KeyName,
    },

    /// Identifier or key does not resolve
    #[error("lookup failed: {0}")]
    Lookup(String),

    /// Local data is missing or unreadable
    #[error("local storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Network request failed
    #[error("network error{}: {message}", url.as_deref().map(|u| format!(" ({u})")).unwrap_or_default())]
    Network {
        /// Failed URL, if known
        url: Option<String>,
        /// Response status, if any
        status: Option<u16>,
        /// Transport error
        message: String,
    },

    /// No build could be selected or loaded
    #[error("no usable build: {0}")]
    Bootstrap(String),

    /// Operation needs a loaded build
    #[error("no build loaded")]
    NotLoaded,

    /// Build cache failure
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    /// Whether another storage tier may still succeed
    pub fn is_recoverable_by_fallback(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable(_) | Self::Network { .. } | Self::Integrity(_)
        )
    }

    /// Whether the bytes themselves were bad, so a refetch from the CDN may help
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Integrity(_) | Self::Format { .. })
    }

    pub(crate) fn format(stage: &'static str, error: impl std::fmt::Display) -> Self {
        Self::Format {
            stage,
            message: error.to_string(),
        }
    }
}

impl From<BlteError> for SourceError {
    fn from(error: BlteError) -> Self {
        match error {
            BlteError::EncryptionKeyMissing(key_name) => Self::EncryptionKeyMissing { key_name },
            e if e.is_integrity() => Self::Integrity(e.to_string()),
            e => Self::format("blte", e),
        }
    }
}

impl From<ProtocolError> for SourceError {
    fn from(error: ProtocolError) -> Self {
        match error {
            ProtocolError::Bpsv(e) => Self::format("patch server document", e),
            ProtocolError::Config(e) => Self::format("config", e),
            e => Self::Network {
                url: e.url(),
                status: e.status(),
                message: e.to_string(),
            },
        }
    }
}

impl From<StorageError> for SourceError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::BuildInfo(e) => Self::format(".build.info", e),
            e => Self::StorageUnavailable(e.to_string()),
        }
    }
}

impl From<Unresolved> for SourceError {
    fn from(error: Unresolved) -> Self {
        Self::Lookup(error.to_string())
    }
}

impl From<EncodingError> for SourceError {
    fn from(error: EncodingError) -> Self {
        Self::format("encoding", error)
    }
}

impl From<RootError> for SourceError {
    fn from(error: RootError) -> Self {
        Self::format("root", error)
    }
}

impl From<ConfigError> for SourceError {
    fn from(error: ConfigError) -> Self {
        Self::format("config", error)
    }
}

impl From<ArchiveIndexError> for SourceError {
    fn from(error: ArchiveIndexError) -> Self {
        Self::format("archive index", error)
    }
}

impl From<InstallError> for SourceError {
    fn from(error: InstallError) -> Self {
        Self::format("install manifest", error)
    }
}

impl From<BpsvError> for SourceError {
    fn from(error: BpsvError) -> Self {
        Self::format("bpsv", error)
    }
}

/// Result type for content source operations
pub type Result<T> = std::result::Result<T, SourceError>;
