//! Error types for protocol operations

use casket_formats::{BpsvError, ConfigError};
use thiserror::Error;

/// Errors from patch server and CDN requests
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Transport failure, including timeouts
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// Requested URL
        url: String,
        /// Response status
        status: u16,
    },

    /// Patch server document could not be parsed
    #[error("BPSV error: {0}")]
    Bpsv(#[from] BpsvError),

    /// Build or CDN config could not be parsed
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Response body was not UTF-8
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// `cdns` has no row for the region
    #[error("CDN config does not contain entry for region {0}")]
    RegionNotFound(String),

    /// Every host failed to answer
    #[error("Unable to resolve a CDN host from: {0}")]
    AllHostsFailed(String),

    /// Every ranked host failed to serve a file
    #[error("Unable to retrieve {file} from any CDN host: {last}")]
    AllHostsExhausted {
        /// What was requested
        file: String,
        /// Last error seen
        last: Box<Self>,
    },
}

impl ProtocolError {
    /// Status code, if the error is a non-success response
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::AllHostsExhausted { last, .. } => last.status(),
            _ => None,
        }
    }

    /// URL of the failed request, if known
    pub fn url(&self) -> Option<String> {
        match self {
            Self::HttpStatus { url, .. } => Some(url.clone()),
            Self::Http(e) => e.url().map(ToString::to_string),
            Self::AllHostsExhausted { last, .. } => last.url(),
            _ => None,
        }
    }
}

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;
