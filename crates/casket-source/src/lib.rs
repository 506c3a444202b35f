//! CASC content sources
//!
//! A content source turns a file data ID into verified, decoded bytes:
//!
//! ```text
//! file data ID --root--> content key --encoding--> encoding key
//!     --local index / build cache / CDN archive--> BLTE --> content
//! ```
//!
//! Two implementations of [`ContentSource`] exist:
//!
//! - [`LocalSource`] reads a game installation and falls back to the build
//!   cache and then the CDN whenever local data is missing or damaged.
//! - [`RemoteSource`] reads straight from the CDN through the build cache.
//!
//! Both share the table helpers in [`tables`], and both can stream a file
//! block by block through [`BlteStream`] instead of fetching it whole.
//!
//! The keyring and the cache integrity ledger are process-wide. Cache stores
//! write the ledger through; [`spawn_flush_task`] persists the keyring and
//! retries ledger writes that failed.

#![warn(missing_docs)]

pub mod cli;
mod config;
mod error;
mod export;
mod local;
mod persist;
mod remote;
mod source;
mod stream;
mod writes;
pub mod tables;

pub use config::{FetchOptions, SourceConfig, SourceContext};
pub use error::{Result, SourceError};
pub use export::{BatchReport, DirectorySink, ExportSink, export_batch};
pub use local::LocalSource;
pub use persist::{Flush, FlushHandle, spawn_flush_task};
pub use remote::RemoteSource;
pub use source::ContentSource;
pub use stream::{BlteStream, HEADER_READ_SIZE};
pub use tables::BuildTables;
