//! Parsers for the formats a CASC content source reads
//!
#![allow(clippy::cast_possible_wrap)] // Intentional for binary operations
#![allow(clippy::cast_lossless)] // Sometimes clearer than From
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
#![allow(clippy::similar_names)] // Domain-specific naming patterns
//! Everything in this crate is pure: bytes in, typed tables out. Fetching the
//! bytes, caching them and choosing between local and remote storage lives in
//! the crates above.
//!
//! # Supported Formats
//!
//! - **BLTE**: block table encoded container with per-block compression and
//!   encryption, decoded lazily through [`blte::BlteReader`]
//! - **Encoding**: content key to encoding key table
//! - **Root**: file data ID to locale/content-flag variants
//! - **Archive index**: CDN `.index` files locating encoded blobs inside archives
//! - **BPSV**: pipe separated documents used by `.build.info` and the patch server
//! - **Config**: `key = value` build and CDN configuration
//! - **Install**: tagged install manifest

#![warn(missing_docs)]

pub mod archive;
pub mod blte;
pub mod bpsv;
pub mod config;
pub mod encoding;
pub mod install;
pub mod root;

pub use archive::{ArchiveIndex, ArchiveIndexEntry, ArchiveIndexError};
pub use blte::{BlteBuilder, BlteError, BlteReader, BlteResult, EncodedBlte};
pub use bpsv::{BpsvDocument, BpsvError, BpsvRow};
pub use config::{BuildConfig, CdnConfig, ConfigError};
pub use encoding::{EncodingError, EncodingTable};
pub use install::{InstallError, InstallManifest};
pub use root::{ContentFlags, LocaleFlags, RootError, RootTable, RootVariant};
