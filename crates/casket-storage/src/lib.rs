//! Local CASC installation access
//!
//! A game installation keeps its content in `Data/data/data.NNN` archives,
//! located through the `.idx` journals next to them, and its configs under
//! `Data/config`. `.build.info` at the installation root lists the builds
//! present.
//!
//! Only reads are supported.

#![warn(missing_docs)]

mod build_info;
mod config;
mod error;
mod index;
mod installation;

pub use build_info::{BuildInfo, BuildInfoEntry};
pub use config::StorageConfig;
pub use error::{Result, StorageError};
pub use index::{LocalIndex, LocalLocation, build_index_file};
pub use installation::{LOCAL_HEADER_SIZE, LocalBlob, LocalInstallation, read_config_file};
