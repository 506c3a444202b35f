//! Disk cache for content fetched from a CASC source
//!
//! The cache root holds one directory per build, a shared data directory for
//! decoded-as-fetched CDN blobs and a directory of CDN archive indexes:
//!
//! ```text
//! <root>/builds/<build key>/manifest.json   { "lastAccess": <ms> }
//! <root>/builds/<build key>/encoding
//! <root>/builds/<build key>/root
//! <root>/data/<encoding key>
//! <root>/indices/<archive key>.index
//! <root>/cacheintegrity                     { "<path>": "<sha256>" }
//! ```
//!
//! Every stored file is recorded in the process-wide [`IntegrityManifest`].
//! A read whose digest is unknown or does not match is treated as a miss,
//! so a corrupted or foreign file is never returned.

#![warn(missing_docs)]

mod build;
mod config;
mod error;
mod integrity;
mod store;
mod traits;

pub use build::{BuildCache, BuildManifest};
pub use config::CacheConfig;
pub use error::{CacheError, CacheResult};
pub use integrity::IntegrityManifest;
pub use store::{CacheStore, SweepReport};
pub use traits::{CacheNamespace, ContentCache};
