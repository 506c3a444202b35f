//! Network side of a CASC content source
//!
//! - [`PatchClient`] bootstraps a build from the patch server's `versions`
//!   and `cdns` documents.
//! - [`HostResolver`] pings the CDN hosts a `cdns` row lists and ranks them
//!   by latency, sharing one resolution between concurrent callers.
//! - [`CdnClient`] fetches configs, archive indexes and data blobs, whole or
//!   by byte range, from the ranked hosts.
//! - [`refresh_keys`] merges the remote TACT key list into a keyring.
//!
//! All requests go through [`HttpClient`], which applies the connect and
//! request timeouts from [`ProtocolConfig`].

#![warn(missing_docs)]

mod cdn;
mod config;
mod error;
mod keys;
mod patch;
mod products;
mod resolver;
mod transport;

pub use cdn::{CdnClient, cdn_path};
pub use config::ProtocolConfig;
pub use error::{ProtocolError, Result};
pub use keys::refresh_keys;
pub use patch::{CdnEntry, PatchClient, VersionEntry};
pub use products::{PRODUCTS, Product, find_product};
pub use resolver::{HostResolver, RankedHost};
pub use transport::HttpClient;
