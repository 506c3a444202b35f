//! CDN content fetches
//!
//! Every file lives at `http://{host}/{path}/{kind}/{xx}/{yy}/{key}` where
//! `path` comes from the region's `cdns` row. Configs are tried on every
//! ranked host in turn; data and index fetches use the active host.

use std::sync::Arc;

use bytes::Bytes;
use casket_crypto::EncodingKey;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::{ProtocolError, Result};
use crate::patch::CdnEntry;
use crate::resolver::HostResolver;
use crate::transport::HttpClient;

/// `xx/yy/key` path of a key on the CDN
pub fn cdn_path(key: &str) -> String {
    match (key.get(0..2), key.get(2..4)) {
        (Some(a), Some(b)) => format!("{a}/{b}/{key}"),
        _ => key.to_string(),
    }
}

/// Client of one region's CDN for one product
#[derive(Debug, Clone)]
pub struct CdnClient {
    http: HttpClient,
    resolver: HostResolver,
    region: String,
    entry: CdnEntry,
    active: Arc<RwLock<String>>,
}

impl CdnClient {
    /// Resolve the fastest host of `entry` and use it
    pub async fn connect(
        http: HttpClient,
        resolver: HostResolver,
        region: &str,
        entry: CdnEntry,
    ) -> Result<Self> {
        let host = resolver.best_host(region, &entry.hosts).await?;
        Ok(Self::with_host(http, resolver, region, entry, host))
    }

    /// Use `host` without resolving
    pub fn with_host(
        http: HttpClient,
        resolver: HostResolver,
        region: &str,
        entry: CdnEntry,
        host: String,
    ) -> Self {
        Self {
            http,
            resolver,
            region: region.to_string(),
            entry,
            active: Arc::new(RwLock::new(host)),
        }
    }

    /// Host currently used for data
    pub fn host(&self) -> String {
        self.active.read().clone()
    }

    /// Underlying transport
    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    fn url(&self, host: &str, kind: &str, file: &str) -> String {
        format!(
            "http://{host}/{}/{kind}/{}",
            self.entry.path.trim_matches('/'),
            cdn_path(file)
        )
    }

    /// URL of a data file on the active host
    pub fn data_url(&self, file: &str) -> String {
        self.url(&self.host(), "data", file)
    }

    /// Fetch a config body, trying every ranked host
    ///
    /// The first host that answers becomes the active host; hosts that fail
    /// are demoted for later resolutions.
    pub async fn fetch_config(&self, key: &str) -> Result<String> {
        let mut hosts: Vec<String> = match self.resolver.ranked_hosts(&self.region, &self.entry.hosts).await {
            Ok(ranked) => ranked.into_iter().map(|h| h.host).collect(),
            Err(e) => {
                warn!(error = %e, "host ranking unavailable, using active host only");
                Vec::new()
            }
        };
        let active = self.host();
        if !hosts.contains(&active) {
            hosts.insert(0, active.clone());
        }

        let mut last = None;
        for host in hosts {
            let url = self.url(&host, "config", key);
            match self.http.get_text(&url).await {
                Ok(body) => {
                    if host != active {
                        info!(%host, "retrieved config from fallback host");
                        *self.active.write() = host;
                    }
                    return Ok(body);
                }
                Err(e) => {
                    warn!(%url, error = %e, "failed to retrieve config");
                    self.resolver.mark_failed(&host);
                    last = Some(e);
                }
            }
        }

        Err(ProtocolError::AllHostsExhausted {
            file: format!("config {key}"),
            last: Box::new(last.unwrap_or_else(|| ProtocolError::AllHostsFailed(String::new()))),
        })
    }

    /// Fetch a whole data file
    pub async fn fetch_data(&self, key: &EncodingKey) -> Result<Bytes> {
        let url = self.data_url(&key.to_hex());
        debug!(%url, "downloading unarchived file");
        self.http.get(&url).await
    }

    /// Fetch `len` bytes at `offset` of a data file
    pub async fn fetch_data_range(&self, key: &EncodingKey, offset: u64, len: u64) -> Result<Bytes> {
        let url = self.data_url(&key.to_hex());
        self.http.get_range(&url, offset, len).await
    }

    /// Fetch `len` bytes at `offset` of an archive
    pub async fn fetch_archive_range(
        &self,
        archive: &EncodingKey,
        offset: u64,
        len: u64,
    ) -> Result<Bytes> {
        self.fetch_data_range(archive, offset, len).await
    }

    /// Fetch the `.index` of an archive
    pub async fn fetch_index(&self, archive: &EncodingKey) -> Result<Bytes> {
        let url = format!("{}.index", self.data_url(&archive.to_hex()));
        self.http.get(&url).await
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cdn_path() {
        assert_eq!(
            cdn_path("0017a402f556fbece46c38dc431a2c9b"),
            "00/17/0017a402f556fbece46c38dc431a2c9b"
        );
        assert_eq!(cdn_path("ab"), "ab");
    }
}
