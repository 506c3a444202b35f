//! Protocol configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Patch server and CDN client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Region tag (`us`, `eu`, `kr`, `tw`, `cn`)
    pub region: String,
    /// Patch server base URL overriding the region default
    pub patch_host: Option<String>,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Whole-request timeout
    pub request_timeout: Duration,
    /// Timeout of a single host ping
    pub ping_timeout: Duration,
    /// Archive indexes fetched concurrently during bootstrap
    pub index_concurrency: usize,
    /// Hosts pinged concurrently during resolution
    pub ping_concurrency: usize,
    /// URL of the remote `name key` list
    pub tact_keys_url: String,
    /// `User-Agent` header
    pub user_agent: String,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            region: "us".to_string(),
            patch_host: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            ping_timeout: Duration::from_secs(5),
            index_concurrency: 50,
            ping_concurrency: 8,
            tact_keys_url: "https://raw.githubusercontent.com/wowdev/TACTKeys/master/WoW.txt"
                .to_string(),
            user_agent: concat!("casket/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ProtocolConfig {
    /// Create configuration for `region`
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            ..Self::default()
        }
    }

    /// Create configuration from `CASKET_*` environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let secs = |name: &str, default: Duration| {
            std::env::var(name)
                .ok()
                .and_then(|s| s.parse().ok())
                .map_or(default, Duration::from_secs)
        };

        Self {
            region: std::env::var("CASKET_REGION").unwrap_or(defaults.region),
            patch_host: std::env::var("CASKET_PATCH_HOST").ok(),
            connect_timeout: secs("CASKET_CONNECT_TIMEOUT", defaults.connect_timeout),
            request_timeout: secs("CASKET_REQUEST_TIMEOUT", defaults.request_timeout),
            tact_keys_url: std::env::var("CASKET_TACT_KEYS_URL").unwrap_or(defaults.tact_keys_url),
            ..defaults
        }
    }

    /// Set the region
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Override the patch server base URL
    #[must_use]
    pub fn with_patch_host(mut self, host: impl Into<String>) -> Self {
        self.patch_host = Some(host.into());
        self
    }

    /// Set the request timeout
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the remote key list URL
    #[must_use]
    pub fn with_tact_keys_url(mut self, url: impl Into<String>) -> Self {
        self.tact_keys_url = url.into();
        self
    }

    /// Patch server base URL, always ending in `/`
    pub fn patch_base_url(&self) -> String {
        let base = match &self.patch_host {
            Some(host) => host.clone(),
            None if self.region == "cn" => "https://cn.version.battlenet.com.cn/".to_string(),
            None => format!("https://{}.version.battle.net/", self.region),
        };
        if base.ends_with('/') { base } else { format!("{base}/") }
    }
}
