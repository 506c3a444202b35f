//! Source configuration and shared process state

use std::sync::Arc;

use casket_cache::CacheStore;
use casket_crypto::KeyProvider;
use casket_formats::root::LocaleFlags;
use casket_protocol::ProtocolConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Options that apply to every file a source serves
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    /// Locale tag used to pick root variants, e.g. `enUS`
    pub locale: String,
    /// Zero-fill encrypted blocks whose key is unknown
    pub partial_decrypt: bool,
    /// Restrict local builds to this product code
    pub product: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            locale: "enUS".to_string(),
            partial_decrypt: false,
            product: None,
        }
    }
}

impl SourceConfig {
    /// Create configuration from `CASKET_LOCALE`, `CASKET_PARTIAL_DECRYPT`
    /// and `CASKET_PRODUCT`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            locale: std::env::var("CASKET_LOCALE").unwrap_or(defaults.locale),
            partial_decrypt: std::env::var("CASKET_PARTIAL_DECRYPT")
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.partial_decrypt),
            product: std::env::var("CASKET_PRODUCT").ok(),
        }
    }

    /// Set the locale tag
    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// Enable or disable partial decryption
    #[must_use]
    pub fn with_partial_decrypt(mut self, partial_decrypt: bool) -> Self {
        self.partial_decrypt = partial_decrypt;
        self
    }

    /// Restrict to one product
    #[must_use]
    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product = Some(product.into());
        self
    }

    /// Locale mask for root lookups; unknown tags select enUS
    pub fn locale_flags(&self) -> LocaleFlags {
        LocaleFlags::from_tag(&self.locale).unwrap_or_else(|| {
            warn!(locale = %self.locale, "unknown locale, using enUS");
            LocaleFlags::EN_US
        })
    }
}

/// Per-request fetch behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Zero-fill encrypted blocks whose key is unknown
    pub partial_decrypt: bool,
    /// Allow the cache and CDN tiers when local data fails
    pub support_fallback: bool,
    /// Skip local data entirely, used when it already proved corrupt
    pub force_fallback: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            partial_decrypt: false,
            support_fallback: true,
            force_fallback: false,
        }
    }
}

impl FetchOptions {
    /// Options honouring the source's partial decryption setting
    pub fn for_config(config: &SourceConfig) -> Self {
        Self {
            partial_decrypt: config.partial_decrypt,
            ..Self::default()
        }
    }

    /// Same options with local data skipped
    #[must_use]
    pub fn forced(self) -> Self {
        Self {
            force_fallback: true,
            ..self
        }
    }
}

/// Process-wide state injected into every source
///
/// Cloning is cheap; clones share the keyring and the cache ledger.
#[derive(Clone)]
pub struct SourceContext {
    /// Decryption keys
    pub keys: Arc<dyn KeyProvider>,
    /// Build cache root
    pub cache: CacheStore,
    /// Network settings
    pub protocol: ProtocolConfig,
    /// Source settings
    pub config: SourceConfig,
}

impl std::fmt::Debug for SourceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceContext")
            .field("cache", &self.cache.config().root)
            .field("region", &self.protocol.region)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SourceContext {
    /// Bundle shared state
    pub fn new(
        keys: Arc<dyn KeyProvider>,
        cache: CacheStore,
        protocol: ProtocolConfig,
        config: SourceConfig,
    ) -> Self {
        Self {
            keys,
            cache,
            protocol,
            config,
        }
    }

    /// Expire stale build caches, logging instead of failing
    ///
    /// Runs after a build loads, so the build just opened is always fresh.
    pub(crate) async fn sweep_cache(&self) {
        match self.cache.sweep_async().await {
            Ok(report) => debug!(removed = report.removed, "swept build caches"),
            Err(e) => warn!(error = %e, "build cache clean-up failed"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_locale_flags() {
        assert_eq!(SourceConfig::default().locale_flags(), LocaleFlags::EN_US);
        assert_eq!(
            SourceConfig::default().with_locale("deDE").locale_flags(),
            LocaleFlags::DE_DE
        );
        assert_eq!(
            SourceConfig::default().with_locale("xxXX").locale_flags(),
            LocaleFlags::EN_US
        );
    }

    #[test]
    fn test_fetch_options() {
        let options = FetchOptions::for_config(&SourceConfig::default().with_partial_decrypt(true));
        assert!(options.partial_decrypt);
        assert!(options.support_fallback);
        assert!(!options.force_fallback);
        assert!(options.forced().force_fallback);
    }

    #[test]
    fn test_serde_camel_case() {
        let json = serde_json::to_string(&SourceConfig::default()).expect("Serialize should succeed");
        assert!(json.contains("\"partialDecrypt\":false"));
    }
}
