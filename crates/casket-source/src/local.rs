//! Content from a game installation, falling back to the cache and CDN

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use casket_cache::{BuildCache, CacheNamespace, ContentCache};
use casket_crypto::{EncodingKey, KeyProvider};
use casket_formats::blte::BlteReader;
use casket_formats::{BuildConfig, CdnConfig, InstallManifest};
use casket_protocol::find_product;
use casket_storage::{BuildInfo, BuildInfoEntry, LocalInstallation, StorageConfig, read_config_file};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::{FetchOptions, SourceConfig, SourceContext};
use crate::error::{Result, SourceError};
use crate::remote::RemoteSource;
use crate::source::ContentSource;
use crate::stream::{BlteStream, Origin};
use crate::tables::{self, BuildTables};
use crate::writes::CacheWrites;

/// Local storage tiers of the selected build
#[derive(Debug)]
struct LocalTiers {
    entry: BuildInfoEntry,
    installation: LocalInstallation,
    cache: BuildCache,
}

#[derive(Debug)]
struct LocalBuild {
    tiers: LocalTiers,
    build_config: BuildConfig,
    cdn_config: CdnConfig,
}

/// A build read from a local installation
///
/// Reads go to local data first. When a blob is missing or is not a BLTE
/// container, the build cache is tried, then the CDN through a remote source
/// created on first use for the same product.
#[derive(Debug)]
pub struct LocalSource {
    context: SourceContext,
    storage: StorageConfig,
    build_info: BuildInfo,
    build: Option<LocalBuild>,
    tables: Option<BuildTables>,
    remote: OnceCell<RemoteSource>,
    writes: CacheWrites,
}

impl LocalSource {
    /// Read `.build.info` of the installation at `storage`
    ///
    /// Only builds of known products are kept, narrowed to the configured
    /// product when one is set.
    pub async fn open(context: SourceContext, storage: StorageConfig) -> Result<Self> {
        let product = context.config.product.clone();
        let build_info = LocalInstallation::read_build_info(&storage)
            .await?
            .filtered(|entry| {
                find_product(&entry.product).is_some()
                    && product.as_ref().is_none_or(|p| *p == entry.product)
            });

        if build_info.is_empty() {
            return Err(SourceError::Bootstrap(format!(
                "no supported builds in {}",
                storage.install_dir().display()
            )));
        }
        info!(builds = build_info.len(), install = %storage.install_dir().display(), "found local builds");

        Ok(Self {
            context,
            storage,
            build_info,
            build: None,
            tables: None,
            remote: OnceCell::new(),
            writes: CacheWrites::default(),
        })
    }

    /// Builds listed in the installation
    pub fn builds(&self) -> &[BuildInfoEntry] {
        self.build_info.entries()
    }

    /// Display label of a build, `"<title> (<BRANCH>) <version>"`
    pub fn build_label(&self, index: usize) -> Option<String> {
        let entry = self.build_info.get(index)?;
        let title = find_product(&entry.product).map_or(entry.product.as_str(), |p| p.title);
        Some(entry.label(title))
    }

    /// Build selected by [`load`](Self::load)
    pub fn selected_build(&self) -> Option<&BuildInfoEntry> {
        self.build.as_ref().map(|b| &b.tiers.entry)
    }

    /// Build configuration of the loaded build
    pub fn build_config(&self) -> Option<&BuildConfig> {
        self.build.as_ref().map(|b| &b.build_config)
    }

    /// CDN configuration of the loaded build
    pub fn cdn_config(&self) -> Option<&CdnConfig> {
        self.build.as_ref().map(|b| &b.cdn_config)
    }

    /// Whether the CDN fallback has been brought up
    pub fn remote_initialized(&self) -> bool {
        self.remote.initialized()
    }

    /// Open the cache, configs, indexes and tables of build `index`
    pub async fn load(&mut self, index: usize) -> Result<()> {
        let entry = self
            .build_info
            .get(index)
            .cloned()
            .ok_or_else(|| SourceError::Bootstrap(format!("no local build at index {index}")))?;
        let start = Instant::now();
        info!(build = %entry.build_key, version = %entry.version, "loading local build");

        let cache = self.context.cache.build(&entry.build_key).await?;

        let build_config = BuildConfig::parse(&self.config_text(&entry, &cache, &entry.build_key).await?)?;
        let cdn_config = CdnConfig::parse(&self.config_text(&entry, &cache, &entry.cdn_key).await?)?;
        debug!(elapsed_ms = start.elapsed().as_millis() as u64, "loaded build configs");

        let installation = LocalInstallation::open(self.storage.clone()).await?;
        let tiers = LocalTiers {
            entry,
            installation,
            cache,
        };

        let encoding_key = build_config.encoding_key()?;
        let encoding = self
            .decode_table(&tiers, &encoding_key, tables::parse_encoding)
            .await?;

        let root_key = tables::root_encoding_key(&build_config, &encoding)?;
        let root = self.decode_table(&tiers, &root_key, tables::parse_root).await?;

        info!(elapsed_ms = start.elapsed().as_millis() as u64, "loaded local build");
        self.tables = Some(BuildTables::new(encoding, root));
        self.build = Some(LocalBuild {
            tiers,
            build_config,
            cdn_config,
        });
        self.context.sweep_cache().await;
        Ok(())
    }

    /// Fetch and decode a table, refetching from the CDN once if local data is corrupt
    async fn decode_table<T>(
        &self,
        tiers: &LocalTiers,
        ekey: &EncodingKey,
        parse: fn(Vec<u8>, &EncodingKey, Arc<dyn KeyProvider>) -> Result<T>,
    ) -> Result<T> {
        let options = FetchOptions::default();
        let bytes = self.fetch(tiers, ekey, options).await?;
        match parse(Vec::from(bytes), ekey, self.keys()) {
            Err(e) if e.is_corruption() => {
                warn!(key = %ekey, error = %e, "local table is corrupt, refetching");
                let bytes = self.fetch(tiers, ekey, options.forced()).await?;
                parse(Vec::from(bytes), ekey, self.keys())
            }
            result => result,
        }
    }

    async fn config_text(&self, entry: &BuildInfoEntry, cache: &BuildCache, key: &str) -> Result<String> {
        if let Some(content) = read_config_file(&self.storage, key).await? {
            return Ok(content);
        }
        info!(%key, "config not present locally, falling back to CDN");
        self.remote(entry, cache).await?.fetch_config(key).await
    }

    async fn remote(&self, entry: &BuildInfoEntry, cache: &BuildCache) -> Result<&RemoteSource> {
        self.remote
            .get_or_try_init(|| async {
                info!(product = %entry.product, region = %self.context.protocol.region, "initializing CDN fallback");
                RemoteSource::for_product(self.context.clone(), &entry.product, cache.clone()).await
            })
            .await
    }

    async fn fetch(&self, tiers: &LocalTiers, ekey: &EncodingKey, options: FetchOptions) -> Result<Bytes> {
        if !options.force_fallback {
            let failure = match tiers.installation.read_encoded(ekey).await {
                Ok(data) if BlteReader::check(&data) => return Ok(Bytes::from(data)),
                Ok(_) => SourceError::StorageUnavailable(format!("local data for {ekey} is not a BLTE container")),
                Err(e) => e.into(),
            };
            if !options.support_fallback {
                return Err(failure);
            }
            warn!(key = %ekey, error = %failure, "local data unavailable, falling back to cache");
        }

        let name = ekey.to_hex();
        if let Some(data) = tiers.cache.get(CacheNamespace::Data, &name).await {
            debug!(key = %ekey, "loaded file from cache");
            return Ok(data);
        }

        info!(key = %ekey, "file not cached, falling back to CDN");
        let data = self
            .remote(&tiers.entry, &tiers.cache)
            .await?
            .fetch_from_cdn(ekey)
            .await?;
        self.writes.store(&tiers.cache, CacheNamespace::Data, name, data.clone());
        Ok(data)
    }

    /// Wait for background cache stores to finish
    pub async fn wait_for_cache_writes(&self) {
        self.writes.wait().await;
    }
}

#[async_trait]
impl ContentSource for LocalSource {
    fn config(&self) -> &SourceConfig {
        &self.context.config
    }

    fn keys(&self) -> Arc<dyn KeyProvider> {
        Arc::clone(&self.context.keys)
    }

    fn tables(&self) -> Result<&BuildTables> {
        self.tables.as_ref().ok_or(SourceError::NotLoaded)
    }

    async fn get_encoded(&self, ekey: &EncodingKey, options: FetchOptions) -> Result<Bytes> {
        let build = self.build.as_ref().ok_or(SourceError::NotLoaded)?;
        self.fetch(&build.tiers, ekey, options).await
    }

    async fn get_install_manifest(&self) -> Result<InstallManifest> {
        let build = self.build.as_ref().ok_or(SourceError::NotLoaded)?;
        let ekey = tables::install_encoding_key(&build.build_config, self.tables()?.encoding())?;
        self.decode_table(&build.tiers, &ekey, tables::parse_install).await
    }

    async fn open_stream(&self, ekey: &EncodingKey, options: FetchOptions) -> Result<BlteStream> {
        let build = self.build.as_ref().ok_or(SourceError::NotLoaded)?;
        let tiers = &build.tiers;

        if !options.force_fallback {
            let failure = match tiers.installation.blob(ekey) {
                Ok(blob) => {
                    match BlteStream::open(Origin::Local(blob), *ekey, self.keys(), options.partial_decrypt).await {
                        Ok(stream) => return Ok(stream),
                        Err(e) => e,
                    }
                }
                Err(e) => e.into(),
            };
            if !options.support_fallback {
                return Err(failure);
            }
            warn!(key = %ekey, error = %failure, "local data unavailable, streaming from cache or CDN");
        }

        if let Some(data) = tiers.cache.get(CacheNamespace::Data, &ekey.to_hex()).await {
            debug!(key = %ekey, "streaming file from cache");
            return BlteStream::open(Origin::Memory(data), *ekey, self.keys(), options.partial_decrypt).await;
        }

        self.remote(&tiers.entry, &tiers.cache)
            .await?
            .open_cdn_stream(ekey, options)
            .await
    }
}
