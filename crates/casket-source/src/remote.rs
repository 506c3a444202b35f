//! Content straight from the CDN

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use casket_cache::{BuildCache, CacheNamespace, ContentCache};
use casket_crypto::{EncodingKey, KeyProvider};
use casket_formats::blte;
use casket_formats::{ArchiveIndex, BuildConfig, CdnConfig, InstallManifest};
use casket_protocol::{
    CdnClient, HostResolver, HttpClient, PRODUCTS, PatchClient, VersionEntry, find_product,
};
use futures::{StreamExt, TryStreamExt, stream};
use tracing::{debug, info, warn};

use crate::config::{FetchOptions, SourceConfig, SourceContext};
use crate::error::{Result, SourceError};
use crate::source::ContentSource;
use crate::stream::{BlteStream, Origin};
use crate::tables::{self, BuildTables};
use crate::writes::CacheWrites;

/// Everything fetched by [`RemoteSource::preload`]
#[derive(Debug)]
struct RemoteBuild {
    entry: VersionEntry,
    cdn: CdnClient,
    build_config: BuildConfig,
    cdn_config: CdnConfig,
    archives: ArchiveIndex,
    cache: BuildCache,
}

/// A build served from the CDN through the build cache
#[derive(Debug)]
pub struct RemoteSource {
    context: SourceContext,
    http: HttpClient,
    patch: PatchClient,
    resolver: HostResolver,
    builds: Vec<VersionEntry>,
    build: Option<RemoteBuild>,
    tables: Option<BuildTables>,
    writes: CacheWrites,
}

impl RemoteSource {
    /// Create a source for the region in `context`
    pub fn new(context: SourceContext) -> Result<Self> {
        let http = HttpClient::new(&context.protocol)?;
        let patch = PatchClient::new(http.clone(), &context.protocol);
        let resolver = HostResolver::new(http.clone(), context.protocol.ping_concurrency);
        Ok(Self {
            context,
            http,
            patch,
            resolver,
            builds: Vec::new(),
            build: None,
            tables: None,
            writes: CacheWrites::default(),
        })
    }

    /// Connect to the remote build of `product` sharing the local build's cache
    ///
    /// The build is preloaded (configs and archive indexes) but its tables
    /// are not read.
    pub async fn for_product(context: SourceContext, product: &str, cache: BuildCache) -> Result<Self> {
        let mut remote = Self::new(context)?;
        remote.init_products(&[product]).await?;
        let index = remote
            .builds
            .iter()
            .position(|b| b.product == product)
            .ok_or_else(|| SourceError::Bootstrap(format!("no remote build of {product}")))?;
        remote.preload(index, Some(cache)).await?;
        Ok(remote)
    }

    /// Fetch this region's build of every known product
    pub async fn init(&mut self) -> Result<&[VersionEntry]> {
        let codes: Vec<&str> = PRODUCTS.iter().map(|p| p.code).collect();
        self.init_products(&codes).await
    }

    /// Fetch this region's build of each product in `products`
    pub async fn init_products(&mut self, products: &[&str]) -> Result<&[VersionEntry]> {
        let builds = self.patch.builds(products).await;
        if builds.is_empty() {
            return Err(SourceError::Bootstrap(format!(
                "no builds available in region {}",
                self.patch.region()
            )));
        }
        self.builds = builds;
        Ok(&self.builds)
    }

    /// Builds found by [`init`](Self::init)
    pub fn builds(&self) -> &[VersionEntry] {
        &self.builds
    }

    /// Display label of a build, `"<title> <version>"`
    pub fn build_label(&self, index: usize) -> Option<String> {
        let entry = self.builds.get(index)?;
        let title = find_product(&entry.product).map_or(entry.product.as_str(), |p| p.title);
        Some(format!("{title} {}", entry.versions_name))
    }

    /// Build selected by [`preload`](Self::preload)
    pub fn selected_build(&self) -> Option<&VersionEntry> {
        self.build.as_ref().map(|b| &b.entry)
    }

    /// Build configuration of the preloaded build
    pub fn build_config(&self) -> Option<&BuildConfig> {
        self.build.as_ref().map(|b| &b.build_config)
    }

    /// CDN configuration of the preloaded build
    pub fn cdn_config(&self) -> Option<&CdnConfig> {
        self.build.as_ref().map(|b| &b.cdn_config)
    }

    /// CDN client of the preloaded build
    pub fn cdn(&self) -> Option<&CdnClient> {
        self.build.as_ref().map(|b| &b.cdn)
    }

    /// Resolve hosts, read configs and archive indexes of build `index`
    ///
    /// `cache` replaces the build's own cache, letting a local source share
    /// its cache with the remote it falls back to.
    pub async fn preload(&mut self, index: usize, cache: Option<BuildCache>) -> Result<()> {
        let entry = self
            .builds
            .get(index)
            .cloned()
            .ok_or_else(|| SourceError::Bootstrap(format!("no remote build at index {index}")))?;
        let start = Instant::now();

        let cdn_entry = self.patch.cdn(&entry.product).await?;
        let cdn = CdnClient::connect(
            self.http.clone(),
            self.resolver.clone(),
            self.patch.region(),
            cdn_entry,
        )
        .await?;
        info!(host = %cdn.host(), product = %entry.product, "selected CDN host");

        let cdn_config = CdnConfig::parse(&cdn.fetch_config(&entry.cdn_config).await?)?;
        let build_config = BuildConfig::parse(&cdn.fetch_config(&entry.build_config).await?)?;

        let cache = match cache {
            Some(cache) => cache,
            None => self.context.cache.build(&entry.build_config).await?,
        };

        let archives = self.load_archive_indexes(&cdn, &cache, cdn_config.archives()).await?;
        info!(
            archives = cdn_config.archives().len(),
            entries = archives.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "preloaded remote build"
        );

        self.build = Some(RemoteBuild {
            entry,
            cdn,
            build_config,
            cdn_config,
            archives,
            cache,
        });
        Ok(())
    }

    async fn load_archive_indexes(
        &self,
        cdn: &CdnClient,
        cache: &BuildCache,
        archives: &[EncodingKey],
    ) -> Result<ArchiveIndex> {
        let parsed: Vec<_> = stream::iter(archives.iter().copied())
            .map(|archive| async move {
                let name = format!("{}.index", archive.to_hex());
                let data = match cache.get(CacheNamespace::Indices, &name).await {
                    Some(data) => data,
                    None => {
                        let data = cdn.fetch_index(&archive).await?;
                        if let Err(e) = cache.put(CacheNamespace::Indices, &name, data.clone()).await {
                            warn!(archive = %archive, error = %e, "unable to cache archive index");
                        }
                        data
                    }
                };
                Ok::<_, SourceError>((archive, ArchiveIndex::parse(archive, &data)?))
            })
            .buffer_unordered(self.context.protocol.index_concurrency.max(1))
            .try_collect()
            .await?;

        let mut index = ArchiveIndex::new();
        for (archive, records) in parsed {
            debug!(%archive, records = records.len(), "loaded archive index");
            index.extend(records);
        }
        Ok(index)
    }

    /// Preload build `index` and read its encoding and root tables
    pub async fn load(&mut self, index: usize) -> Result<()> {
        self.preload(index, None).await?;
        let build = self.build.as_ref().ok_or(SourceError::NotLoaded)?;

        let encoding_key = build.build_config.encoding_key()?;
        let bytes = self.build_file(build, "encoding", &encoding_key).await?;
        let encoding = tables::parse_encoding(Vec::from(bytes), &encoding_key, self.keys())?;

        let root_key = tables::root_encoding_key(&build.build_config, &encoding)?;
        let bytes = self.build_file(build, "root", &root_key).await?;
        let root = tables::parse_root(Vec::from(bytes), &root_key, self.keys())?;

        self.tables = Some(BuildTables::new(encoding, root));
        self.context.sweep_cache().await;
        Ok(())
    }

    /// A per-build file, from the build cache or the CDN
    async fn build_file(&self, build: &RemoteBuild, name: &str, ekey: &EncodingKey) -> Result<Bytes> {
        if let Some(data) = build.cache.get(CacheNamespace::Build, name).await {
            debug!(file = name, "loaded build file from cache");
            return Ok(data);
        }

        let data = self.fetch_from(build, ekey).await?;
        build.cache.put(CacheNamespace::Build, name, data.clone()).await?;
        Ok(data)
    }

    /// Fetch `ekey` from the CDN and check its header and block hashes
    ///
    /// Nothing that fails the check is returned, so nothing bad is cached.
    async fn fetch_from(&self, build: &RemoteBuild, ekey: &EncodingKey) -> Result<Bytes> {
        let data = match build.archives.lookup(ekey) {
            Some(entry) => {
                debug!(key = %ekey, archive = %entry.archive, offset = entry.offset, "fetching archived file");
                build
                    .cdn
                    .fetch_archive_range(&entry.archive, u64::from(entry.offset), u64::from(entry.size))
                    .await?
            }
            None => build.cdn.fetch_data(ekey).await?,
        };

        if let Err(e) = blte::verify(&data, ekey) {
            warn!(key = %ekey, error = %e, "CDN returned damaged data");
            return Err(e.into());
        }
        Ok(data)
    }

    /// Fetch `ekey` from the CDN, bypassing the cache
    pub async fn fetch_from_cdn(&self, ekey: &EncodingKey) -> Result<Bytes> {
        let build = self.build.as_ref().ok_or(SourceError::NotLoaded)?;
        self.fetch_from(build, ekey).await
    }

    /// Stream `ekey` from the CDN: its archive range when archived, the
    /// loose data file otherwise
    pub(crate) async fn open_cdn_stream(&self, ekey: &EncodingKey, options: FetchOptions) -> Result<BlteStream> {
        let build = self.build.as_ref().ok_or(SourceError::NotLoaded)?;
        let origin = match build.archives.lookup(ekey) {
            Some(entry) => Origin::Cdn {
                cdn: build.cdn.clone(),
                file: entry.archive,
                base: u64::from(entry.offset),
                size: Some(u64::from(entry.size)),
            },
            None => Origin::Cdn {
                cdn: build.cdn.clone(),
                file: *ekey,
                base: 0,
                size: None,
            },
        };
        BlteStream::open(origin, *ekey, self.keys(), options.partial_decrypt).await
    }

    /// Fetch a config body from the CDN
    pub async fn fetch_config(&self, key: &str) -> Result<String> {
        let build = self.build.as_ref().ok_or(SourceError::NotLoaded)?;
        Ok(build.cdn.fetch_config(key).await?)
    }

    /// Wait for background cache stores to finish
    pub async fn wait_for_cache_writes(&self) {
        self.writes.wait().await;
    }
}

#[async_trait]
impl ContentSource for RemoteSource {
    fn config(&self) -> &SourceConfig {
        &self.context.config
    }

    fn keys(&self) -> Arc<dyn KeyProvider> {
        Arc::clone(&self.context.keys)
    }

    fn tables(&self) -> Result<&BuildTables> {
        self.tables.as_ref().ok_or(SourceError::NotLoaded)
    }

    async fn get_encoded(&self, ekey: &EncodingKey, _options: FetchOptions) -> Result<Bytes> {
        let build = self.build.as_ref().ok_or(SourceError::NotLoaded)?;
        let name = ekey.to_hex();
        if let Some(data) = build.cache.get(CacheNamespace::Data, &name).await {
            debug!(key = %ekey, "loaded file from cache");
            return Ok(data);
        }

        let data = self.fetch_from(build, ekey).await?;
        self.writes.store(&build.cache, CacheNamespace::Data, name, data.clone());
        Ok(data)
    }

    async fn get_install_manifest(&self) -> Result<InstallManifest> {
        let build = self.build.as_ref().ok_or(SourceError::NotLoaded)?;
        let ekey = tables::install_encoding_key(&build.build_config, self.tables()?.encoding())?;
        let data = self.get_encoded(&ekey, FetchOptions::default()).await?;
        tables::parse_install(Vec::from(data), &ekey, self.keys())
    }

    async fn open_stream(&self, ekey: &EncodingKey, options: FetchOptions) -> Result<BlteStream> {
        let build = self.build.as_ref().ok_or(SourceError::NotLoaded)?;
        if let Some(data) = build.cache.get(CacheNamespace::Data, &ekey.to_hex()).await {
            debug!(key = %ekey, "streaming file from cache");
            return BlteStream::open(Origin::Memory(data), *ekey, self.keys(), options.partial_decrypt).await;
        }
        self.open_cdn_stream(ekey, options).await
    }
}
