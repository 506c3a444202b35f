//! Command-line front end of the `casket` binary

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use casket_cache::{CacheConfig, CacheStore};
use casket_crypto::{ContentKey, FileDataId, Keyring};
use casket_protocol::{HttpClient, ProtocolConfig, refresh_keys};
use casket_storage::StorageConfig;
use clap::{Args, Parser, Subcommand};
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::config::{FetchOptions, SourceConfig, SourceContext};
use crate::export::{DirectorySink, export_batch};
use crate::local::LocalSource;
use crate::persist::{Flush, spawn_flush_task};
use crate::remote::RemoteSource;
use crate::source::ContentSource;

/// How often dirty keyring and cache ledger state is written
const FLUSH_INTERVAL: Duration = Duration::from_secs(2);

/// Fetch and export CASC content from a game installation or the CDN
#[derive(Debug, Parser)]
#[command(name = "casket", version, about)]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "CASKET_LOG_JSON")]
    pub log_json: bool,

    /// Cache root directory
    #[arg(long, global = true, env = "CASKET_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Keyring file; defaults to `tact.json` in the cache root
    #[arg(long, global = true, env = "CASKET_KEYRING")]
    pub keyring: Option<PathBuf>,

    /// Locale used to pick root entries
    #[arg(long, global = true, env = "CASKET_LOCALE", default_value = "enUS")]
    pub locale: String,

    /// Zero-fill encrypted blocks whose key is unknown
    #[arg(long, global = true, env = "CASKET_PARTIAL_DECRYPT")]
    pub partial_decrypt: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Where content comes from
#[derive(Debug, Clone, Args)]
pub struct SourceArgs {
    /// Game installation directory
    #[arg(long, env = "CASKET_INSTALL_DIR", conflicts_with = "remote")]
    pub install: Option<PathBuf>,

    /// Read from the CDN of this region instead of an installation
    #[arg(long, value_name = "REGION")]
    pub remote: Option<String>,

    /// Product code, e.g. `wow` or `wow_classic_era`
    #[arg(long, env = "CASKET_PRODUCT")]
    pub product: Option<String>,

    /// Index of the build to load among those found
    #[arg(long, default_value_t = 0)]
    pub build: usize,
}

/// Subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch one file
    Fetch {
        #[command(flatten)]
        source: SourceArgs,

        /// File data ID
        #[arg(long, required_unless_present = "ckey", conflicts_with = "ckey")]
        id: Option<u32>,

        /// Content key (hex)
        #[arg(long)]
        ckey: Option<String>,

        /// Output file
        #[arg(long)]
        out: PathBuf,

        /// Write blocks as they arrive instead of fetching the whole file first
        #[arg(long, requires = "id")]
        stream: bool,
    },

    /// Export every file data ID listed in a file
    Export {
        #[command(flatten)]
        source: SourceArgs,

        /// File with one file data ID per line (`id` or `id;name`)
        #[arg(long)]
        ids: PathBuf,

        /// Output directory
        #[arg(long)]
        out: PathBuf,
    },

    /// List the files of the build's install manifest
    InstallManifest {
        #[command(flatten)]
        source: SourceArgs,

        /// Only files carrying every one of these tags
        #[arg(long)]
        tag: Vec<String>,
    },

    /// Remove build caches not used within the expiry
    Sweep,

    /// Manage decryption keys
    #[command(subcommand)]
    Keys(KeysCommand),
}

/// Keyring subcommands
#[derive(Debug, Subcommand)]
pub enum KeysCommand {
    /// Merge the remote key list into the keyring
    Refresh,

    /// Add one key
    Add {
        /// Key name, 16 hex characters
        name: String,
        /// Key, 32 hex characters
        key: String,
    },
}

/// Install the global tracing subscriber
///
/// The filter comes from `RUST_LOG` and defaults to `info`.
pub fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Parse the `--ids` file: one ID per line, optionally followed by `;name`
pub fn parse_id_list(content: &str) -> Result<Vec<FileDataId>> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            let id = line.split(';').next().unwrap_or(line).trim();
            id.parse::<u32>()
                .map(FileDataId)
                .with_context(|| format!("invalid file data ID: {line}"))
        })
        .collect()
}

enum Selected {
    Local(LocalSource),
    Remote(RemoteSource),
}

impl Selected {
    fn source(&self) -> &dyn ContentSource {
        match self {
            Self::Local(source) => source,
            Self::Remote(source) => source,
        }
    }

    async fn wait_for_cache_writes(&self) {
        match self {
            Self::Local(source) => source.wait_for_cache_writes().await,
            Self::Remote(source) => source.wait_for_cache_writes().await,
        }
    }
}

struct Runtime {
    cache: CacheStore,
    keyring: Keyring,
    protocol: ProtocolConfig,
    config: SourceConfig,
}

impl Runtime {
    fn context(&self, protocol: ProtocolConfig, product: Option<&str>) -> SourceContext {
        let mut config = self.config.clone();
        if let Some(product) = product {
            config = config.with_product(product);
        }
        SourceContext::new(Arc::new(self.keyring.clone()), self.cache.clone(), protocol, config)
    }

    async fn open(&self, args: &SourceArgs) -> Result<Selected> {
        if let Some(region) = &args.remote {
            let product = args.product.as_deref().unwrap_or("wow");
            let protocol = self.protocol.clone().with_region(region);
            let mut remote = RemoteSource::new(self.context(protocol, Some(product)))?;
            remote.init_products(&[product]).await?;
            let label = remote.build_label(args.build).unwrap_or_default();
            info!(build = %label, "loading remote build");
            remote.load(args.build).await?;
            return Ok(Selected::Remote(remote));
        }

        let Some(install) = &args.install else {
            bail!("either --install or --remote is required");
        };
        let context = self.context(self.protocol.clone(), args.product.as_deref());
        let mut local = LocalSource::open(context, StorageConfig::new(install)).await?;
        let label = local.build_label(args.build).unwrap_or_default();
        info!(build = %label, "loading local build");
        local.load(args.build).await?;
        Ok(Selected::Local(local))
    }
}

async fn execute(runtime: &Runtime, command: Command) -> Result<()> {
    match command {
        Command::Fetch {
            source,
            id,
            ckey,
            out,
            stream,
        } => {
            let selected = runtime.open(&source).await?;
            let result = match (stream, id) {
                (true, Some(id)) => stream_file(selected.source(), FileDataId(id), &out).await,
                _ => fetch_file(selected.source(), id, ckey, &out).await,
            };
            selected.wait_for_cache_writes().await;
            result?;
        }
        Command::Export { source, ids, out } => {
            let ids = parse_id_list(&tokio::fs::read_to_string(&ids).await?)?;
            let selected = runtime.open(&source).await?;

            let cancel = Arc::new(AtomicBool::new(false));
            let watcher = {
                let cancel = Arc::clone(&cancel);
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        cancel.store(true, Ordering::Release);
                    }
                })
            };

            let mut sink = DirectorySink::new(&out);
            let report = export_batch(selected.source(), &ids, &mut sink, &cancel).await;
            watcher.abort();
            selected.wait_for_cache_writes().await;

            println!(
                "exported {} of {} files{}",
                report.succeeded,
                report.attempted(),
                if report.cancelled { " (cancelled)" } else { "" }
            );
            for (id, error) in &report.failed {
                println!("  {id}: {error}");
            }
        }
        Command::InstallManifest { source, tag } => {
            let selected = runtime.open(&source).await?;
            let result = print_install_manifest(selected.source(), &tag).await;
            selected.wait_for_cache_writes().await;
            result?;
        }
        Command::Sweep => {
            let report = runtime.cache.sweep()?;
            println!(
                "removed {} build caches, freed {} bytes",
                report.removed, report.bytes_freed
            );
        }
        Command::Keys(KeysCommand::Refresh) => {
            let http = HttpClient::new(&runtime.protocol)?;
            let added = refresh_keys(&http, &runtime.protocol.tact_keys_url, &runtime.keyring).await?;
            println!("added {added} keys, {} known", runtime.keyring.len());
        }
        Command::Keys(KeysCommand::Add { name, key }) => {
            if !runtime.keyring.add_key(&name, &key) {
                bail!("invalid key pair {name} {key}");
            }
        }
    }
    Ok(())
}

async fn fetch_file(
    source: &dyn ContentSource,
    id: Option<u32>,
    ckey: Option<String>,
    out: &Path,
) -> Result<()> {
    let options = FetchOptions::for_config(source.config());
    let reader = match (id, ckey) {
        (Some(id), _) => source.get_file(FileDataId(id), options).await?,
        (None, Some(ckey)) => {
            let ckey = ContentKey::from_hex(&ckey).context("invalid content key")?;
            source.get_file_by_content_key(&ckey, options).await?
        }
        (None, None) => bail!("--id or --ckey is required"),
    };
    let content = reader.into_bytes()?;
    tokio::fs::write(out, &content)
        .await
        .with_context(|| format!("unable to write {}", out.display()))?;
    info!(bytes = content.len(), out = %out.display(), "fetched file");
    Ok(())
}

async fn stream_file(source: &dyn ContentSource, id: FileDataId, out: &Path) -> Result<()> {
    let options = FetchOptions::for_config(source.config());
    let mut stream = source.get_file_stream(id, options).await?;
    let mut file = tokio::fs::File::create(out)
        .await
        .with_context(|| format!("unable to create {}", out.display()))?;

    let mut written = 0usize;
    while let Some(block) = stream.next_block().await? {
        file.write_all(&block).await?;
        written += block.len();
    }
    file.flush().await?;
    info!(bytes = written, blocks = stream.block_count(), out = %out.display(), "streamed file");
    Ok(())
}

async fn print_install_manifest(source: &dyn ContentSource, tags: &[String]) -> Result<()> {
    let manifest = source.get_install_manifest().await?;
    let tags: Vec<&str> = tags.iter().map(String::as_str).collect();
    for (index, file) in manifest.files.iter().enumerate() {
        let file_tags = manifest.tags_for_file(index);
        if tags.iter().all(|t| file_tags.contains(t)) {
            println!("{}\t{}\t{}", file.name, file.size, file_tags.join(","));
        }
    }
    Ok(())
}

/// Run a parsed command line
pub async fn run(cli: Cli) -> Result<()> {
    let mut cache_config = CacheConfig::from_env();
    if let Some(dir) = &cli.cache_dir {
        cache_config.root.clone_from(dir);
    }
    let keyring_path = cli
        .keyring
        .clone()
        .unwrap_or_else(|| cache_config.root.join("tact.json"));

    let cache = CacheStore::open(cache_config)?;
    let keyring = Keyring::load(&keyring_path)
        .with_context(|| format!("unable to load keyring {}", keyring_path.display()))?;

    let flush = spawn_flush_task(
        FLUSH_INTERVAL,
        vec![
            Arc::new(keyring.clone()) as Arc<dyn Flush>,
            Arc::clone(cache.integrity()) as Arc<dyn Flush>,
        ],
    );

    let runtime = Runtime {
        cache,
        keyring,
        protocol: ProtocolConfig::from_env(),
        config: SourceConfig::from_env()
            .with_locale(cli.locale)
            .with_partial_decrypt(cli.partial_decrypt),
    };

    let result = execute(&runtime, cli.command).await;
    flush.shutdown().await;
    result
}
