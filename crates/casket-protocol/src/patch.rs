//! Patch server bootstrap documents

use casket_formats::bpsv::{self, BpsvDocument};
use tracing::{debug, info};

use crate::config::ProtocolConfig;
use crate::error::{ProtocolError, Result};
use crate::transport::HttpClient;

/// One row of a product's `versions` document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionEntry {
    /// Product code the row was fetched for
    pub product: String,
    /// Region tag
    pub region: String,
    /// Build config key
    pub build_config: String,
    /// CDN config key
    pub cdn_config: String,
    /// Numeric build
    pub build_id: Option<u32>,
    /// Version string, e.g. `11.0.2.56461`
    pub versions_name: String,
}

/// One row of a product's `cdns` document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdnEntry {
    /// Region tag
    pub name: String,
    /// Path prefix on every host, e.g. `tpr/wow`
    pub path: String,
    /// Host names
    pub hosts: Vec<String>,
}

fn field(doc: &BpsvDocument, row: usize, name: &str) -> String {
    doc.value(row, name).unwrap_or_default().to_string()
}

/// Parse a `versions` document, stamping each row with `product`
pub fn parse_versions(product: &str, content: &str) -> Result<Vec<VersionEntry>> {
    let doc = bpsv::parse(content)?;
    Ok((0..doc.rows().len())
        .map(|row| VersionEntry {
            product: product.to_string(),
            region: field(&doc, row, "Region"),
            build_config: field(&doc, row, "BuildConfig"),
            cdn_config: field(&doc, row, "CDNConfig"),
            build_id: doc.value(row, "BuildId").and_then(|s| s.parse().ok()),
            versions_name: field(&doc, row, "VersionsName"),
        })
        .collect())
}

/// Parse a `cdns` document
pub fn parse_cdns(content: &str) -> Result<Vec<CdnEntry>> {
    let doc = bpsv::parse(content)?;
    Ok((0..doc.rows().len())
        .map(|row| CdnEntry {
            name: field(&doc, row, "Name"),
            path: field(&doc, row, "Path"),
            hosts: field(&doc, row, "Hosts")
                .split_whitespace()
                .map(String::from)
                .collect(),
        })
        .collect())
}

/// Client of the regional patch server
#[derive(Debug, Clone)]
pub struct PatchClient {
    http: HttpClient,
    base: String,
    region: String,
}

impl PatchClient {
    /// Create a client for the configured region
    pub fn new(http: HttpClient, config: &ProtocolConfig) -> Self {
        Self {
            http,
            base: config.patch_base_url(),
            region: config.region.clone(),
        }
    }

    /// Region tag
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Every `versions` row of `product`
    pub async fn versions(&self, product: &str) -> Result<Vec<VersionEntry>> {
        let url = format!("{}{product}/versions", self.base);
        parse_versions(product, &self.http.get_text(&url).await?)
    }

    /// The `versions` row of `product` for this region
    pub async fn version(&self, product: &str) -> Result<Option<VersionEntry>> {
        Ok(self
            .versions(product)
            .await?
            .into_iter()
            .find(|v| v.region == self.region))
    }

    /// The `cdns` row of `product` for this region
    pub async fn cdn(&self, product: &str) -> Result<CdnEntry> {
        let url = format!("{}{product}/cdns", self.base);
        let entries = parse_cdns(&self.http.get_text(&url).await?)?;
        debug!(product, rows = entries.len(), "loaded server config");
        entries
            .into_iter()
            .find(|e| e.name == self.region)
            .ok_or_else(|| ProtocolError::RegionNotFound(self.region.clone()))
    }

    /// This region's build of every product that answers
    ///
    /// Products whose request fails or that have no row for the region are
    /// dropped.
    pub async fn builds(&self, products: &[&str]) -> Vec<VersionEntry> {
        let results = futures::future::join_all(products.iter().map(|p| self.version(p))).await;
        let builds: Vec<VersionEntry> = results
            .into_iter()
            .zip(products)
            .filter_map(|(result, product)| match result {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(product, error = %e, "version config unavailable");
                    None
                }
            })
            .collect();
        info!(region = %self.region, count = builds.len(), "found remote builds");
        builds
    }
}
