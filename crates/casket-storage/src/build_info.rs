//! `.build.info` parser for installation metadata.
//!
//! The `.build.info` file is a BPSV file at the installation root listing
//! every build present on disk. Columns read here:
//! - `Branch!STRING:0` -- branch name (e.g., "us")
//! - `Active!DEC:1` -- whether this entry is active
//! - `Build Key!HEX:16` -- build config hash
//! - `CDN Key!HEX:16` -- CDN config hash
//! - `Install Key!HEX:16` -- install manifest encoding key
//! - `Version!STRING:0` -- build version string
//! - `Product!STRING:0` -- product code (e.g., "wow", "wow_classic")

use std::path::Path;

use casket_formats::bpsv::{BpsvDocument, BpsvRow, BpsvSchema, parse};
use tracing::debug;

use crate::Result;

/// One build listed in `.build.info`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BuildInfoEntry {
    /// Product code
    pub product: String,
    /// Branch/region name
    pub branch: String,
    /// Build version string
    pub version: String,
    /// Build config key (hex)
    pub build_key: String,
    /// CDN config key (hex)
    pub cdn_key: String,
    /// Install manifest key (hex), empty when absent
    pub install_key: String,
    /// Whether the launcher marked this build active
    pub active: bool,
}

impl BuildInfoEntry {
    fn from_row(row: &BpsvRow, schema: &BpsvSchema) -> Self {
        let column = |name: &str| row.get_raw_by_name(name, schema).unwrap_or_default().to_string();
        Self {
            product: column("Product"),
            branch: column("Branch"),
            version: column("Version"),
            build_key: column("Build Key"),
            cdn_key: column("CDN Key"),
            install_key: column("Install Key"),
            active: row
                .get_raw_by_name("Active", schema)
                .is_some_and(|v| v == "1"),
        }
    }

    /// Display label, `"<title> (<BRANCH>) <version>"`
    pub fn label(&self, title: &str) -> String {
        format!("{title} ({}) {}", self.branch.to_uppercase(), self.version)
    }
}

/// Parsed `.build.info` file.
#[derive(Debug, Clone, Default)]
pub struct BuildInfo {
    entries: Vec<BuildInfoEntry>,
}

impl BuildInfo {
    /// Parse a `.build.info` file from its contents.
    pub fn parse_str(content: &str) -> Result<Self> {
        let document: BpsvDocument = parse(content)?;
        let schema = document.schema();
        let entries = document
            .rows()
            .iter()
            .map(|row| BuildInfoEntry::from_row(row, schema))
            .collect();

        Ok(Self { entries })
    }

    /// Read and parse a `.build.info` file from disk.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let info = Self::parse_str(&content)?;
        debug!(path = %path.display(), builds = info.entries.len(), "read .build.info");
        Ok(info)
    }

    /// Keep only the entries accepted by `keep`
    #[must_use]
    pub fn filtered(mut self, mut keep: impl FnMut(&BuildInfoEntry) -> bool) -> Self {
        self.entries.retain(|entry| keep(entry));
        self
    }

    /// Get all entries.
    pub fn entries(&self) -> &[BuildInfoEntry] {
        &self.entries
    }

    /// Entry at `index`
    pub fn get(&self, index: usize) -> Option<&BuildInfoEntry> {
        self.entries.get(index)
    }

    /// Get the active entry (first row with `Active` == 1).
    pub fn active_entry(&self) -> Option<&BuildInfoEntry> {
        self.entries.iter().find(|entry| entry.active)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no builds are listed
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const BUILD_INFO: &str = "Branch!STRING:0|Active!DEC:1|Build Key!HEX:16|CDN Key!HEX:16|Install Key!HEX:16|IM Size!DEC:4|Version!STRING:0|Product!STRING:0\n\
        eu|1|0123456789abcdef0123456789abcdef|fedcba9876543210fedcba9876543210|aaaabbbbccccddddeeeeffff00001111|12345|11.0.5.57689|wow\n\
        us|0|11111111111111111111111111111111|22222222222222222222222222222222||0|1.15.4.56738|wow_classic_era\n\
        us|1|33333333333333333333333333333333|44444444444444444444444444444444||0|1.0.0.1|agent\n";

    #[test]
    fn test_parse_entries() {
        let info = BuildInfo::parse_str(BUILD_INFO).expect("Parse should succeed");
        assert_eq!(info.len(), 3);

        let first = info.get(0).expect("First entry should exist");
        assert_eq!(first.product, "wow");
        assert_eq!(first.branch, "eu");
        assert_eq!(first.build_key, "0123456789abcdef0123456789abcdef");
        assert_eq!(first.install_key, "aaaabbbbccccddddeeeeffff00001111");
        assert!(first.active);
        assert!(!info.get(1).expect("Second entry should exist").active);
    }

    #[test]
    fn test_filtered_keeps_order() {
        let info = BuildInfo::parse_str(BUILD_INFO)
            .expect("Parse should succeed")
            .filtered(|entry| entry.product.starts_with("wow"));
        let products: Vec<&str> = info.entries().iter().map(|e| e.product.as_str()).collect();
        assert_eq!(products, vec!["wow", "wow_classic_era"]);
    }

    #[test]
    fn test_label() {
        let info = BuildInfo::parse_str(BUILD_INFO).expect("Parse should succeed");
        assert_eq!(
            info.get(0).expect("Entry should exist").label("Retail"),
            "Retail (EU) 11.0.5.57689"
        );
    }

    #[test]
    fn test_header_only_is_empty() {
        let info = BuildInfo::parse_str("Branch!STRING:0|Product!STRING:0\n")
            .expect("Header only should parse");
        assert!(info.is_empty());
        assert!(info.active_entry().is_none());
    }
}
