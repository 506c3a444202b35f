//! CDN configuration: the archive list of a build

use std::collections::HashMap;

use casket_crypto::EncodingKey;

use super::build_config::hash_value;
use super::{ConfigError, parse_entries};

/// Parsed CDN configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CdnConfig {
    entries: HashMap<String, Vec<String>>,
    archives: Vec<EncodingKey>,
}

impl CdnConfig {
    /// Parse a CDN config body
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let entries = parse_entries(content);

        let archives = entries
            .get("archives")
            .map(|values| {
                values
                    .iter()
                    .map(|v| hash_value(Some(v), "archives").map(EncodingKey::from_bytes))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();

        if let Some(sizes) = entries.get("archives-index-size")
            && sizes.len() != archives.len()
        {
            return Err(ConfigError::LengthMismatch {
                left: "archives",
                left_len: archives.len(),
                right: "archives-index-size",
                right_len: sizes.len(),
            });
        }

        Ok(Self { entries, archives })
    }

    /// Archive keys in declaration order
    pub fn archives(&self) -> &[EncodingKey] {
        &self.archives
    }

    /// Declared index sizes, parallel to [`CdnConfig::archives`]
    pub fn archive_index_sizes(&self) -> Vec<Option<u64>> {
        self.entries.get("archives-index-size").map_or_else(
            || vec![None; self.archives.len()],
            |sizes| sizes.iter().map(|s| s.parse().ok()).collect(),
        )
    }

    /// All values of a key
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries.get(key).map(Vec::as_slice)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_cdn_config() {
        let config = CdnConfig::parse(
            "# CDN Configuration\n\n\
             archives = 0017a402f556fbece46c38dc431a2c9b 003b147730a109e3a480d32a54280955\n\
             archives-index-size = 2184 4992\n\
             archive-group = 3f8fa0d9b2e5f1b2d4b3ac53e0d6e6a5\n",
        )
        .expect("CDN config should parse");

        assert_eq!(config.archives().len(), 2);
        assert_eq!(config.archives()[1].to_hex(), "003b147730a109e3a480d32a54280955");
        assert_eq!(config.archive_index_sizes(), vec![Some(2184), Some(4992)]);
        assert!(config.get("archive-group").is_some());
    }

    #[test]
    fn test_no_archives() {
        let config = CdnConfig::parse("patch-archives =\n").expect("Empty config should parse");
        assert!(config.archives().is_empty());
    }

    #[test]
    fn test_size_count_mismatch() {
        let result = CdnConfig::parse(
            "archives = 0017a402f556fbece46c38dc431a2c9b\narchives-index-size = 1 2\n",
        );
        assert!(matches!(result, Err(ConfigError::LengthMismatch { .. })));
    }
}
