//! Build configuration: entry points of one build

use std::collections::HashMap;

use casket_crypto::{ContentKey, EncodingKey};

use super::{ConfigError, is_valid_md5_hex, parse_entries};

/// Parsed build configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildConfig {
    entries: HashMap<String, Vec<String>>,
}

impl BuildConfig {
    /// Parse a build config body
    ///
    /// Only `root` and `encoding` are required; everything else is optional
    /// and exposed through [`BuildConfig::get`].
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config = Self {
            entries: parse_entries(content),
        };
        config.root()?;
        config.encoding_key()?;
        Ok(config)
    }

    /// All values of a key
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// First value of a key
    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.first()).map(String::as_str)
    }

    /// Content key of the root file
    pub fn root(&self) -> Result<ContentKey, ConfigError> {
        hash_value(self.first("root"), "root").map(ContentKey::from_bytes)
    }

    /// Encoding key of the encoding file (second value of `encoding`)
    pub fn encoding_key(&self) -> Result<EncodingKey, ConfigError> {
        let value = self.get("encoding").and_then(|v| v.get(1)).map(String::as_str);
        hash_value(value, "encoding").map(EncodingKey::from_bytes)
    }

    /// Content key of the encoding file (first value of `encoding`)
    pub fn encoding_content_key(&self) -> Result<ContentKey, ConfigError> {
        hash_value(self.first("encoding"), "encoding").map(ContentKey::from_bytes)
    }

    /// Raw `install` values: content key, optionally followed by encoding key
    pub fn install(&self) -> Option<&[String]> {
        self.get("install").filter(|v| !v.is_empty())
    }

    /// Human-readable build name
    pub fn build_name(&self) -> Option<&str> {
        self.first("build-name")
    }
}

pub(super) fn hash_value(value: Option<&str>, key: &'static str) -> Result<[u8; 16], ConfigError> {
    let value = value.ok_or(ConfigError::MissingKey(key))?;
    if !is_valid_md5_hex(value) {
        return Err(ConfigError::InvalidHash {
            key: key.to_string(),
            value: value.to_string(),
        });
    }
    let mut bytes = [0u8; 16];
    hex::decode_to_slice(value, &mut bytes).map_err(|_| ConfigError::InvalidHash {
        key: key.to_string(),
        value: value.to_string(),
    })?;
    Ok(bytes)
}
