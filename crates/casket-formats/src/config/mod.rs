//! Build and CDN configuration files
//!
//! Both are `key = value` text where a value is a space-separated list.
//! Blank lines and `#` comments are ignored.

mod build_config;
mod cdn_config;

pub use build_config::BuildConfig;
pub use cdn_config::CdnConfig;

use std::collections::HashMap;

use thiserror::Error;

/// Errors from config parsing
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required key is absent
    #[error("config is missing required key '{0}'")]
    MissingKey(&'static str),

    /// A hash value is not 32 hex characters
    #[error("invalid hash '{value}' for key '{key}'")]
    InvalidHash {
        /// Config key
        key: String,
        /// Offending value
        value: String,
    },

    /// Two list-valued keys that must pair up have different lengths
    #[error("'{left}' has {left_len} values but '{right}' has {right_len}")]
    LengthMismatch {
        /// First key
        left: &'static str,
        /// Its value count
        left_len: usize,
        /// Second key
        right: &'static str,
        /// Its value count
        right_len: usize,
    },
}

/// Split one `key = value` line
pub(crate) fn parse_line(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(" = ").or_else(|| {
        // empty values are written as `key =`
        line.strip_suffix(" =").map(|key| (key, ""))
    })?;
    let key = key.trim();
    is_valid_key(key).then_some((key, value.trim()))
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
}

pub(crate) fn is_valid_md5_hex(hash: &str) -> bool {
    hash.len() == 32 && hash.chars().all(|c| c.is_ascii_hexdigit())
}

/// Parse every entry of a config body
pub(crate) fn parse_entries(content: &str) -> HashMap<String, Vec<String>> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(parse_line)
        .map(|(key, value)| {
            (
                key.to_string(),
                value.split_whitespace().map(String::from).collect(),
            )
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("root = abc"), Some(("root", "abc")));
        assert_eq!(parse_line("patch-index ="), Some(("patch-index", "")));
        assert_eq!(parse_line("not a pair"), None);
        assert_eq!(parse_line("bad key! = x"), None);
    }

    #[test]
    fn test_parse_entries_skips_comments() {
        let entries = parse_entries("# Build Configuration\n\nroot = aa bb\n");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries["root"], vec!["aa", "bb"]);
    }
}
