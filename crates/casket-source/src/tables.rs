//! Per-build lookup tables and the parsing steps both sources share

use std::sync::Arc;
use std::time::Instant;

use casket_crypto::{ContentKey, EncodingKey, FileDataId, KeyProvider};
use casket_formats::blte::BlteReader;
use casket_formats::root::LocaleFlags;
use casket_formats::{BuildConfig, EncodingTable, InstallManifest, RootTable};
use tracing::info;

use crate::error::{Result, SourceError};

/// Encoding and root tables of one build
#[derive(Debug, Clone)]
pub struct BuildTables {
    encoding: EncodingTable,
    root: RootTable,
}

impl BuildTables {
    /// Pair already parsed tables
    pub fn new(encoding: EncodingTable, root: RootTable) -> Self {
        Self { encoding, root }
    }

    /// Encoding table
    pub fn encoding(&self) -> &EncodingTable {
        &self.encoding
    }

    /// Root table
    pub fn root(&self) -> &RootTable {
        &self.root
    }

    /// Content key of `id` in `locale`
    pub fn content_key(&self, id: FileDataId, locale: LocaleFlags) -> Result<ContentKey> {
        Ok(self.root.select_content_key(id, locale)?)
    }

    /// Encoding key of `ckey`
    pub fn encoding_key(&self, ckey: &ContentKey) -> Result<EncodingKey> {
        self.encoding
            .lookup(ckey)
            .ok_or_else(|| SourceError::Lookup(format!("content key {ckey} not in encoding table")))
    }

    /// Encoding key of `id` in `locale`
    pub fn resolve(&self, id: FileDataId, locale: LocaleFlags) -> Result<EncodingKey> {
        let ckey = self.content_key(id, locale)?;
        self.encoding_key(&ckey)
    }
}

/// Open a container for lazy decoding
pub fn open_container(
    bytes: Vec<u8>,
    ekey: &EncodingKey,
    keys: Arc<dyn KeyProvider>,
    partial_decrypt: bool,
) -> Result<BlteReader> {
    Ok(BlteReader::new(bytes, ekey, keys)?.with_partial_decrypt(partial_decrypt))
}

/// Decode the encoding file
pub fn parse_encoding(bytes: Vec<u8>, ekey: &EncodingKey, keys: Arc<dyn KeyProvider>) -> Result<EncodingTable> {
    let start = Instant::now();
    let content = open_container(bytes, ekey, keys, false)?.into_bytes()?;
    let table = EncodingTable::parse(&content)?;
    info!(
        entries = table.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "parsed encoding table"
    );
    Ok(table)
}

/// Decode the root file
pub fn parse_root(bytes: Vec<u8>, ekey: &EncodingKey, keys: Arc<dyn KeyProvider>) -> Result<RootTable> {
    let start = Instant::now();
    let content = open_container(bytes, ekey, keys, false)?.into_bytes()?;
    let table = RootTable::parse(&content)?;
    info!(
        entries = table.entry_count(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "parsed root table"
    );
    Ok(table)
}

/// Decode an install manifest
pub fn parse_install(bytes: Vec<u8>, ekey: &EncodingKey, keys: Arc<dyn KeyProvider>) -> Result<InstallManifest> {
    let content = open_container(bytes, ekey, keys, false)?.into_bytes()?;
    Ok(InstallManifest::parse(&content)?)
}

/// Encoding key of the root file
pub fn root_encoding_key(config: &BuildConfig, encoding: &EncodingTable) -> Result<EncodingKey> {
    let ckey = config.root()?;
    encoding
        .lookup(&ckey)
        .ok_or_else(|| SourceError::Lookup(format!("root content key {ckey} not in encoding table")))
}

/// Encoding key of the install manifest
///
/// A single `install` value is a content key resolved through the encoding
/// table; otherwise the second value is the encoding key itself.
pub fn install_encoding_key(config: &BuildConfig, encoding: &EncodingTable) -> Result<EncodingKey> {
    let values = config
        .install()
        .ok_or_else(|| SourceError::Lookup("build config has no install entry".to_string()))?;

    match values {
        [ckey] => {
            let ckey = ContentKey::from_hex(ckey)
                .map_err(|e| SourceError::format("config", format!("install key {ckey}: {e}")))?;
            encoding.lookup(&ckey).ok_or_else(|| {
                SourceError::Lookup(format!("install content key {ckey} not in encoding table"))
            })
        }
        [_, ekey, ..] => EncodingKey::from_hex(ekey)
            .map_err(|e| SourceError::format("config", format!("install key {ekey}: {e}"))),
        [] => Err(SourceError::Lookup("build config has no install entry".to_string())),
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use casket_crypto::StaticKeys;
    use casket_formats::BlteBuilder;
    use casket_formats::encoding::EncodingBuilder;
    use casket_formats::root::{ContentFlags, RootBuilder, RootVariant};
    use pretty_assertions::assert_eq;

    fn ckey(n: u8) -> ContentKey {
        ContentKey::from_bytes([n; 16])
    }

    fn ekey(n: u8) -> EncodingKey {
        EncodingKey::from_bytes([n; 16])
    }

    fn keys() -> Arc<dyn KeyProvider> {
        Arc::new(StaticKeys::new())
    }

    fn tables() -> BuildTables {
        let encoding = EncodingBuilder::new()
            .entry(ckey(1), &[ekey(0x11)], 10)
            .entry(ckey(2), &[ekey(0x22)], 20)
            .build();
        let root = RootBuilder::modern(2)
            .block(
                RootVariant {
                    content_flags: ContentFlags::LOAD_ON_WINDOWS,
                    locale_flags: LocaleFlags::EN_US,
                },
                &[(FileDataId(100), ckey(1))],
            )
            .block(
                RootVariant {
                    content_flags: ContentFlags::LOAD_ON_WINDOWS,
                    locale_flags: LocaleFlags::DE_DE,
                },
                &[(FileDataId(100), ckey(2)), (FileDataId(200), ckey(9))],
            )
            .build();

        BuildTables::new(
            EncodingTable::parse(&encoding).expect("Encoding should parse"),
            RootTable::parse(&root).expect("Root should parse"),
        )
    }

    #[test]
    fn test_resolve_per_locale() {
        let tables = tables();
        assert_eq!(
            tables.resolve(FileDataId(100), LocaleFlags::EN_US).expect("Should resolve"),
            ekey(0x11)
        );
        assert_eq!(
            tables.resolve(FileDataId(100), LocaleFlags::DE_DE).expect("Should resolve"),
            ekey(0x22)
        );
    }

    #[test]
    fn test_unresolved_is_lookup_error() {
        let tables = tables();
        assert!(matches!(
            tables.resolve(FileDataId(300), LocaleFlags::EN_US),
            Err(SourceError::Lookup(_))
        ));
        // in root but not in encoding
        assert!(matches!(
            tables.resolve(FileDataId(200), LocaleFlags::DE_DE),
            Err(SourceError::Lookup(_))
        ));
    }

    #[test]
    fn test_parse_encoding_from_container() {
        let encoding = EncodingBuilder::new().entry(ckey(1), &[ekey(0x11)], 10).build();
        let container = BlteBuilder::new().zlib(&encoding).build().expect("Build should succeed");
        let table = parse_encoding(container.bytes, &container.key, keys()).expect("Should parse");
        assert_eq!(table.lookup(&ckey(1)), Some(ekey(0x11)));
    }

    #[test]
    fn test_container_hash_mismatch_is_integrity() {
        let container = BlteBuilder::new().raw(b"root").build().expect("Build should succeed");
        let result = parse_root(container.bytes, &ekey(0xEE), keys());
        assert!(matches!(result, Err(SourceError::Integrity(_))));
    }

    #[test]
    fn test_install_key_forms() {
        let encoding = EncodingTable::parse(
            &EncodingBuilder::new().entry(ckey(3), &[ekey(0x33)], 5).build(),
        )
        .expect("Encoding should parse");

        let single = BuildConfig::parse(&format!(
            "root = {}\nencoding = {} {}\ninstall = {}\n",
            ckey(1).to_hex(),
            ckey(2).to_hex(),
            ekey(2).to_hex(),
            ckey(3).to_hex()
        ))
        .expect("Config should parse");
        assert_eq!(install_encoding_key(&single, &encoding).expect("Should resolve"), ekey(0x33));

        let pair = BuildConfig::parse(&format!(
            "root = {}\nencoding = {} {}\ninstall = {} {}\n",
            ckey(1).to_hex(),
            ckey(2).to_hex(),
            ekey(2).to_hex(),
            ckey(4).to_hex(),
            ekey(0x44).to_hex()
        ))
        .expect("Config should parse");
        assert_eq!(install_encoding_key(&pair, &encoding).expect("Should resolve"), ekey(0x44));
    }
}
