//! Root table: file data ID to content key
//!
//! Two layouts exist. The modern one starts with `TSFM` and carries total and
//! named file counts; the legacy one has no header at all. Both are a run of
//! blocks, each sharing one set of locale and content flags across
//! delta-encoded identifiers and their content keys.

mod builder;
mod error;
mod flags;
mod table;

pub use builder::RootBuilder;
pub use error::{RootError, Unresolved};
pub use flags::{ContentFlags, LocaleFlags};
pub use table::{MODERN_HEADER_SIZE, ROOT_MAGIC, RootFormat, RootTable, RootVariant};

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use casket_crypto::{ContentKey, FileDataId};
    use pretty_assertions::assert_eq;

    fn ckey(n: u8) -> ContentKey {
        ContentKey::from_bytes([n; 16])
    }

    fn variant(locale: LocaleFlags, content: ContentFlags) -> RootVariant {
        RootVariant {
            content_flags: content,
            locale_flags: locale,
        }
    }

    fn locale_fixture(version: Option<u32>) -> RootTable {
        let id = FileDataId(100);
        let builder = version.map_or_else(RootBuilder::legacy, RootBuilder::modern);
        let data = builder
            .block(variant(LocaleFlags::EN_US, ContentFlags::NONE), &[(id, ckey(1))])
            .block(variant(LocaleFlags::DE_DE, ContentFlags::NONE), &[(id, ckey(2))])
            .block(
                variant(
                    LocaleFlags::EN_US | LocaleFlags::FR_FR,
                    ContentFlags::LOW_VIOLENCE,
                ),
                &[(id, ckey(3))],
            )
            .build();
        RootTable::parse(&data).expect("Root should parse")
    }

    #[test]
    fn test_locale_selection() {
        for version in [None, Some(0), Some(1), Some(2)] {
            let table = locale_fixture(version);
            let id = FileDataId(100);

            assert_eq!(table.select_content_key(id, LocaleFlags::EN_US), Ok(ckey(1)));
            assert_eq!(table.select_content_key(id, LocaleFlags::DE_DE), Ok(ckey(2)));
            assert_eq!(
                table.select_content_key(id, LocaleFlags::FR_FR),
                Err(Unresolved::NoMatchingVariant {
                    id,
                    locale: LocaleFlags::FR_FR
                })
            );
            assert_eq!(
                table.select_content_key(FileDataId(7), LocaleFlags::EN_US),
                Err(Unresolved::UnknownFileDataId(FileDataId(7)))
            );
        }
    }

    #[test]
    fn test_low_violence_never_selected_first() {
        let id = FileDataId(5);
        let data = RootBuilder::modern(1)
            .block(variant(LocaleFlags::EN_US, ContentFlags::LOW_VIOLENCE), &[(id, ckey(9))])
            .block(variant(LocaleFlags::EN_US, ContentFlags::NONE), &[(id, ckey(8))])
            .build();
        let table = RootTable::parse(&data).expect("Root should parse");
        assert_eq!(table.select_content_key(id, LocaleFlags::EN_US), Ok(ckey(8)));
    }

    #[test]
    fn test_delta_encoded_ids() {
        let records: Vec<_> = [3u32, 4, 10, 11, 500]
            .iter()
            .enumerate()
            .map(|(i, &id)| (FileDataId(id), ckey(i as u8)))
            .collect();
        let data = RootBuilder::modern(1)
            .block(variant(LocaleFlags::EN_US, ContentFlags::NONE), &records)
            .build();

        // the first delta is the identifier itself
        let first_delta = i32::from_le_bytes(data[24 + 12..24 + 16].try_into().expect("4 bytes"));
        assert_eq!(first_delta, 3);

        let table = RootTable::parse(&data).expect("Root should parse");
        assert_eq!(table.entry_count(), 5);
        assert_eq!(
            table.valid_file_ids(LocaleFlags::EN_US),
            vec![
                FileDataId(3),
                FileDataId(4),
                FileDataId(10),
                FileDataId(11),
                FileDataId(500)
            ]
        );
        assert_eq!(
            table.select_content_key(FileDataId(500), LocaleFlags::EN_US),
            Ok(ckey(4))
        );
    }

    #[test]
    fn test_name_hash_omission_is_per_block() {
        let hashed = [(FileDataId(1), ckey(1)), (FileDataId(2), ckey(2))];
        let nameless = [(FileDataId(3), ckey(3))];
        let trailing = [(FileDataId(4), ckey(4))];

        for version in [0, 1, 2] {
            let data = RootBuilder::modern(version)
                .block(variant(LocaleFlags::EN_US, ContentFlags::NONE), &hashed)
                .block(
                    variant(LocaleFlags::EN_US, ContentFlags::NO_NAME_HASH),
                    &nameless,
                )
                .block(variant(LocaleFlags::EN_US, ContentFlags::NONE), &trailing)
                .build();

            let table = RootTable::parse(&data).expect("Root should parse");
            assert_eq!(table.variants().len(), 3);
            assert_eq!(
                table.format(),
                RootFormat::Modern {
                    version,
                    total_files: 4,
                    named_files: 3
                }
            );
            assert_eq!(
                table.select_content_key(FileDataId(4), LocaleFlags::EN_US),
                Ok(ckey(4))
            );
        }
    }

    #[test]
    fn test_no_name_hash_ignored_when_counts_match() {
        // A block flagged nameless still carries hashes when every file is named
        let mut data = RootBuilder::modern(1)
            .block(
                variant(LocaleFlags::EN_US, ContentFlags::NO_NAME_HASH),
                &[(FileDataId(1), ckey(1))],
            )
            .block(
                variant(LocaleFlags::EN_US, ContentFlags::NONE),
                &[(FileDataId(2), ckey(2))],
            )
            .build();
        // force named == total so the first block must carry its hash
        data[16..20].copy_from_slice(&2u32.to_le_bytes());
        let first_block_end = 24 + 12 + 4 + 16;
        let mut patched = data[..first_block_end].to_vec();
        patched.extend_from_slice(&[0xAB; 8]);
        patched.extend_from_slice(&data[first_block_end..]);

        let table = RootTable::parse(&patched).expect("Root should parse");
        assert_eq!(table.variants().len(), 2);
        assert_eq!(
            table.select_content_key(FileDataId(2), LocaleFlags::EN_US),
            Ok(ckey(2))
        );
    }

    #[test]
    fn test_version_2_content_flags() {
        let data = RootBuilder::modern(2)
            .block(
                variant(LocaleFlags::KO_KR, ContentFlags::ENCRYPTED),
                &[(FileDataId(1), ckey(1))],
            )
            .build();
        let table = RootTable::parse(&data).expect("Root should parse");
        assert_eq!(table.variants()[0].content_flags, ContentFlags::ENCRYPTED);
        assert_eq!(table.variants()[0].locale_flags, LocaleFlags::KO_KR);
    }

    #[test]
    fn test_unknown_version() {
        let mut data = RootBuilder::modern(1).build();
        data[8..12].copy_from_slice(&7u32.to_le_bytes());
        assert!(matches!(
            RootTable::parse(&data),
            Err(RootError::UnsupportedVersion(7))
        ));
    }

    #[test]
    fn test_truncated_block() {
        let mut data = RootBuilder::modern(1)
            .block(
                variant(LocaleFlags::EN_US, ContentFlags::NONE),
                &[(FileDataId(1), ckey(1))],
            )
            .build();
        data[24..28].copy_from_slice(&1000u32.to_le_bytes());
        assert!(matches!(
            RootTable::parse(&data),
            Err(RootError::Truncated { count: 1000, .. })
        ));
    }
}
