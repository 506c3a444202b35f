//! CDN archive index (`.index`) parsing
//!
//! Content on the CDN is packed into large archives; each archive has an
//! index mapping encoding keys to a byte range inside it. The record count
//! sits in the 12-byte footer; the records start at offset 0 as
//! `{encoding key, BE32 size, BE32 offset}`.

use std::collections::HashMap;

use casket_crypto::EncodingKey;
use thiserror::Error;

/// Errors from archive index parsing
#[derive(Debug, Error)]
pub enum ArchiveIndexError {
    /// Index too small for its footer
    #[error("archive index {archive} is too small ({len} bytes)")]
    TooSmall {
        /// Archive key
        archive: EncodingKey,
        /// Index length
        len: usize,
    },

    /// Footer count cannot fit in the index
    #[error("archive index {archive}: {count} records cannot fit in {len} bytes")]
    InvalidCount {
        /// Archive key
        archive: EncodingKey,
        /// Footer count
        count: i64,
        /// Index length
        len: usize,
    },

    /// A record runs past the end of the index
    #[error("archive index {archive}: record {record} runs past the end")]
    Truncated {
        /// Archive key
        archive: EncodingKey,
        /// Record number
        record: usize,
    },
}

/// Location of an encoded blob inside a CDN archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveIndexEntry {
    /// Archive holding the blob
    pub archive: EncodingKey,
    /// Blob size
    pub size: u32,
    /// Offset inside the archive
    pub offset: u32,
}

/// Combined lookup over every archive index of a build
#[derive(Debug, Clone, Default)]
pub struct ArchiveIndex {
    entries: HashMap<EncodingKey, ArchiveIndexEntry>,
    archives: usize,
}

const RECORD_SIZE: usize = 24;
const FOOTER_SIZE: usize = 12;

impl ArchiveIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one archive's index, returning its records
    pub fn parse(
        archive: EncodingKey,
        data: &[u8],
    ) -> Result<Vec<(EncodingKey, ArchiveIndexEntry)>, ArchiveIndexError> {
        if data.len() < FOOTER_SIZE {
            return Err(ArchiveIndexError::TooSmall {
                archive,
                len: data.len(),
            });
        }

        let footer = data.len() - FOOTER_SIZE;
        let count = i32::from_le_bytes([
            data[footer],
            data[footer + 1],
            data[footer + 2],
            data[footer + 3],
        ]);
        if count < 0 || count as usize * RECORD_SIZE > data.len() {
            return Err(ArchiveIndexError::InvalidCount {
                archive,
                count: i64::from(count),
                len: data.len(),
            });
        }

        let read = |pos: usize, len: usize, record: usize| {
            data.get(pos..pos + len)
                .ok_or(ArchiveIndexError::Truncated { archive, record })
        };

        let mut records = Vec::with_capacity(count as usize);
        let mut pos = 0;
        for record in 0..count as usize {
            let mut key = read(pos, 16, record)?;
            pos += 16;
            if key.iter().all(|&b| b == 0) {
                key = read(pos, 16, record)?;
                pos += 16;
            }

            let fields = read(pos, 8, record)?;
            pos += 8;

            let mut ekey = [0u8; 16];
            ekey.copy_from_slice(key);
            records.push((
                EncodingKey::from_bytes(ekey),
                ArchiveIndexEntry {
                    archive,
                    size: u32::from_be_bytes([fields[0], fields[1], fields[2], fields[3]]),
                    offset: u32::from_be_bytes([fields[4], fields[5], fields[6], fields[7]]),
                },
            ));
        }

        Ok(records)
    }

    /// Parse an archive's index and merge it, returning the record count
    pub fn add_index(&mut self, archive: EncodingKey, data: &[u8]) -> Result<usize, ArchiveIndexError> {
        let records = Self::parse(archive, data)?;
        let count = records.len();
        self.extend(records);
        self.archives += 1;
        Ok(count)
    }

    /// Merge already parsed records
    pub fn extend(&mut self, records: impl IntoIterator<Item = (EncodingKey, ArchiveIndexEntry)>) {
        self.entries.extend(records);
    }

    /// Location of an encoding key, if it is archived
    pub fn lookup(&self, ekey: &EncodingKey) -> Option<&ArchiveIndexEntry> {
        self.entries.get(ekey)
    }

    /// Number of archived blobs
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no blob is archived
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of archive indexes merged with [`add_index`](Self::add_index)
    pub fn archive_count(&self) -> usize {
        self.archives
    }
}

/// Serialize records as an archive index, for fixtures
pub fn build_archive_index(records: &[(EncodingKey, u32, u32)]) -> Vec<u8> {
    let mut out = Vec::with_capacity((records.len() + 1) * RECORD_SIZE);
    for (ekey, size, offset) in records {
        out.extend_from_slice(ekey.as_bytes());
        out.extend_from_slice(&size.to_be_bytes());
        out.extend_from_slice(&offset.to_be_bytes());
    }
    // footer: count, then 8 bytes of checksum we never read
    out.extend_from_slice(&(records.len() as i32).to_le_bytes());
    out.extend_from_slice(&[0; 8]);
    out
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn key(n: u8) -> EncodingKey {
        EncodingKey::from_bytes([n; 16])
    }

    #[test]
    fn test_parse_records() {
        let data = build_archive_index(&[(key(1), 100, 0), (key(2), 50, 100)]);
        let mut index = ArchiveIndex::new();
        let count = index.add_index(key(0xAA), &data).expect("Index should parse");

        assert_eq!(count, 2);
        assert_eq!(index.archive_count(), 1);
        assert_eq!(
            index.lookup(&key(2)),
            Some(&ArchiveIndexEntry {
                archive: key(0xAA),
                size: 50,
                offset: 100
            })
        );
        assert!(index.lookup(&key(3)).is_none());
    }

    #[test]
    fn test_zero_hash_is_skipped() {
        let mut data = Vec::new();
        data.extend_from_slice(&[0; 16]);
        data.extend_from_slice(key(7).as_bytes());
        data.extend_from_slice(&9u32.to_be_bytes());
        data.extend_from_slice(&4096u32.to_be_bytes());
        data.extend_from_slice(&1i32.to_le_bytes());
        data.extend_from_slice(&[0; 8]);

        let records = ArchiveIndex::parse(key(1), &data).expect("Index should parse");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, key(7));
        assert_eq!(records[0].1.offset, 4096);
    }

    #[test]
    fn test_count_too_large() {
        let mut data = build_archive_index(&[(key(1), 1, 1)]);
        let footer = data.len() - 12;
        data[footer..footer + 4].copy_from_slice(&100i32.to_le_bytes());
        assert!(matches!(
            ArchiveIndex::parse(key(1), &data),
            Err(ArchiveIndexError::InvalidCount { count: 100, .. })
        ));
    }

    #[test]
    fn test_too_small() {
        assert!(matches!(
            ArchiveIndex::parse(key(1), &[0; 4]),
            Err(ArchiveIndexError::TooSmall { .. })
        ));
    }
}
