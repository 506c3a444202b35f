use std::collections::HashMap;

use binrw::BinRead;
use binrw::io::Cursor;
use casket_crypto::{ContentKey, EncodingKey};
use tracing::debug;

use crate::encoding::error::EncodingError;
use crate::encoding::header::EncodingHeader;

/// Encoding side of a content key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingEntry {
    /// First encoding key listed for the content
    pub encoding_key: EncodingKey,
    /// Declared decoded size
    pub size: u64,
}

/// Content key to encoding key table
///
/// Only the first encoding key of each record is kept. Further keys describe
/// alternative encodings of the same content and are never needed for reads.
#[derive(Debug, Clone, Default)]
pub struct EncodingTable {
    entries: HashMap<ContentKey, EncodingEntry>,
}

fn read_u40_be(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .take(5)
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

impl EncodingTable {
    /// Parse a decoded encoding table
    pub fn parse(data: &[u8]) -> Result<Self, EncodingError> {
        let header = EncodingHeader::read(&mut Cursor::new(data))?;
        header.validate()?;

        let page_size = header.ckey_page_size();
        let pages_offset = header.ckey_pages_offset();
        let ckey_size = usize::from(header.ckey_hash_size);
        let ekey_size = usize::from(header.ekey_hash_size);
        let record_size = 1 + 5 + ckey_size + ekey_size;

        let mut entries = HashMap::new();
        for page in 0..header.ckey_page_count as usize {
            let page_start = pages_offset + page_size * page;
            if page_start >= data.len() {
                return Err(EncodingError::Truncated {
                    offset: page_start,
                    len: data.len(),
                });
            }
            let page_end = (page_start + page_size).min(data.len());

            let mut pos = page_start;
            while pos < page_end {
                let keys_count = usize::from(data[pos]);
                if keys_count == 0 {
                    break;
                }

                let record = data
                    .get(pos..pos + record_size)
                    .ok_or(EncodingError::Truncated {
                        offset: pos,
                        len: data.len(),
                    })?;

                let size = read_u40_be(&record[1..6]);
                let mut ckey = [0u8; 16];
                ckey.copy_from_slice(&record[6..6 + ckey_size]);
                let mut ekey = [0u8; 16];
                ekey.copy_from_slice(&record[6 + ckey_size..]);

                entries.insert(
                    ContentKey::from_bytes(ckey),
                    EncodingEntry {
                        encoding_key: EncodingKey::from_bytes(ekey),
                        size,
                    },
                );

                pos += record_size + ekey_size * (keys_count - 1);
            }
        }

        debug!(entries = entries.len(), pages = header.ckey_page_count, "parsed encoding table");
        Ok(Self { entries })
    }

    /// Encoding key for a content key
    pub fn lookup(&self, ckey: &ContentKey) -> Option<EncodingKey> {
        self.entries.get(ckey).map(|e| e.encoding_key)
    }

    /// Declared decoded size for a content key
    pub fn declared_size(&self, ckey: &ContentKey) -> Option<u64> {
        self.entries.get(ckey).map(|e| e.size)
    }

    /// Full entry for a content key
    pub fn entry(&self, ckey: &ContentKey) -> Option<&EncodingEntry> {
        self.entries.get(ckey)
    }

    /// Number of content keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
