use binrw::BinWrite;
use binrw::io::Cursor;
use casket_crypto::{ContentKey, EncodingKey, md5_of};

use crate::encoding::header::EncodingHeader;

/// Builds encoding tables, mostly for fixtures
#[derive(Debug, Clone)]
pub struct EncodingBuilder {
    records: Vec<(ContentKey, Vec<EncodingKey>, u64)>,
    page_size_kb: u16,
}

impl Default for EncodingBuilder {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            page_size_kb: 4,
        }
    }
}

impl EncodingBuilder {
    /// Create a builder with 4 KiB pages
    pub fn new() -> Self {
        Self::default()
    }

    /// Content key page size in KiB
    #[must_use]
    pub fn page_size_kb(mut self, kb: u16) -> Self {
        self.page_size_kb = kb.max(1);
        self
    }

    /// Add a record; the first encoding key is the one lookups return
    #[must_use]
    pub fn entry(mut self, ckey: ContentKey, ekeys: &[EncodingKey], size: u64) -> Self {
        self.records.push((ckey, ekeys.to_vec(), size));
        self
    }

    /// Serialize the table
    pub fn build(&self) -> Vec<u8> {
        let page_size = usize::from(self.page_size_kb) * 1024;

        let mut pages: Vec<Vec<u8>> = Vec::new();
        let mut current = Vec::new();
        for (ckey, ekeys, size) in &self.records {
            let mut record = vec![ekeys.len() as u8];
            record.extend_from_slice(&size.to_be_bytes()[3..]);
            record.extend_from_slice(ckey.as_bytes());
            for ekey in ekeys {
                record.extend_from_slice(ekey.as_bytes());
            }

            if current.len() + record.len() > page_size {
                pages.push(std::mem::take(&mut current));
            }
            current.extend(record);
        }
        if !current.is_empty() || pages.is_empty() {
            pages.push(current);
        }
        for page in &mut pages {
            page.resize(page_size, 0);
        }

        let espec = b"n\0";
        let header = EncodingHeader {
            magic: *b"EN",
            version: 1,
            ckey_hash_size: 16,
            ekey_hash_size: 16,
            ckey_page_size_kb: self.page_size_kb,
            ekey_page_size_kb: self.page_size_kb,
            ckey_page_count: pages.len() as u32,
            ekey_page_count: 0,
            flags: 0,
            espec_block_size: espec.len() as u32,
        };

        let mut cursor = Cursor::new(Vec::new());
        // Writing into a Vec cannot fail.
        let _ = header.write(&mut cursor);
        let mut out = cursor.into_inner();
        out.extend_from_slice(espec);

        for page in &pages {
            let first_key = page.get(6..22).unwrap_or(&[0; 16]);
            out.extend_from_slice(first_key);
            out.extend_from_slice(&md5_of(page));
        }
        for page in pages {
            out.extend(page);
        }
        out
    }
}
