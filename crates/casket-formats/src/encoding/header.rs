use binrw::{BinRead, BinWrite};

use crate::encoding::error::EncodingError;

/// Encoding table header (22 bytes, big-endian)
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
pub struct EncodingHeader {
    /// Magic bytes: 'EN'
    pub magic: [u8; 2],
    /// Version (1)
    pub version: u8,
    /// Size of content key hashes
    pub ckey_hash_size: u8,
    /// Size of encoding key hashes
    pub ekey_hash_size: u8,
    /// Content key page size in KiB
    pub ckey_page_size_kb: u16,
    /// Encoding key page size in KiB
    pub ekey_page_size_kb: u16,
    /// Number of content key pages
    pub ckey_page_count: u32,
    /// Number of encoding key pages
    pub ekey_page_count: u32,
    /// Unused byte at 0x11
    pub flags: u8,
    /// Size of the encoding spec string block
    pub espec_block_size: u32,
}

impl EncodingHeader {
    /// Encoded size of the header
    pub const SIZE: usize = 22;

    /// Check the fields the table walk depends on
    pub fn validate(&self) -> Result<(), EncodingError> {
        if self.magic != *b"EN" {
            return Err(EncodingError::InvalidMagic(self.magic));
        }

        if self.ckey_hash_size != 16 {
            return Err(EncodingError::InvalidHashSize {
                field: "ckey_hash_size",
                value: self.ckey_hash_size,
            });
        }

        if self.ekey_hash_size != 16 {
            return Err(EncodingError::InvalidHashSize {
                field: "ekey_hash_size",
                value: self.ekey_hash_size,
            });
        }

        if self.ckey_page_size_kb == 0 {
            return Err(EncodingError::InvalidPageSize(self.ckey_page_size_kb));
        }

        Ok(())
    }

    /// Content key page size in bytes
    pub fn ckey_page_size(&self) -> usize {
        usize::from(self.ckey_page_size_kb) * 1024
    }

    /// Offset of the first content key page
    pub fn ckey_pages_offset(&self) -> usize {
        Self::SIZE
            + self.espec_block_size as usize
            + self.ckey_page_count as usize * (usize::from(self.ckey_hash_size) + 16)
    }
}
