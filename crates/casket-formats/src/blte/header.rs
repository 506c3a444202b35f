//! BLTE header and block table

use binrw::BinRead;
use binrw::io::Cursor;
use casket_crypto::{EncodingKey, md5_of};

use super::error::{BlteError, BlteResult};

/// BLTE magic bytes
pub const BLTE_MAGIC: [u8; 4] = *b"BLTE";

/// Flag byte of the only block table layout in use
pub const TABLE_FLAGS: u8 = 0x0F;

/// Size of one block table record
pub const BLOCK_INFO_SIZE: u64 = 24;

/// One entry of the block table
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead)]
#[br(big)]
pub struct BlockInfo {
    /// Encoded size, including the mode byte
    pub compressed_size: u32,
    /// Declared decoded size
    pub decompressed_size: u32,
    /// MD5 of the encoded bytes; all zero means unchecked
    pub hash: [u8; 16],
}

impl BlockInfo {
    /// Whether the block carries the all-zero sentinel hash
    pub fn is_unchecked(&self) -> bool {
        self.hash == [0; 16]
    }
}

/// Parsed BLTE header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlteHeader {
    /// Header size field; 0 for a headerless single block
    pub header_size: u32,
    /// Block table, one entry per block in stream order
    pub blocks: Vec<BlockInfo>,
}

impl BlteHeader {
    /// Parse and verify the header of `data` against its encoding key
    ///
    /// A headerless container is verified by the hash of all of `data`; a
    /// container with a block table by the hash of its first `header_size`
    /// bytes.
    pub fn parse(data: &[u8], expected: &EncodingKey) -> BlteResult<Self> {
        if data.len() < 8 {
            return Err(BlteError::Truncated {
                needed: 8,
                available: data.len(),
            });
        }

        let magic = [data[0], data[1], data[2], data[3]];
        if magic != BLTE_MAGIC {
            return Err(BlteError::InvalidMagic(magic));
        }

        let header_size = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let hashed = if header_size == 0 {
            data
        } else {
            data.get(..header_size as usize)
                .ok_or(BlteError::Truncated {
                    needed: header_size as usize,
                    available: data.len(),
                })?
        };

        let actual = md5_of(hashed);
        if &actual != expected.as_bytes() {
            return Err(BlteError::HeaderHashMismatch {
                expected: expected.to_hex(),
                actual: hex::encode(actual),
            });
        }

        if header_size == 0 {
            return Ok(Self {
                header_size,
                blocks: vec![Self::implicit_block(data.len())],
            });
        }

        if data.len() < 12 {
            return Err(BlteError::Truncated {
                needed: 12,
                available: data.len(),
            });
        }

        let flags = data[8];
        let count = u32::from_be_bytes([0, data[9], data[10], data[11]]);
        if flags != TABLE_FLAGS || count == 0 {
            return Err(BlteError::InvalidTable { flags, count });
        }

        let expected_size = BLOCK_INFO_SIZE * u64::from(count) + 12;
        if u64::from(header_size) != expected_size {
            return Err(BlteError::InvalidHeaderSize {
                header_size,
                expected: expected_size,
            });
        }

        let mut cursor = Cursor::new(&data[12..header_size as usize]);
        let blocks = (0..count)
            .map(|_| BlockInfo::read(&mut cursor))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            header_size,
            blocks,
        })
    }

    /// Bytes needed to parse the header, read from the start of a container
    ///
    /// `None` means headerless: only the whole container can be verified.
    pub fn required_len(prefix: &[u8]) -> BlteResult<Option<usize>> {
        let Some(start) = prefix.get(..8) else {
            return Err(BlteError::Truncated {
                needed: 8,
                available: prefix.len(),
            });
        };
        let magic = [start[0], start[1], start[2], start[3]];
        if magic != BLTE_MAGIC {
            return Err(BlteError::InvalidMagic(magic));
        }
        match u32::from_be_bytes([start[4], start[5], start[6], start[7]]) {
            0 => Ok(None),
            size => Ok(Some(size as usize)),
        }
    }

    /// Offset of every block's bytes from the start of the container
    pub fn block_offsets(&self) -> impl Iterator<Item = usize> + '_ {
        self.blocks.iter().scan(self.data_offset(), |offset, block| {
            let start = *offset;
            *offset += block.compressed_size as usize;
            Some(start)
        })
    }

    /// Total encoded size: header plus every block
    pub fn encoded_size(&self) -> u64 {
        self.data_offset() as u64
            + self
                .blocks
                .iter()
                .map(|b| u64::from(b.compressed_size))
                .sum::<u64>()
    }

    // The implicit block declares one byte less than it holds: the mode byte.
    fn implicit_block(total: usize) -> BlockInfo {
        let compressed = total.saturating_sub(8) as u32;
        BlockInfo {
            compressed_size: compressed,
            decompressed_size: compressed.saturating_sub(1),
            hash: [0; 16],
        }
    }

    /// Offset of the first block's bytes
    pub fn data_offset(&self) -> usize {
        if self.header_size == 0 {
            8
        } else {
            self.header_size as usize
        }
    }

    /// Whether this is a headerless single-block container
    pub fn is_single_block(&self) -> bool {
        self.header_size == 0
    }

    /// Sum of the declared decoded sizes
    pub fn declared_size(&self) -> u64 {
        self.blocks
            .iter()
            .map(|b| u64::from(b.decompressed_size))
            .sum()
    }
}
