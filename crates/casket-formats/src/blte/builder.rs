//! BLTE container builder
//!
//! Used to produce fixtures and to re-encode content; the decoder never needs it.

use casket_crypto::{EncodingKey, TactKey, md5_of};

use super::block::BlockMode;
use super::compression::{deflate, encode_lz4};
use super::encryption::{EncryptedHeader, EncryptionType, encrypt_block};
use super::error::BlteResult;
use super::header::{BLOCK_INFO_SIZE, BLTE_MAGIC, TABLE_FLAGS};

#[derive(Debug, Clone)]
struct PendingBlock {
    data: Vec<u8>,
    mode: BlockMode,
    encryption: Option<(TactKey, [u8; 4])>,
    unchecked: bool,
}

/// An encoded container together with its encoding key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBlte {
    /// Container bytes
    pub bytes: Vec<u8>,
    /// Key the container verifies against
    pub key: EncodingKey,
}

/// Builder assembling BLTE containers block by block
#[derive(Debug, Clone, Default)]
pub struct BlteBuilder {
    blocks: Vec<PendingBlock>,
    headerless: bool,
}

impl BlteBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, data: &[u8], mode: BlockMode) -> Self {
        self.blocks.push(PendingBlock {
            data: data.to_vec(),
            mode,
            encryption: None,
            unchecked: false,
        });
        self
    }

    /// Append a block stored verbatim
    pub fn raw(self, data: &[u8]) -> Self {
        self.push(data, BlockMode::Raw)
    }

    /// Append a zlib block
    pub fn zlib(self, data: &[u8]) -> Self {
        self.push(data, BlockMode::Zlib)
    }

    /// Append an LZ4 block
    pub fn lz4(self, data: &[u8]) -> Self {
        self.push(data, BlockMode::Lz4)
    }

    /// Append a Salsa20-encrypted block wrapping an inner block of `mode`
    pub fn encrypted(mut self, data: &[u8], mode: BlockMode, key: TactKey, iv: [u8; 4]) -> Self {
        self.blocks.push(PendingBlock {
            data: data.to_vec(),
            mode,
            encryption: Some((key, iv)),
            unchecked: false,
        });
        self
    }

    /// Give the last block the all-zero hash so it is not verified
    pub fn unchecked(mut self) -> Self {
        if let Some(block) = self.blocks.last_mut() {
            block.unchecked = true;
        }
        self
    }

    /// Emit a headerless container; only the first block is written
    pub fn headerless(mut self) -> Self {
        self.headerless = true;
        self
    }

    fn encode_inner(data: &[u8], mode: BlockMode) -> BlteResult<Vec<u8>> {
        let mut out = vec![mode.as_byte()];
        match mode {
            BlockMode::Zlib => out.extend(deflate(data)?),
            BlockMode::Lz4 => out.extend(encode_lz4(data)),
            _ => out.extend_from_slice(data),
        }
        Ok(out)
    }

    /// Encode the container
    pub fn build(self) -> BlteResult<EncodedBlte> {
        let mut encoded = Vec::with_capacity(self.blocks.len());
        for (index, block) in self.blocks.iter().enumerate() {
            let inner = Self::encode_inner(&block.data, block.mode)?;
            let bytes = match &block.encryption {
                Some((key, iv)) => {
                    let header = EncryptedHeader {
                        key_name: key.name,
                        iv: *iv,
                        encryption_type: EncryptionType::Salsa20,
                    };
                    let mut out = vec![BlockMode::Encrypted.as_byte()];
                    out.extend(encrypt_block(&inner, &key.key, &header, index));
                    out
                }
                None => inner,
            };
            encoded.push((bytes, block));
        }

        if self.headerless {
            let mut bytes = BLTE_MAGIC.to_vec();
            bytes.extend_from_slice(&0u32.to_be_bytes());
            if let Some((block, _)) = encoded.first() {
                bytes.extend_from_slice(block);
            }
            let key = EncodingKey::from_data(&bytes);
            return Ok(EncodedBlte { bytes, key });
        }

        let header_size = BLOCK_INFO_SIZE as usize * encoded.len() + 12;
        let mut bytes = Vec::with_capacity(header_size);
        bytes.extend_from_slice(&BLTE_MAGIC);
        bytes.extend_from_slice(&(header_size as u32).to_be_bytes());
        bytes.push(TABLE_FLAGS);
        bytes.extend_from_slice(&(encoded.len() as u32).to_be_bytes()[1..]);

        for (data, block) in &encoded {
            bytes.extend_from_slice(&(data.len() as u32).to_be_bytes());
            bytes.extend_from_slice(&(block.data.len() as u32).to_be_bytes());
            let hash = if block.unchecked { [0; 16] } else { md5_of(data) };
            bytes.extend_from_slice(&hash);
        }

        let key = EncodingKey::from_data(&bytes);
        for (data, _) in &encoded {
            bytes.extend_from_slice(data);
        }

        Ok(EncodedBlte { bytes, key })
    }
}
