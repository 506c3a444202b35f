//! Per-block mode dispatch

use std::borrow::Cow;

use casket_crypto::{KeyName, KeyProvider};

use super::compression::{decode_lz4, inflate};
use super::encryption::{Decrypted, decrypt_block};
use super::error::{BlteError, BlteResult};

/// Encrypted blocks unwrap into another typed block; real data nests at most
/// encrypted-then-compressed.
pub const MAX_MODE_TAGS: usize = 3;

/// Block mode, the first byte of every block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockMode {
    /// `N`: stored verbatim
    Raw,
    /// `Z`: zlib
    Zlib,
    /// `4`: LZ4 with size prefix
    Lz4,
    /// `E`: encrypted typed block
    Encrypted,
    /// `F`: recursive BLTE frame
    Frame,
}

impl BlockMode {
    /// Parse the mode byte
    pub fn from_byte(byte: u8) -> BlteResult<Self> {
        match byte {
            b'N' => Ok(Self::Raw),
            b'Z' => Ok(Self::Zlib),
            b'4' => Ok(Self::Lz4),
            b'E' => Ok(Self::Encrypted),
            b'F' => Ok(Self::Frame),
            other => Err(BlteError::UnknownBlockMode(other)),
        }
    }

    /// Mode byte
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Raw => b'N',
            Self::Zlib => b'Z',
            Self::Lz4 => b'4',
            Self::Encrypted => b'E',
            Self::Frame => b'F',
        }
    }
}

/// What decoding a single block produced
#[derive(Debug)]
pub enum BlockOutcome {
    /// Decoded bytes
    Decoded(Vec<u8>),
    /// The block is encrypted with a key the provider does not have
    MissingKey(KeyName),
}

/// Decode one encoded block (mode byte included) at stream position `index`
pub fn decode_block(
    raw: &[u8],
    index: usize,
    keys: &dyn KeyProvider,
) -> BlteResult<BlockOutcome> {
    let mut pending: Cow<'_, [u8]> = Cow::Borrowed(raw);

    for _ in 0..MAX_MODE_TAGS {
        let (&tag, body) = pending.split_first().ok_or(BlteError::EmptyBlock(index))?;

        let next = match BlockMode::from_byte(tag)? {
            BlockMode::Raw => return Ok(BlockOutcome::Decoded(body.to_vec())),
            BlockMode::Zlib => return Ok(BlockOutcome::Decoded(inflate(body)?)),
            BlockMode::Lz4 => return Ok(BlockOutcome::Decoded(decode_lz4(body)?)),
            BlockMode::Frame => return Err(BlteError::UnsupportedFrame),
            BlockMode::Encrypted => match decrypt_block(body, index, keys)? {
                Decrypted::Plain(plain) => plain,
                Decrypted::MissingKey(name) => return Ok(BlockOutcome::MissingKey(name)),
            },
        };
        pending = Cow::Owned(next);
    }

    Err(BlteError::NestingTooDeep(index))
}
