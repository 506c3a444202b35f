//! Property tests for BLTE decoding
//!
//! Any container the builder produces must decode to the concatenation of
//! its blocks, whether decoded eagerly, lazily by range, or twice.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use casket_crypto::{KeyName, KeyProvider, StaticKeys, TactKey};
use casket_formats::blte::{BlockMode, BlteBuilder, BlteError, BlteReader, decode};
use proptest::prelude::*;

const KEY: TactKey = TactKey::new(KeyName(0xFA50_5078_126A_CB3E), [0x5A; 16]);

#[derive(Debug, Clone)]
enum Block {
    Raw(Vec<u8>),
    Zlib(Vec<u8>),
    Lz4(Vec<u8>),
    Encrypted(Vec<u8>, [u8; 4]),
}

impl Block {
    fn data(&self) -> &[u8] {
        match self {
            Self::Raw(d) | Self::Zlib(d) | Self::Lz4(d) | Self::Encrypted(d, _) => d,
        }
    }
}

fn any_block() -> impl Strategy<Value = Block> {
    let data = proptest::collection::vec(any::<u8>(), 1..2048);
    prop_oneof![
        data.clone().prop_map(Block::Raw),
        data.clone().prop_map(Block::Zlib),
        data.clone().prop_map(Block::Lz4),
        (data, any::<[u8; 4]>()).prop_map(|(d, iv)| Block::Encrypted(d, iv)),
    ]
}

fn build(blocks: &[Block]) -> (Vec<u8>, casket_crypto::EncodingKey, Vec<u8>) {
    let mut builder = BlteBuilder::new();
    let mut expected = Vec::new();
    for block in blocks {
        expected.extend_from_slice(block.data());
        builder = match block {
            Block::Raw(d) => builder.raw(d),
            Block::Zlib(d) => builder.zlib(d),
            Block::Lz4(d) => builder.lz4(d),
            Block::Encrypted(d, iv) => builder.encrypted(d, BlockMode::Zlib, KEY, *iv),
        };
    }
    let encoded = builder.build().expect("Builder should succeed");
    (encoded.bytes, encoded.key, expected)
}

fn keys() -> Arc<dyn KeyProvider> {
    Arc::new(StaticKeys::new().with_key(KEY))
}

proptest! {
    /// Eager decoding yields the concatenated block contents
    #[test]
    fn decode_concatenates_blocks(blocks in proptest::collection::vec(any_block(), 1..6)) {
        let (bytes, key, expected) = build(&blocks);
        let decoded = decode(bytes, &key, keys(), false).expect("Decode should succeed");
        prop_assert_eq!(decoded, expected);
    }

    /// Decoding the same container twice gives the same bytes
    #[test]
    fn decode_is_idempotent(blocks in proptest::collection::vec(any_block(), 1..4)) {
        let (bytes, key, _) = build(&blocks);
        let first = decode(bytes.clone(), &key, keys(), false).expect("Decode should succeed");
        let second = decode(bytes, &key, keys(), false).expect("Decode should succeed");
        prop_assert_eq!(first, second);
    }

    /// A lazy range read matches the same slice of the eager result
    #[test]
    fn range_read_matches_eager(
        blocks in proptest::collection::vec(any_block(), 1..6),
        start in 0.0f64..1.0,
        span in 0.0f64..1.0,
    ) {
        let (bytes, key, expected) = build(&blocks);
        let offset = ((expected.len() as f64) * start) as usize;
        let len = (((expected.len() - offset) as f64) * span) as usize;

        let mut reader = BlteReader::new(bytes, &key, keys()).expect("Header should verify");
        let range = reader.read_range(offset, len).expect("Range should decode").to_vec();
        prop_assert_eq!(range.as_slice(), &expected[offset..offset + len]);
        prop_assert!(reader.blocks_decoded() <= reader.block_count());
    }

    /// Flipping a header byte is always detected
    #[test]
    fn header_corruption_detected(
        blocks in proptest::collection::vec(any_block(), 2..4),
        position in 8usize..36,
        flip in 1u8..=255,
    ) {
        let (mut bytes, key, _) = build(&blocks);
        bytes[position] ^= flip;
        let result = BlteReader::new(bytes, &key, keys());
        prop_assert!(result.is_err());
    }

    /// Missing keys zero-fill exactly the encrypted blocks in partial mode
    #[test]
    fn partial_decrypt_zero_fills(blocks in proptest::collection::vec(any_block(), 1..5)) {
        let (bytes, key, _) = build(&blocks);
        let result = decode(bytes.clone(), &key, Arc::new(StaticKeys::new()), true)
            .expect("Partial decode should succeed");

        let mut expected = Vec::new();
        for block in &blocks {
            match block {
                Block::Encrypted(d, _) => expected.resize(expected.len() + d.len(), 0),
                other => expected.extend_from_slice(other.data()),
            }
        }
        prop_assert_eq!(result, expected);

        let strict = decode(bytes, &key, Arc::new(StaticKeys::new()), false);
        let any_encrypted = blocks.iter().any(|b| matches!(b, Block::Encrypted(..)));
        prop_assert_eq!(
            matches!(strict, Err(BlteError::EncryptionKeyMissing(_))),
            any_encrypted
        );
    }
}
