//! Block compression codecs

use std::io::Read;

use flate2::Compression;
use flate2::read::{ZlibDecoder, ZlibEncoder};

use super::error::{BlteError, BlteResult};

/// Maximum allowed decompression size (1 GB)
///
/// Limits a single block's output so a hostile stream cannot exhaust memory.
pub const MAX_DECOMPRESSION_SIZE: usize = 1024 * 1024 * 1024;

/// Inflate a zlib stream
pub fn inflate(data: &[u8]) -> BlteResult<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut decompressed = Vec::new();

    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = decoder
            .read(&mut buffer)
            .map_err(|e| BlteError::DecompressionFailed(format!("zlib: {e}")))?;

        if bytes_read == 0 {
            break;
        }

        if decompressed.len() + bytes_read > MAX_DECOMPRESSION_SIZE {
            return Err(BlteError::DecompressionFailed(format!(
                "zlib output exceeds limit of {MAX_DECOMPRESSION_SIZE} bytes"
            )));
        }

        decompressed.extend_from_slice(&buffer[..bytes_read]);
    }

    Ok(decompressed)
}

/// Decode an LZ4 block with its 8-byte little-endian size prefix
pub fn decode_lz4(data: &[u8]) -> BlteResult<Vec<u8>> {
    let Some((prefix, compressed)) = data.split_first_chunk::<8>() else {
        return Err(BlteError::DecompressionFailed(
            "lz4: missing size header".to_string(),
        ));
    };

    let size = usize::try_from(u64::from_le_bytes(*prefix))
        .ok()
        .filter(|&size| size <= MAX_DECOMPRESSION_SIZE)
        .ok_or_else(|| {
            BlteError::DecompressionFailed(format!(
                "lz4 output exceeds limit of {MAX_DECOMPRESSION_SIZE} bytes"
            ))
        })?;

    lz4_flex::block::decompress(compressed, size)
        .map_err(|e| BlteError::DecompressionFailed(format!("lz4: {e}")))
}

/// Deflate `data` into a zlib stream
pub fn deflate(data: &[u8]) -> BlteResult<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(data, Compression::default());
    let mut compressed = Vec::new();
    encoder
        .read_to_end(&mut compressed)
        .map_err(|e| BlteError::CompressionError(format!("zlib: {e}")))?;
    Ok(compressed)
}

/// Encode `data` as a size-prefixed LZ4 block
pub fn encode_lz4(data: &[u8]) -> Vec<u8> {
    let mut out = (data.len() as u64).to_le_bytes().to_vec();
    out.extend_from_slice(&lz4_flex::block::compress(data));
    out
}
