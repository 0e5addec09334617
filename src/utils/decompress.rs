//! Decompression of compressed evidence streams.
//!
//! All decoders read through a hard output bound so a small hostile stream cannot expand into
//! an arbitrary amount of memory.

use std::io::Read;

use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};

use crate::{path::CompressionMethod, Error, Result};

/// Decompresses `data` with the given method.
///
/// # Arguments
///
/// * `method` - The compression method of `data`.
/// * `data` - The compressed bytes.
/// * `limit` - Maximum number of decompressed bytes accepted.
///
/// # Errors
///
/// Returns [`crate::Error::Decode`] if the stream is corrupt or expands beyond `limit`.
pub fn decompress(method: CompressionMethod, data: &[u8], limit: u64) -> Result<Vec<u8>> {
    match method {
        CompressionMethod::Deflate => read_bounded(DeflateDecoder::new(data), method, limit),
        CompressionMethod::Zlib => read_bounded(ZlibDecoder::new(data), method, limit),
        CompressionMethod::Gzip => read_bounded(GzDecoder::new(data), method, limit),
    }
}

fn read_bounded(decoder: impl Read, method: CompressionMethod, limit: u64) -> Result<Vec<u8>> {
    let mut decompressed = Vec::new();

    decoder
        .take(limit.saturating_add(1))
        .read_to_end(&mut decompressed)
        .map_err(|e| Error::Decode(format!("{method}: {e}")))?;

    if decompressed.len() as u64 > limit {
        return Err(Error::Decode(format!(
            "{method}: stream expands beyond {limit} bytes"
        )));
    }

    Ok(decompressed)
}
