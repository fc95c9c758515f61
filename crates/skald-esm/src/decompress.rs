//! Inflation of compressed record payloads.
//!
//! A compressed record stores a u32 uncompressed size followed by a zlib
//! stream. The payload is always materialized whole.

use std::io::Read;

use flate2::read::ZlibDecoder;

use crate::{Error, Result};

/// Size of the uncompressed-size prefix.
pub const SIZE_PREFIX_LEN: usize = 4;

/// Upper bound on the buffer reserved from a declared size alone.
const MAX_PREALLOC: usize = 16 * 1024 * 1024;

/// Inflate a zlib stream that must produce exactly `expected_size` bytes.
///
/// Corrupt, truncated, dictionary-requiring and wrongly-sized streams all
/// surface as [`Error::Decompression`]; no partial output is returned.
pub fn inflate(data: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(expected_size.min(MAX_PREALLOC));

    // One byte past the declared size is enough to detect an oversized stream.
    ZlibDecoder::new(data)
        .take(expected_size as u64 + 1)
        .read_to_end(&mut output)
        .map_err(|e| Error::Decompression(e.to_string()))?;

    if output.len() != expected_size {
        return Err(Error::Decompression(format!(
            "inflated to {} bytes, expected {}",
            output.len(),
            expected_size
        )));
    }

    Ok(output)
}

/// Split a stored payload into its declared size and inflate the rest.
pub fn inflate_payload(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() < SIZE_PREFIX_LEN {
        return Err(Error::Decompression(format!(
            "payload of {} bytes has no size prefix",
            payload.len()
        )));
    }
    let (prefix, data) = payload.split_at(SIZE_PREFIX_LEN);
    let expected_size = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
    inflate(data, expected_size as usize)
}
