//! Decompression wrappers for gzipped files and deflated archive entries.

use std::io::Read;

use flate2::read::{DeflateDecoder, GzDecoder};
use log::trace;

use crate::tracto::types::error::{Result, TractoError};

/// Gzip magic bytes (`1F 8B`) at the start of a buffer.
pub fn is_gzip(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0x1F && data[1] == 0x8B
}

/// Decompress a whole gzip stream.
///
/// Used for `.trk.gz` / `.tt.gz` payloads where the entire file is one
/// gzip member. The uncompressed size is unknown up front, so the output
/// grows from a heuristic capacity.
pub fn gunzip(data: &[u8]) -> Result<Vec<u8>> {
    trace!("gunzip: {} compressed bytes", data.len());
    let mut output = Vec::with_capacity(data.len().saturating_mul(4));
    let mut decoder = GzDecoder::new(data);
    decoder
        .read_to_end(&mut output)
        .map_err(|e| TractoError::Decompression(format!("gzip: {}", e)))?;
    Ok(output)
}

/// Decompress a raw (headerless) deflate stream, as stored in zip entries.
///
/// `expected_size` comes from the archive entry metadata and pre-sizes the
/// output; the stream is still read to its own end, so a short or long
/// result surfaces as a decompression error downstream rather than a panic.
pub fn inflate_raw(data: &[u8], expected_size: u64) -> Result<Vec<u8>> {
    trace!(
        "inflate_raw: {} compressed bytes -> {} bytes (expected)",
        data.len(),
        expected_size
    );
    let mut output = Vec::with_capacity(expected_size as usize);
    let mut decoder = DeflateDecoder::new(data);
    decoder
        .read_to_end(&mut output)
        .map_err(|e| TractoError::Decompression(format!("deflate: {}", e)))?;
    Ok(output)
}
