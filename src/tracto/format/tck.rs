//! MRtrix TCK decoder.
//!
//! A TCK file is a newline-delimited ASCII header (terminated by `END`)
//! followed by raw little-endian float32 triplets. NaN triplets separate
//! streamlines; an infinity triplet terminates the stream.

use byteorder::{ByteOrder, LittleEndian};
use log::debug;

use crate::tracto::types::error::{Result, TractoError};
use crate::tracto::types::models::Tractogram;

/// Smallest buffer that can hold a TCK header and data offset.
const MIN_LEN: usize = 20;

/// Decode a TCK buffer into a [`Tractogram`].
pub fn decode_tck(data: &[u8]) -> Result<Tractogram> {
    if data.len() < MIN_LEN {
        return Err(TractoError::TruncatedInput {
            format: "tck",
            needed: MIN_LEN,
            got: data.len(),
        });
    }

    let offset = parse_header(data)?;
    if offset < MIN_LEN {
        return Err(TractoError::BadSignature(format!(
            "tck data offset {} lies inside the header region",
            offset
        )));
    }
    if offset > data.len() {
        return Err(TractoError::TruncatedInput {
            format: "tck",
            needed: offset,
            got: data.len(),
        });
    }

    // Worst case every remaining triplet is a vertex; trim on return.
    let max_triplets = (data.len() - offset) / 12;
    let mut points: Vec<f32> = Vec::with_capacity(max_triplets * 3);
    let mut offsets: Vec<u32> = Vec::with_capacity(max_triplets + 2);
    offsets.push(0);

    let mut pos = offset;
    while pos + 12 <= data.len() {
        let x = LittleEndian::read_f32(&data[pos..]);
        if x.is_nan() {
            // Streamline boundary.
            offsets.push((points.len() / 3) as u32);
            pos += 12;
            continue;
        }
        if x.is_infinite() {
            // Stream terminator.
            break;
        }
        let y = LittleEndian::read_f32(&data[pos + 4..]);
        let z = LittleEndian::read_f32(&data[pos + 8..]);
        points.extend_from_slice(&[x, y, z]);
        pos += 12;
    }

    // Close an unterminated final streamline.
    let total = (points.len() / 3) as u32;
    if offsets.last() != Some(&total) {
        offsets.push(total);
    }

    points.shrink_to_fit();
    offsets.shrink_to_fit();
    debug!(
        "tck: {} streamlines, {} vertices",
        offsets.len() - 1,
        total
    );

    Ok(Tractogram {
        points,
        offsets,
        ..Tractogram::default()
    })
}

/// Scan the ASCII header for the mandatory `file:` binary data offset.
fn parse_header(data: &[u8]) -> Result<usize> {
    let mut pos = 0usize;
    let mut offset = None;
    while pos < data.len() {
        let line_end = data[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|i| pos + i)
            .unwrap_or(data.len());
        let line = String::from_utf8_lossy(&data[pos..line_end]);
        let line = line.trim();
        pos = line_end + 1;

        if line.is_empty() {
            continue;
        }
        if line.contains("END") {
            break;
        }
        // "file: . <offset>" names the byte offset of the binary section.
        if line.len() >= 5 && line[..5].eq_ignore_ascii_case("file:") {
            offset = line[5..]
                .split_whitespace()
                .last()
                .and_then(|token| token.parse::<usize>().ok());
        }
    }
    offset.ok_or(TractoError::MissingField("tck file: data offset"))
}
