//! VTK legacy POLYDATA decoder (BINARY encoding only).
//!
//! The header is newline-delimited ASCII; the POINTS and LINES payloads are
//! big-endian binary. Two cell layouts exist: the classic LINES form
//! (count-prefixed vertex index lists) and the newer OFFSETS extension
//! (an explicit offsets table, with the point table used directly).

use byteorder::{BigEndian, ByteOrder};
use log::{debug, warn};

use crate::tracto::types::error::{Result, TractoError};
use crate::tracto::types::models::Tractogram;

/// Cursor over the ASCII header region of a binary VTK buffer.
struct Lines<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Lines<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Next non-blank header line, trimmed.
    fn next_line(&mut self) -> Result<String> {
        while self.pos < self.data.len() {
            let line_end = self.data[self.pos..]
                .iter()
                .position(|&b| b == b'\n')
                .map(|i| self.pos + i)
                .unwrap_or(self.data.len());
            let line = String::from_utf8_lossy(&self.data[self.pos..line_end])
                .trim()
                .to_string();
            self.pos = line_end + 1;
            if !line.is_empty() {
                return Ok(line);
            }
        }
        Err(TractoError::TruncatedInput {
            format: "vtk",
            needed: self.pos + 1,
            got: self.data.len(),
        })
    }

    /// Take `len` binary bytes at the cursor.
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(TractoError::TruncatedInput {
                format: "vtk",
                needed: self.pos.saturating_add(len),
                got: self.data.len(),
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }
}

/// Decode a binary legacy-VTK POLYDATA buffer into a [`Tractogram`].
pub fn decode_vtk(data: &[u8]) -> Result<Tractogram> {
    let mut cursor = Lines::new(data);

    let signature = cursor.next_line()?;
    if !signature.starts_with("# vtk DataFile") {
        return Err(TractoError::BadSignature(format!(
            "not a VTK data file: {:?}",
            signature
        )));
    }
    let _title = cursor.next_line()?;
    let encoding = cursor.next_line()?;
    if encoding != "BINARY" {
        return Err(TractoError::UnsupportedVariant(format!(
            "VTK encoding {:?} (only BINARY is supported)",
            encoding
        )));
    }
    let dataset = cursor.next_line()?;
    if !dataset.contains("POLYDATA") {
        return Err(TractoError::UnsupportedVariant(format!(
            "VTK dataset {:?} (only POLYDATA is supported)",
            dataset
        )));
    }

    let (point_count, wide_points) = parse_points_line(&cursor.next_line()?)?;
    let point_table = read_point_table(&mut cursor, point_count, wide_points)?;

    let lines_line = cursor.next_line()?;
    if !lines_line.starts_with("LINES") {
        return Err(TractoError::UnsupportedVariant(format!(
            "VTK cell section {:?} (only LINES is supported)",
            lines_line
        )));
    }
    let line_count = parse_count(&lines_line, 1, "LINES")?;

    // The OFFSETS extension replaces the classic count-prefixed cell list.
    // Peek one line; when it is not OFFSETS the bytes were binary cell data
    // and the cursor is rewound to just before the lookahead.
    let before_lookahead = cursor.pos;
    if let Ok(lookahead) = cursor.next_line() {
        if lookahead.starts_with("OFFSETS") {
            let offsets = read_offsets_table(&mut cursor, line_count, lookahead.contains("int64"))?;
            debug!(
                "vtk offsets extension: {} offsets, {} vertices",
                offsets.len(),
                point_table.len() / 3
            );
            return Ok(Tractogram {
                points: point_table,
                offsets,
                ..Tractogram::default()
            });
        }
    }
    cursor.pos = before_lookahead;

    decode_classic_lines(&mut cursor, line_count, &point_table)
}

/// `POINTS <count> <float|double>`.
fn parse_points_line(line: &str) -> Result<(usize, bool)> {
    if !line.starts_with("POINTS") {
        return Err(TractoError::BadSignature(format!(
            "expected POINTS declaration, got {:?}",
            line
        )));
    }
    let count = parse_count(line, 1, "POINTS")?;
    let wide = match line.split_whitespace().nth(2) {
        Some("float") => false,
        Some("double") => true,
        other => {
            return Err(TractoError::UnsupportedVariant(format!(
                "VTK point element type {:?}",
                other.unwrap_or("")
            )))
        }
    };
    Ok((count, wide))
}

fn parse_count(line: &str, index: usize, section: &'static str) -> Result<usize> {
    line.split_whitespace()
        .nth(index)
        .and_then(|token| token.parse::<usize>().ok())
        .ok_or_else(|| TractoError::BadSignature(format!("malformed {} declaration: {:?}", section, line)))
}

/// Read `count` xyz triplets, widening doubles to f32.
fn read_point_table(cursor: &mut Lines<'_>, count: usize, wide: bool) -> Result<Vec<f32>> {
    let elements = count
        .checked_mul(3)
        .ok_or_else(|| TractoError::BadSignature(format!("VTK point count {} overflows", count)))?;
    let mut table = Vec::with_capacity(elements);
    if wide {
        let raw = cursor.take(elements.saturating_mul(8))?;
        for chunk in raw.chunks_exact(8) {
            table.push(BigEndian::read_f64(chunk) as f32);
        }
    } else {
        let raw = cursor.take(elements.saturating_mul(4))?;
        for chunk in raw.chunks_exact(4) {
            table.push(BigEndian::read_f32(chunk));
        }
    }
    Ok(table)
}

/// OFFSETS-extension table: one value per declared line-count entry.
///
/// Declared `int64` elements are read as big-endian word pairs and truncated
/// to the low word; a nonzero high word is surfaced as a warning, not an
/// error.
fn read_offsets_table(cursor: &mut Lines<'_>, count: usize, wide: bool) -> Result<Vec<u32>> {
    let mut offsets = Vec::with_capacity(count);
    if wide {
        let raw = cursor.take(count.saturating_mul(8))?;
        for chunk in raw.chunks_exact(8) {
            let hi = BigEndian::read_u32(chunk);
            let lo = BigEndian::read_u32(&chunk[4..]);
            if hi != 0 {
                warn!("vtk int64 offset high word {:#x} truncated", hi);
            }
            offsets.push(lo);
        }
    } else {
        let raw = cursor.take(count.saturating_mul(4))?;
        for chunk in raw.chunks_exact(4) {
            offsets.push(BigEndian::read_u32(chunk));
        }
    }
    Ok(offsets)
}

/// Classic LINES form: per cell, a vertex count then that many indices into
/// the point table; indices are resolved into a flat vertex array.
fn decode_classic_lines(
    cursor: &mut Lines<'_>,
    line_count: usize,
    point_table: &[f32],
) -> Result<Tractogram> {
    let table_points = (point_table.len() / 3) as u32;
    let mut points: Vec<f32> = Vec::new();
    let mut offsets: Vec<u32> = Vec::with_capacity(line_count + 1);
    offsets.push(0);

    for _ in 0..line_count {
        let raw = cursor.take(4)?;
        let count = BigEndian::read_i32(raw);
        let count = usize::try_from(count).map_err(|_| {
            TractoError::BadSignature(format!("negative VTK cell vertex count {}", count))
        })?;
        let raw = cursor.take(count.saturating_mul(4))?;
        for chunk in raw.chunks_exact(4) {
            let index = BigEndian::read_i32(chunk);
            let index = u32::try_from(index)
                .ok()
                .filter(|&i| i < table_points)
                .ok_or(TractoError::IndexOutOfBounds {
                    index: index as u32,
                    limit: table_points,
                })?;
            let at = index as usize * 3;
            points.extend_from_slice(&point_table[at..at + 3]);
        }
        offsets.push((points.len() / 3) as u32);
    }

    debug!(
        "vtk lines: {} streamlines, {} vertices",
        offsets.len() - 1,
        points.len() / 3
    );
    Ok(Tractogram {
        points,
        offsets,
        ..Tractogram::default()
    })
}
