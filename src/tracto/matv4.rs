//! Matlab V4 (Level 1.0) container reader backing the TT decoder.
//!
//! A V4 file is a flat sequence of tagged variables: a 20-byte fixed header
//! (type code, row count, column count, imaginary flag, name length), the
//! NUL-terminated variable name, then `rows * cols` elements.

use std::collections::HashMap;

use byteorder::{ByteOrder, LittleEndian};
use log::trace;

use crate::tracto::types::error::{Result, TractoError};

/// Fixed tag header size preceding every variable.
const TAG_LEN: usize = 20;

/// Element storage of one V4 variable, in the numeric kind the file declared.
#[derive(Debug, Clone)]
pub enum MatData {
    F64(Vec<f64>),
    F32(Vec<f32>),
    I32(Vec<i32>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    U8(Vec<u8>),
}

impl MatData {
    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            MatData::F64(v) => v.len(),
            MatData::F32(v) => v.len(),
            MatData::I32(v) => v.len(),
            MatData::I16(v) => v.len(),
            MatData::U16(v) => v.len(),
            MatData::U8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All elements widened to `f64`, whatever the stored kind.
    pub fn to_f64s(&self) -> Vec<f64> {
        match self {
            MatData::F64(v) => v.clone(),
            MatData::F32(v) => v.iter().map(|&x| x as f64).collect(),
            MatData::I32(v) => v.iter().map(|&x| x as f64).collect(),
            MatData::I16(v) => v.iter().map(|&x| x as f64).collect(),
            MatData::U16(v) => v.iter().map(|&x| x as f64).collect(),
            MatData::U8(v) => v.iter().map(|&x| x as f64).collect(),
        }
    }

    /// The raw byte view of a `uint8` variable, `None` for any other kind.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            MatData::U8(v) => Some(v),
            _ => None,
        }
    }
}

/// One named variable from a V4 file.
#[derive(Debug, Clone)]
pub struct MatVariable {
    pub rows: usize,
    pub cols: usize,
    pub data: MatData,
}

/// Parse a Matlab V4 buffer into a name-to-variable map.
pub fn parse(data: &[u8]) -> Result<HashMap<String, MatVariable>> {
    if data.len() < TAG_LEN {
        return Err(TractoError::TruncatedInput {
            format: "mat v4",
            needed: TAG_LEN,
            got: data.len(),
        });
    }

    let mut variables = HashMap::new();
    let mut pos = 0usize;
    while pos < data.len() {
        if pos + TAG_LEN > data.len() {
            return Err(TractoError::TruncatedInput {
                format: "mat v4",
                needed: pos + TAG_LEN,
                got: data.len(),
            });
        }

        let type_code = LittleEndian::read_i32(&data[pos..]);
        let rows = read_dim(LittleEndian::read_i32(&data[pos + 4..]))?;
        let cols = read_dim(LittleEndian::read_i32(&data[pos + 8..]))?;
        let imaginary = LittleEndian::read_i32(&data[pos + 12..]);
        let name_len = read_dim(LittleEndian::read_i32(&data[pos + 16..]))?;
        pos += TAG_LEN;

        if imaginary != 0 {
            return Err(TractoError::UnsupportedVariant(
                "MAT variable with imaginary part".to_string(),
            ));
        }
        // Type codes are MOPT digits; anything above 50 means a non-little-endian
        // or text encoding this reader does not handle.
        if !(0..=50).contains(&type_code) {
            return Err(TractoError::UnsupportedVariant(format!(
                "MAT type code {} (non-little-endian or text encoding)",
                type_code
            )));
        }

        let name_end = pos
            .checked_add(name_len)
            .filter(|&end| end <= data.len())
            .ok_or(TractoError::TruncatedInput {
                format: "mat v4",
                needed: pos + name_len,
                got: data.len(),
            })?;
        let name_bytes = &data[pos..name_end];
        let name_stop = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_len);
        let name = String::from_utf8_lossy(&name_bytes[..name_stop]).into_owned();
        pos = name_end;

        let count = rows
            .checked_mul(cols)
            .ok_or_else(|| TractoError::BadSignature("MAT dimensions overflow".to_string()))?;
        let precision = (type_code / 10) % 10;
        let (matdata, consumed) = read_elements(&data[pos..], precision, count, pos, data.len())?;
        pos += consumed;

        trace!("mat variable {:?}: {}x{}", name, rows, cols);
        variables.insert(name, MatVariable { rows, cols, data: matdata });
    }

    Ok(variables)
}

fn read_dim(value: i32) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| TractoError::BadSignature(format!("negative MAT tag field {}", value)))
}

/// Read `count` elements of the kind given by the type code's tens digit.
///
/// `pos`/`total` only feed error context.
fn read_elements(
    data: &[u8],
    precision: i32,
    count: usize,
    pos: usize,
    total: usize,
) -> Result<(MatData, usize)> {
    let width = match precision {
        0 => 8,
        1 => 4,
        2 => 4,
        3 => 2,
        4 => 2,
        5 => 1,
        other => {
            return Err(TractoError::UnsupportedVariant(format!(
                "MAT element precision digit {}",
                other
            )))
        }
    };
    let byte_len = count
        .checked_mul(width)
        .filter(|&len| len <= data.len())
        .ok_or(TractoError::TruncatedInput {
            format: "mat v4",
            needed: pos.saturating_add(count.saturating_mul(width)),
            got: total,
        })?;
    let raw = &data[..byte_len];

    let matdata = match precision {
        0 => {
            let mut v = vec![0.0f64; count];
            LittleEndian::read_f64_into(raw, &mut v);
            MatData::F64(v)
        }
        1 => {
            let mut v = vec![0.0f32; count];
            LittleEndian::read_f32_into(raw, &mut v);
            MatData::F32(v)
        }
        2 => {
            let mut v = vec![0i32; count];
            LittleEndian::read_i32_into(raw, &mut v);
            MatData::I32(v)
        }
        3 => {
            let mut v = vec![0i16; count];
            LittleEndian::read_i16_into(raw, &mut v);
            MatData::I16(v)
        }
        4 => {
            let mut v = vec![0u16; count];
            LittleEndian::read_u16_into(raw, &mut v);
            MatData::U16(v)
        }
        5 => MatData::U8(raw.to_vec()),
        _ => unreachable!(),
    };
    Ok((matdata, byte_len))
}
