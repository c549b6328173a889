//! TRX decoder.
//!
//! A TRX file is a zip container. Entry paths carry the routing: the parent
//! directory selects the attribute section (`groups`, `dpv`, `dps`, or the
//! container root) and the file name carries the array identifier plus an
//! element-type suffix. Root-level `offsets.*` and `positions.3.*` arrays
//! form the geometry; `header.json` is opaque metadata.

use byteorder::{ByteOrder, LittleEndian};
use log::debug;

use crate::tracto::archive::Archive;
use crate::tracto::codec::numeric;
use crate::tracto::types::error::{Result, TractoError};
use crate::tracto::types::models::Tractogram;

/// Element types a TRX data entry can declare, in suffix-match priority
/// order. `uint8` must be probed before `int8` (and so on) because the
/// shorter names are suffixes of the longer ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dtype {
    U64,
    I64,
    U32,
    U16,
    U8,
    I32,
    I16,
    I8,
    F64,
    F32,
    F16,
}

const DTYPE_SUFFIXES: &[(&str, Dtype)] = &[
    ("uint64", Dtype::U64),
    ("int64", Dtype::I64),
    ("uint32", Dtype::U32),
    ("uint16", Dtype::U16),
    ("uint8", Dtype::U8),
    ("int32", Dtype::I32),
    ("int16", Dtype::I16),
    ("int8", Dtype::I8),
    ("float64", Dtype::F64),
    ("float32", Dtype::F32),
    ("float16", Dtype::F16),
];

impl Dtype {
    fn detect(type_part: &str) -> Option<Dtype> {
        DTYPE_SUFFIXES
            .iter()
            .find(|(suffix, _)| type_part.ends_with(suffix))
            .map(|&(_, dtype)| dtype)
    }

    fn width(self) -> usize {
        match self {
            Dtype::U64 | Dtype::I64 | Dtype::F64 => 8,
            Dtype::U32 | Dtype::I32 | Dtype::F32 => 4,
            Dtype::U16 | Dtype::I16 | Dtype::F16 => 2,
            Dtype::U8 | Dtype::I8 => 1,
        }
    }
}

/// The attribute section an entry's parent directory selects.
enum Section {
    Root,
    Groups,
    PerVertex,
    PerStreamline,
}

/// Decode a TRX zip buffer into a [`Tractogram`].
pub fn decode_trx(data: &[u8]) -> Result<Tractogram> {
    let archive = Archive::open(data)?;

    let mut tractogram = Tractogram::default();
    let mut offsets: Option<Vec<u32>> = None;
    let mut positions: Option<Vec<f32>> = None;

    for entry in archive.entries() {
        if entry.uncompressed_size == 0 {
            continue; // directory marker
        }
        let mut components = entry.name.rsplit('/');
        let file_name = components.next().unwrap_or(&entry.name);
        if file_name.starts_with('.') {
            continue;
        }
        let section = match components.next() {
            Some("groups") => Section::Groups,
            Some("dpv") => Section::PerVertex,
            Some("dps") => Section::PerStreamline,
            _ => Section::Root,
        };

        if file_name == "header.json" {
            let payload = archive.extract(entry)?;
            tractogram.header = Some(serde_json::from_slice(&payload)?);
            continue;
        }

        let Some((id, type_part)) = file_name.split_once('.') else {
            debug!("trx: ignoring non-data entry {:?}", entry.name);
            continue;
        };
        let Some(dtype) = Dtype::detect(type_part) else {
            debug!("trx: ignoring entry {:?} with unknown element type", entry.name);
            continue;
        };
        let payload = archive.extract(entry)?;

        match section {
            Section::Root if file_name.starts_with("offsets.") => {
                offsets = Some(read_u32s(&payload, dtype)?);
            }
            Section::Root if file_name.starts_with("positions.3.") => {
                positions = Some(read_f32s(&payload, dtype)?);
            }
            Section::Root => {
                debug!("trx: ignoring unrouted root entry {:?}", entry.name);
            }
            Section::Groups => {
                tractogram
                    .per_group
                    .insert(id.to_string(), read_f32s(&payload, dtype)?);
            }
            Section::PerVertex => {
                tractogram
                    .per_vertex
                    .insert(id.to_string(), read_f32s(&payload, dtype)?);
            }
            Section::PerStreamline => {
                tractogram
                    .per_streamline
                    .insert(id.to_string(), read_f32s(&payload, dtype)?);
            }
        }
    }

    let mut offsets = offsets.ok_or(TractoError::MissingField("trx offsets array"))?;
    let points = positions.ok_or(TractoError::MissingField("trx positions array"))?;

    // The stored offsets carry only streamline starts; complete the
    // fence-post with the total vertex count.
    offsets.push((points.len() / 3) as u32);

    debug!(
        "trx: {} streamlines, {} vertices, {} dpv, {} dps, {} groups",
        offsets.len() - 1,
        points.len() / 3,
        tractogram.per_vertex.len(),
        tractogram.per_streamline.len(),
        tractogram.per_group.len()
    );

    tractogram.points = points;
    tractogram.offsets = offsets;
    Ok(tractogram)
}

/// Read an entry payload as unsigned 32-bit values (the offsets array).
///
/// 64-bit elements are narrowed with a fatal overflow check; floating
/// elements are truncated toward zero.
fn read_u32s(data: &[u8], dtype: Dtype) -> Result<Vec<u32>> {
    let width = dtype.width();
    let mut values = Vec::with_capacity(data.len() / width);
    for element in data.chunks_exact(width) {
        let value = match dtype {
            Dtype::U64 | Dtype::I64 => {
                let lo = LittleEndian::read_u32(element);
                let hi = LittleEndian::read_u32(&element[4..]);
                numeric::narrow_u64(lo, hi)?
            }
            Dtype::U32 => LittleEndian::read_u32(element),
            Dtype::U16 => LittleEndian::read_u16(element) as u32,
            Dtype::U8 => element[0] as u32,
            Dtype::I32 => narrow_signed(LittleEndian::read_i32(element) as i64)?,
            Dtype::I16 => narrow_signed(LittleEndian::read_i16(element) as i64)?,
            Dtype::I8 => narrow_signed(element[0] as i8 as i64)?,
            Dtype::F64 => LittleEndian::read_f64(element) as u32,
            Dtype::F32 => LittleEndian::read_f32(element) as u32,
            Dtype::F16 => numeric::expand_half(LittleEndian::read_u16(element)) as u32,
        };
        values.push(value);
    }
    Ok(values)
}

fn narrow_signed(value: i64) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| TractoError::BadSignature(format!("negative trx offset {}", value)))
}

/// Read an entry payload as 32-bit floats (positions and attributes).
fn read_f32s(data: &[u8], dtype: Dtype) -> Result<Vec<f32>> {
    let width = dtype.width();
    let mut values = Vec::with_capacity(data.len() / width);
    for element in data.chunks_exact(width) {
        let value = match dtype {
            Dtype::U64 | Dtype::I64 => {
                let lo = LittleEndian::read_u32(element);
                let hi = LittleEndian::read_u32(&element[4..]);
                numeric::narrow_u64(lo, hi)? as f32
            }
            Dtype::U32 => LittleEndian::read_u32(element) as f32,
            Dtype::U16 => LittleEndian::read_u16(element) as f32,
            Dtype::U8 => element[0] as f32,
            Dtype::I32 => LittleEndian::read_i32(element) as f32,
            Dtype::I16 => LittleEndian::read_i16(element) as f32,
            Dtype::I8 => element[0] as i8 as f32,
            Dtype::F64 => LittleEndian::read_f64(element) as f32,
            Dtype::F32 => LittleEndian::read_f32(element),
            Dtype::F16 => numeric::expand_half(LittleEndian::read_u16(element)),
        };
        values.push(value);
    }
    Ok(values)
}
