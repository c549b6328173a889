//! TrackVis TRK decoder.
//!
//! A TRK file is a fixed 1000-byte little-endian header followed by
//! variable-length streamline records. Vertices are stored in voxel-mm
//! coordinates; the header's voxel sizes and 4x4 matrix map them to world
//! millimetres. Whole-file gzip compression is detected and undone first.

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, warn};

use crate::tracto::codec::compression;
use crate::tracto::matrix;
use crate::tracto::types::error::{Result, TractoError};
use crate::tracto::types::models::Tractogram;

/// Fixed header size, also stored at [`offsets::HDR_SIZE`] for validation.
const HEADER_LEN: usize = 1000;

/// ASCII "TRAC" read as a little-endian u32.
const MAGIC: u32 = 1_128_354_388;

/// Name slots are 20 bytes, at most 10 of each kind.
const NAME_STRIDE: usize = 20;
const MAX_NAMED: usize = 10;

/// TRK header field byte offsets.
mod offsets {
    pub const MAGIC: usize = 0;
    pub const VOXEL_SIZE: usize = 12;
    pub const N_SCALARS: usize = 36;
    pub const SCALAR_NAMES: usize = 38;
    pub const N_PROPERTIES: usize = 238;
    pub const PROPERTY_NAMES: usize = 240;
    pub const VOX_TO_RAS: usize = 440;
    pub const VERSION: usize = 992;
    pub const HDR_SIZE: usize = 996;
}

/// Decode a TRK buffer (optionally gzipped) into a [`Tractogram`].
pub fn decode_trk(data: &[u8]) -> Result<Tractogram> {
    let decompressed;
    let data = if compression::is_gzip(data) {
        decompressed = compression::gunzip(data)?;
        &decompressed[..]
    } else {
        data
    };

    if data.len() < HEADER_LEN {
        return Err(TractoError::TruncatedInput {
            format: "trk",
            needed: HEADER_LEN,
            got: data.len(),
        });
    }
    let magic = LittleEndian::read_u32(&data[offsets::MAGIC..]);
    if magic != MAGIC {
        return Err(TractoError::BadSignature(format!(
            "trk magic {:#010x}, expected \"TRAC\"",
            magic
        )));
    }
    let version = LittleEndian::read_i16(&data[offsets::VERSION..]);
    if version > 2 {
        return Err(TractoError::UnsupportedVariant(format!(
            "trk version {}",
            version
        )));
    }
    let hdr_size = LittleEndian::read_i32(&data[offsets::HDR_SIZE..]);
    if hdr_size != HEADER_LEN as i32 {
        return Err(TractoError::BadSignature(format!(
            "trk header size {}, expected {}",
            hdr_size, HEADER_LEN
        )));
    }

    let scalar_names = read_names(data, offsets::N_SCALARS, offsets::SCALAR_NAMES, "scalar")?;
    let property_names = read_names(data, offsets::N_PROPERTIES, offsets::PROPERTY_NAMES, "property")?;
    let n_scalars = scalar_names.len();
    let n_properties = property_names.len();

    let vox_to_world = read_transform(data);

    // Streamline records follow the header back to back.
    let vertex_stride = 12 + 4 * n_scalars;
    let max_vertices = (data.len() - HEADER_LEN) / vertex_stride.max(1);
    let mut points: Vec<f32> = Vec::with_capacity(max_vertices * 3);
    let mut offsets_out: Vec<u32> = Vec::new();
    let mut scalars: Vec<Vec<f32>> = (0..n_scalars)
        .map(|_| Vec::with_capacity(max_vertices))
        .collect();
    let mut properties: Vec<Vec<f32>> = (0..n_properties).map(|_| Vec::new()).collect();

    let mut pos = HEADER_LEN;
    while pos + 4 <= data.len() {
        let count = LittleEndian::read_i32(&data[pos..]);
        pos += 4;
        let count = usize::try_from(count).map_err(|_| {
            TractoError::BadSignature(format!("negative trk vertex count {}", count))
        })?;
        let record_len = count
            .saturating_mul(vertex_stride)
            .saturating_add(4 * n_properties);
        if pos.saturating_add(record_len) > data.len() {
            return Err(TractoError::TruncatedInput {
                format: "trk",
                needed: pos.saturating_add(record_len),
                got: data.len(),
            });
        }

        offsets_out.push((points.len() / 3) as u32);
        for _ in 0..count {
            let x = LittleEndian::read_f32(&data[pos..]);
            let y = LittleEndian::read_f32(&data[pos + 4..]);
            let z = LittleEndian::read_f32(&data[pos + 8..]);
            points.extend_from_slice(&matrix::transform_point(&vox_to_world, x, y, z));
            pos += 12;
            for values in scalars.iter_mut() {
                values.push(LittleEndian::read_f32(&data[pos..]));
                pos += 4;
            }
        }
        for values in properties.iter_mut() {
            values.push(LittleEndian::read_f32(&data[pos..]));
            pos += 4;
        }
    }

    if offsets_out.is_empty() {
        return Err(TractoError::MissingField("trk streamline records"));
    }
    let total = (points.len() / 3) as u32;
    offsets_out.push(total);
    points.shrink_to_fit();

    debug!(
        "trk: {} streamlines, {} vertices, {} scalars, {} properties",
        offsets_out.len() - 1,
        total,
        n_scalars,
        n_properties
    );

    let mut tractogram = Tractogram {
        points,
        offsets: offsets_out,
        ..Tractogram::default()
    };
    for (name, values) in scalar_names.into_iter().zip(scalars) {
        tractogram.per_vertex.insert(name, values);
    }
    for (name, values) in property_names.into_iter().zip(properties) {
        tractogram.per_streamline.insert(name, values);
    }
    Ok(tractogram)
}

/// Read a count field and its 20-byte name slots, falling back to
/// positional names for zeroed slots.
fn read_names(
    data: &[u8],
    count_offset: usize,
    names_offset: usize,
    kind: &'static str,
) -> Result<Vec<String>> {
    let count = LittleEndian::read_i16(&data[count_offset..]);
    let count = usize::try_from(count)
        .ok()
        .filter(|&c| c <= MAX_NAMED)
        .ok_or_else(|| {
            TractoError::BadSignature(format!("trk declares {} {} fields", count, kind))
        })?;

    let mut names = Vec::with_capacity(count);
    for i in 0..count {
        let slot = &data[names_offset + i * NAME_STRIDE..names_offset + (i + 1) * NAME_STRIDE];
        let stop = slot.iter().position(|&b| b == 0).unwrap_or(NAME_STRIDE);
        let name = String::from_utf8_lossy(&slot[..stop]).trim().to_string();
        if name.is_empty() {
            names.push(format!("{}{}", kind, i));
        } else {
            names.push(name);
        }
    }
    Ok(names)
}

/// Build the effective voxel-to-world transform from the header.
///
/// Composes the header's vox-to-RAS matrix with a 1/voxel-size scale and a
/// -0.5 translation, mapping voxel-corner coordinates to the TRK convention
/// of voxel-center millimetres.
fn read_transform(data: &[u8]) -> [f32; 16] {
    let mut mat = [0.0f32; 16];
    LittleEndian::read_f32_into(
        &data[offsets::VOX_TO_RAS..offsets::VOX_TO_RAS + 64],
        &mut mat,
    );
    if mat[15] == 0.0 {
        warn!("trk vox-to-RAS transform unset; substituting identity");
        mat = matrix::identity();
    }

    let mut voxel_size = [0.0f32; 3];
    LittleEndian::read_f32_into(
        &data[offsets::VOXEL_SIZE..offsets::VOXEL_SIZE + 12],
        &mut voxel_size,
    );

    let zoom = [
        1.0 / voxel_size[0], 0.0, 0.0, -0.5,
        0.0, 1.0 / voxel_size[1], 0.0, -0.5,
        0.0, 0.0, 1.0 / voxel_size[2], -0.5,
        0.0, 0.0, 0.0, 1.0,
    ];
    matrix::multiply(&mat, &zoom)
}
