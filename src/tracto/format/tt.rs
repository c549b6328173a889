//! DSI-Studio TT decoder.
//!
//! A TT file is a Matlab V4 container (optionally gzipped as a whole).
//! The `track` variable holds delta-coded streamline records in fixed-point
//! 1/32-voxel units; `trans_to_mni` maps the decoded voxel coordinates into
//! world millimetres.

use byteorder::{ByteOrder, LittleEndian};
use log::debug;

use crate::tracto::codec::compression;
use crate::tracto::matrix;
use crate::tracto::matv4;
use crate::tracto::types::error::{Result, TractoError};
use crate::tracto::types::models::Tractogram;

/// Fixed-point scale of the stored coordinates.
const COORD_SCALE: f32 = 32.0;

/// Decode a TT buffer (optionally gzipped) into a [`Tractogram`].
pub fn decode_tt(data: &[u8]) -> Result<Tractogram> {
    let decompressed;
    let data = if compression::is_gzip(data) {
        decompressed = compression::gunzip(data)?;
        &decompressed[..]
    } else {
        data
    };

    let variables = matv4::parse(data)?;
    let trans = variables
        .get("trans_to_mni")
        .ok_or(TractoError::MissingField("trans_to_mni"))?;
    let voxel_size = variables
        .get("voxel_size")
        .ok_or(TractoError::MissingField("voxel_size"))?;
    let track = variables
        .get("track")
        .ok_or(TractoError::MissingField("track"))?;

    let trans_values = trans.data.to_f64s();
    if trans_values.len() != 16 {
        return Err(TractoError::BadSignature(format!(
            "trans_to_mni holds {} elements, expected 16",
            trans_values.len()
        )));
    }
    let mut voxel_to_mni = [0.0f32; 16];
    for (out, value) in voxel_to_mni.iter_mut().zip(&trans_values) {
        *out = *value as f32;
    }
    // Stored row-major; used transposed, row-vector convention.
    let voxel_to_mni = matrix::transpose(&voxel_to_mni);
    debug!("tt voxel size: {:?}", voxel_size.data.to_f64s());

    let blob = track.data.as_bytes().ok_or_else(|| {
        TractoError::UnsupportedVariant("tt track variable is not a uint8 blob".to_string())
    })?;
    decode_track(blob, &voxel_to_mni)
}

/// Walk the concatenated delta-coded records of the `track` blob.
///
/// Each record is a u32 size field, one absolute int32 point in 1/32-voxel
/// units, then a signed per-axis byte delta per remaining point; the record
/// spans `size + 13` bytes in total.
fn decode_track(blob: &[u8], voxel_to_mni: &[f32; 16]) -> Result<Tractogram> {
    let mut points: Vec<f32> = Vec::with_capacity(blob.len() / 13 * 3);
    let mut offsets: Vec<u32> = Vec::new();

    let mut pos = 0usize;
    while pos + 4 <= blob.len() {
        let size = LittleEndian::read_u32(&blob[pos..]) as usize;
        if size < 3 {
            return Err(TractoError::BadSignature(format!(
                "tt record of size {} cannot hold a point",
                size
            )));
        }
        let record_end = pos
            .checked_add(size + 13)
            .filter(|&end| end <= blob.len())
            .ok_or(TractoError::TruncatedInput {
                format: "tt",
                needed: pos.saturating_add(size + 13),
                got: blob.len(),
            })?;
        let point_count = size / 3;

        offsets.push((points.len() / 3) as u32);

        let mut x = LittleEndian::read_i32(&blob[pos + 4..]);
        let mut y = LittleEndian::read_i32(&blob[pos + 8..]);
        let mut z = LittleEndian::read_i32(&blob[pos + 12..]);
        push_point(&mut points, voxel_to_mni, x, y, z);

        let mut delta = pos + 16;
        for _ in 1..point_count {
            x += blob[delta] as i8 as i32;
            y += blob[delta + 1] as i8 as i32;
            z += blob[delta + 2] as i8 as i32;
            delta += 3;
            push_point(&mut points, voxel_to_mni, x, y, z);
        }

        pos = record_end;
    }

    offsets.push((points.len() / 3) as u32);
    points.shrink_to_fit();
    debug!(
        "tt: {} streamlines, {} vertices",
        offsets.len() - 1,
        points.len() / 3
    );

    Ok(Tractogram {
        points,
        offsets,
        ..Tractogram::default()
    })
}

/// Undo the fixed-point scale and map into world millimetres.
fn push_point(points: &mut Vec<f32>, voxel_to_mni: &[f32; 16], x: i32, y: i32, z: i32) {
    let world = matrix::transform_point_rows(
        voxel_to_mni,
        x as f32 / COORD_SCALE,
        y as f32 / COORD_SCALE,
        z as f32 / COORD_SCALE,
    );
    points.extend_from_slice(&world);
}
