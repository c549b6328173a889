//! The uniform in-memory representation produced by every decoder.

use std::collections::HashMap;

/// A decoded tractogram: a set of streamlines in world (scanner) space plus
/// any attributes the source file carried.
///
/// All five decoders produce this one shape, so downstream visualisation and
/// analysis code never needs to know which wire format a file used.
///
/// # Layout
/// - `points` is a flat `x,y,z,x,y,z,...` sequence in millimetres; its
///   length is `3 * vertex_count()`.
/// - `offsets` is fence-posted: one more entry than there are streamlines,
///   `offsets[0] == 0`, non-decreasing, and the final entry equals the total
///   vertex count. Streamline `i` occupies vertex indices
///   `offsets[i] .. offsets[i + 1]` (multiply by 3 to index `points`).
#[derive(Debug, Default)]
pub struct Tractogram {
    /// Flat vertex coordinates in millimetres, world space.
    pub points: Vec<f32>,
    /// Fence-posted streamline start indices (vertex indices, not float indices).
    pub offsets: Vec<u32>,
    /// Named scalar arrays aligned with vertices (`len == vertex_count()`).
    pub per_vertex: HashMap<String, Vec<f32>>,
    /// Named scalar arrays aligned with streamlines (`len == streamline_count()`).
    pub per_streamline: HashMap<String, Vec<f32>>,
    /// Named group arrays (TRX only). Lengths are format-defined and opaque;
    /// no alignment with vertices or streamlines is implied.
    pub per_group: HashMap<String, Vec<f32>>,
    /// Opaque structured metadata (TRX `header.json`), passed through verbatim.
    pub header: Option<serde_json::Value>,
}

impl Tractogram {
    /// Total number of vertices across all streamlines.
    pub fn vertex_count(&self) -> usize {
        self.points.len() / 3
    }

    /// Number of streamlines.
    pub fn streamline_count(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// The flat coordinate slice of streamline `i`, or `None` when `i` is
    /// out of range.
    pub fn streamline(&self, i: usize) -> Option<&[f32]> {
        let start = *self.offsets.get(i)? as usize * 3;
        let end = *self.offsets.get(i + 1)? as usize * 3;
        self.points.get(start..end)
    }
}
