//! # tracto-reader
//!
//! A reader for tractography streamline files. Five on-disk encodings
//! (TCK, TRK, VTK legacy POLYDATA, TT, and TRX) decode into one uniform
//! in-memory [`Tractogram`].
//!
//! Each decoder takes an immutable byte buffer and returns either a
//! self-contained `Tractogram` or a typed error; decoders hold no shared
//! state and are safe to call concurrently on distinct buffers. Format
//! selection by file extension is left to the caller.
pub mod tracto;

// Re-export the main types for convenience
pub use tracto::{
    decode_tck, decode_trk, decode_trx, decode_tt, decode_vtk, Result, TractoError, Tractogram,
};
