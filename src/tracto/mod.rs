//! Core tractography reader module.

pub mod archive;
pub mod codec;
pub mod format;
pub mod matrix;
pub mod matv4;
pub mod types;

pub use format::tck::decode_tck;
pub use format::trk::decode_trk;
pub use format::trx::decode_trx;
pub use format::tt::decode_tt;
pub use format::vtk::decode_vtk;
pub use types::error::{Result, TractoError};
pub use types::models::Tractogram;
