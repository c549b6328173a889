//! One decoder module per wire format.
//!
//! Each decoder is a pure function over an immutable byte buffer producing
//! an owned [`Tractogram`](crate::tracto::types::models::Tractogram); none
//! depends on another. TRX drives the
//! [`archive`](crate::tracto::archive) reader and TT the
//! [`matv4`](crate::tracto::matv4) reader.

pub mod tck;
pub mod tt;
pub mod trk;
pub mod trx;
pub mod vtk;
