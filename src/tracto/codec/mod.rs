//! Pure data transformation: decompression wrappers and numeric conversion.

pub mod compression;
pub mod numeric;
