//! Custom error types for the tracto-reader crate.

use thiserror::Error;

/// The primary error type for all decode operations in this crate.
#[derive(Debug, Error)]
pub enum TractoError {
    /// The input buffer is smaller than the format's minimum or a declared
    /// section runs past the end of the buffer.
    #[error("truncated {format} input: need at least {needed} bytes, got {got}")]
    TruncatedInput {
        format: &'static str,
        needed: usize,
        got: usize,
    },

    /// A magic number or structural signature did not match the format.
    #[error("bad signature: {0}")]
    BadSignature(String),

    /// The file is a recognised format but a variant this crate does not
    /// decode (e.g. ASCII VTK, imaginary MAT values, non-POLYDATA datasets).
    #[error("unsupported variant: {0}")]
    UnsupportedVariant(String),

    /// A field the format requires is absent.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A vertex index points beyond the point table.
    #[error("vertex index {index} out of bounds for {limit} points")]
    IndexOutOfBounds { index: u32, limit: u32 },

    /// A 64-bit source value does not fit the 32-bit index space used by
    /// the in-memory model.
    #[error("64-bit value with high word {high:#x} exceeds the 32-bit index space")]
    NumericOverflow { high: u32 },

    /// An archive entry uses a compression method other than stored or deflate.
    #[error("unsupported archive compression method {0}")]
    UnsupportedCompression(u16),

    /// The zip container is structurally invalid.
    #[error("corrupt archive: {0}")]
    CorruptArchive(String),

    /// The decompression primitive rejected its input.
    #[error("decompression failed: {0}")]
    Decompression(String),

    /// The TRX `header.json` blob is not valid JSON.
    #[error("invalid header.json: {0}")]
    HeaderJson(#[from] serde_json::Error),
}

/// A convenience `Result` type alias using the crate's `TractoError` type.
pub type Result<T> = std::result::Result<T, TractoError>;
