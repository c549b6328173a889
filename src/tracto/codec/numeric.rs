//! Numeric conversions absent from the in-memory model: half-precision
//! floats and 64-bit integers.

use std::sync::LazyLock;

use crate::tracto::types::error::{Result, TractoError};

/// All 65536 half-precision bit patterns, expanded once on first use.
///
/// TRX `float16` arrays can run to millions of elements, so the per-value
/// decode is a table lookup rather than a bit-fiddling round trip.
static HALF_TABLE: LazyLock<Vec<f32>> =
    LazyLock::new(|| (0..=u16::MAX).map(decode_half).collect());

/// Expand an IEEE-754 half-precision bit pattern to `f32`.
pub fn expand_half(bits: u16) -> f32 {
    HALF_TABLE[bits as usize]
}

/// Bit-level half-precision decode backing [`expand_half`].
///
/// Sign in bit 15, exponent in bits 14-10, mantissa in bits 9-0.
fn decode_half(bits: u16) -> f32 {
    let sign = if bits & 0x8000 != 0 { -1.0f32 } else { 1.0 };
    let exponent = ((bits >> 10) & 0x1F) as i32;
    let mantissa = (bits & 0x3FF) as f32;
    match exponent {
        // Subnormal range (exponent bits all zero)
        0 => sign * (mantissa / 1024.0) * 2.0f32.powi(-14),
        // Infinity or NaN (exponent bits all one)
        31 => {
            if mantissa == 0.0 {
                sign * f32::INFINITY
            } else {
                f32::NAN
            }
        }
        e => sign * (1.0 + mantissa / 1024.0) * 2.0f32.powi(e - 15),
    }
}

/// Narrow a 64-bit value, given as two little-endian 32-bit words, into the
/// 32-bit index space the rest of the system uses.
///
/// Returns the low word when the high word is zero; any nonzero high word is
/// a [`TractoError::NumericOverflow`], never a silent truncation.
pub fn narrow_u64(lo: u32, hi: u32) -> Result<u32> {
    if hi != 0 {
        return Err(TractoError::NumericOverflow { high: hi });
    }
    Ok(lo)
}
