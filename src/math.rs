//! Numeric utilities for the orientation filter

use crate::types::Normalization;

/// Mathematical constants
pub const DEG_TO_RAD: f32 = core::f32::consts::PI / 180.0;
pub const RAD_TO_DEG: f32 = 180.0 / core::f32::consts::PI;

/// Magic constant for the bit-level initial guess
const INV_SQRT_MAGIC: u32 = 0x5f37_5a86;

/// Fast approximate inverse square root
///
/// Reinterprets the float's bits as an integer, derives an initial guess as
/// `magic - (bits >> 1)` and applies one Newton-Raphson step. Branch-free,
/// no division and no library square root.
///
/// Worst-case relative error against `1 / sqrt(x)` is below 0.2% for positive
/// normal inputs. Zero, negative and non-finite inputs give meaningless
/// results; callers guard them.
///
/// # Example
/// ```
/// use madgwick_attitude::fast_inverse_sqrt;
///
/// let y = fast_inverse_sqrt(4.0);
/// assert!((y - 0.5).abs() < 0.001);
/// ```
pub fn fast_inverse_sqrt(x: f32) -> f32 {
    let half_x = 0.5 * x;
    let y = f32::from_bits(INV_SQRT_MAGIC.wrapping_sub(x.to_bits() >> 1));

    // One Newton-Raphson iteration
    y * (1.5 - half_x * y * y)
}

/// Inverse square root through libm, for targets where the bit-level approximation is unwanted
pub fn exact_inverse_sqrt(x: f32) -> f32 {
    1.0 / libm::sqrtf(x)
}

/// Inverse square root with the selected implementation
#[inline]
pub fn inverse_sqrt(x: f32, normalization: Normalization) -> f32 {
    match normalization {
        Normalization::Fast => fast_inverse_sqrt(x),
        Normalization::Exact => exact_inverse_sqrt(x),
    }
}
