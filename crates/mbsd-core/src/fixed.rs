//! Fixed-Point Math Kernel
//!
//! Scalar Q-format arithmetic for integer-only processors. A Qm.n number is a
//! two's-complement integer scaled by 2^n: `m` integer bits, `n` fractional
//! bits and one sign bit. The machine only ever sees integers; keeping the
//! results meaningful in the chosen Q format is the caller's job.
//!
//! ## Rounding
//!
//! Every multiply and divide rounds half away from zero at the target
//! fixed-point position. Half an LSB (`ROUNDING_BIAS[shift]`) is added to a
//! non-negative intermediate and subtracted from a negative one, then the
//! value is arithmetic-shifted right. The shift floors, so a negative result
//! can land one LSB further from zero than its positive mirror:
//!
//! ```text
//!  mul_round( 1, 1, 2) = ( 1 + 2) >> 2 =  0
//!  mul_round(-1, 1, 2) = (-1 - 2) >> 2 = -1
//! ```
//!
//! ## Contracts
//!
//! Argument checks are the caller's responsibility so that the per-sample path
//! stays cheap. A shift above [`MAX_SHIFT`] or a zero divisor is a defect in
//! the caller and panics. The `checked_*` variants report the same conditions
//! as [`FixedPointError`] for callers that cannot prove them statically.
//!
//! ## Example
//!
//! ```rust
//! use mbsd_core::fixed::{div_round, mul_round, ONE14};
//!
//! // 0.5 * 0.5 in Q14
//! assert_eq!(mul_round(ONE14 / 2, ONE14 / 2, 14), (ONE14 / 4) as i32);
//!
//! // 1 / 4 in Q14
//! assert_eq!(div_round(1, 4, 14), ONE14 / 4);
//! ```

use crate::error::FixedPointError;

/// Largest positive 16-bit fixed-point value.
pub const MAX_FX: i16 = 0x7fff;
/// Most negative 16-bit fixed-point value.
pub const MIN_FX: i16 = i16::MIN;
/// Pre-shift applied to 16-bit dividends before integer division.
pub const N16: u16 = 16;
/// Fractional bits of the Q14 working format.
pub const N14: u16 = 14;
/// 1.0 in Q14.
pub const ONE14: i16 = 0x4000;
/// 1.0 in Q12.
pub const ONE12: i16 = 0x1000;
/// Fractional bits of the wide reciprocal format.
pub const N24: u16 = 24;
/// 1.0 in Q24.
pub const ONE24: u32 = 1 << 24;
/// Largest supported right shift.
pub const MAX_SHIFT: u16 = 24;

/// Half-LSB rounding bias for each right shift, `0` for no shift.
pub const ROUNDING_BIAS: [u32; 25] = [
    0x0000, 0x0001, 0x0002, 0x0004, 0x0008, 0x0010, 0x0020, 0x0040, 0x0080, // 0..8
    0x0100, 0x0200, 0x0400, 0x0800, 0x1000, 0x2000, 0x4000, 0x8000, // 9..16
    0x1_0000, 0x2_0000, 0x4_0000, 0x8_0000, // 17..20
    0x10_0000, 0x20_0000, 0x40_0000, 0x80_0000, // 21..24
];

#[inline]
fn rounding_bias(shift: u16) -> u32 {
    assert!(
        shift <= MAX_SHIFT,
        "fixed-point shift {} out of range (max {})",
        shift,
        MAX_SHIFT
    );
    ROUNDING_BIAS[shift as usize]
}

/// Apply the sign-aware bias and shift right. Intermediates are widened to
/// 64 bits so the bias can never overflow.
#[inline]
fn round_i64(value: i64, shift: u16) -> i64 {
    let bias = rounding_bias(shift) as i64;
    if value >= 0 {
        (value + bias) >> shift
    } else {
        (value - bias) >> shift
    }
}

#[inline]
fn division_shift(shift: u16) -> u16 {
    assert!(
        shift <= N16,
        "fixed-point division shift {} out of range (max {})",
        shift,
        N16
    );
    N16 - shift
}

/// Signed 16 x signed 16 multiply with rounding, scaled down by `shift`.
#[inline]
pub fn mul_round(a: i16, b: i16, shift: u16) -> i32 {
    round_i64(a as i64 * b as i64, shift) as i32
}

/// Unsigned 16 x signed 16 multiply with rounding, scaled down by `shift`.
#[inline]
pub fn mul_round_us(a: u16, b: i16, shift: u16) -> i32 {
    round_i64(a as i64 * b as i64, shift) as i32
}

/// Unsigned 16 x unsigned 16 multiply with rounding, scaled down by `shift`.
#[inline]
pub fn mul_round_uu(a: u16, b: u16, shift: u16) -> u32 {
    let bias = rounding_bias(shift) as u64;
    ((a as u64 * b as u64 + bias) >> shift) as u32
}

/// Unsigned 32 x unsigned 32 multiply through a 64-bit intermediate.
///
/// Used where the product magnitude exceeds 32 bits before scaling. The
/// result is truncated to 32 bits after the shift.
#[inline]
pub fn mul_round_u64(a: u32, b: u32, shift: u16) -> u32 {
    let bias = rounding_bias(shift) as u64;
    ((a as u64 * b as u64 + bias) >> shift) as u32
}

/// Signed 16 / signed 16 division producing a rounded value with `shift`
/// fractional bits.
///
/// The dividend is pre-shifted by 16 bits so integer division keeps its
/// fractional part, then the quotient is rounded back down by `16 - shift`.
///
/// # Panics
///
/// Panics when `divisor == 0` or `shift > 16`.
#[inline]
pub fn div_round(dividend: i16, divisor: i16, shift: u16) -> i16 {
    assert!(divisor != 0, "fixed-point division by zero");
    let down = division_shift(shift);
    let quotient = ((dividend as i64) << N16) / divisor as i64;
    round_i64(quotient, down) as i16
}

/// Signed 32 / signed 16 division for a dividend that is already wide.
///
/// Identical to [`div_round`] without the 16-bit pre-shift: the dividend is
/// expected to carry its own 16 extra fractional bits.
///
/// # Panics
///
/// Panics when `divisor == 0` or `shift > 16`.
#[inline]
pub fn div_round_wide(dividend: i32, divisor: i16, shift: u16) -> i16 {
    assert!(divisor != 0, "fixed-point division by zero");
    let down = division_shift(shift);
    let quotient = dividend as i64 / divisor as i64;
    round_i64(quotient, down) as i16
}

/// [`mul_round`] that reports an out-of-range shift instead of panicking.
pub fn checked_mul_round(a: i16, b: i16, shift: u16) -> Result<i32, FixedPointError> {
    if shift > MAX_SHIFT {
        return Err(FixedPointError::ShiftOutOfRange {
            shift,
            max: MAX_SHIFT,
        });
    }
    Ok(mul_round(a, b, shift))
}

/// [`div_round`] that reports contract violations instead of panicking.
pub fn checked_div_round(dividend: i16, divisor: i16, shift: u16) -> Result<i16, FixedPointError> {
    if divisor == 0 {
        return Err(FixedPointError::DivisionByZero);
    }
    if shift > N16 {
        return Err(FixedPointError::ShiftOutOfRange { shift, max: N16 });
    }
    Ok(div_round(dividend, divisor, shift))
}

/// [`div_round_wide`] that reports contract violations instead of panicking.
pub fn checked_div_round_wide(
    dividend: i32,
    divisor: i16,
    shift: u16,
) -> Result<i16, FixedPointError> {
    if divisor == 0 {
        return Err(FixedPointError::DivisionByZero);
    }
    if shift > N16 {
        return Err(FixedPointError::ShiftOutOfRange { shift, max: N16 });
    }
    Ok(div_round_wide(dividend, divisor, shift))
}

/// Number of extra right shifts needed for a Q14 magnitude to fit in 14 bits.
///
/// Counts how many halvings of `|value| >> 14` it takes to reach zero. A
/// value already inside `(-2^14, 2^14)` needs none.
pub fn required_shift_q14(value: i32) -> u16 {
    let mut rest = value.unsigned_abs() >> N14;
    let mut shift = 0;
    while rest > 0 {
        rest >>= 1;
        shift += 1;
    }
    shift
}

/// Round `value` to `shift` fewer fractional bits.
#[inline]
pub fn round_shift(value: i32, shift: u16) -> i32 {
    round_i64(value as i64, shift) as i32
}

/// Multiply a wide accumulator by a Q14 coefficient without overflowing.
///
/// When the full product fits in 32 bits it is rounded back to the
/// accumulator's scale directly. Otherwise the accumulator is first
/// normalised into 14 bits with [`required_shift_q14`], multiplied through
/// the 16-bit kernel and shifted back up, trading low-order precision for
/// range. The result saturates at the `i32` limits.
pub fn scale_q14(value: i32, coeff_q14: i16) -> i32 {
    if let Some(product) = value.checked_mul(coeff_q14 as i32) {
        return round_shift(product, N14);
    }
    let shift = required_shift_q14(value);
    let narrowed = round_shift(value, shift) as i16;
    let product = mul_round(narrowed, coeff_q14, N14) as i64;
    saturate_i32(product << shift)
}

/// Q14 reciprocal of a window width, `round(2^14 / width)`.
///
/// # Panics
///
/// Panics when `width` is zero or does not fit in `i16`.
pub fn reciprocal_q14(width: usize) -> i16 {
    assert!(
        width > 0 && width <= MAX_FX as usize,
        "window width {} out of range",
        width
    );
    div_round(1, width as i16, N14)
}

/// Q24 reciprocal of a window width, `round(2^24 / width)`.
///
/// Fine enough that `scale_q24(W * v, reciprocal_q24(W))` recovers every
/// `i16` value `v` exactly for the window widths used here.
///
/// # Panics
///
/// Panics when `width` is zero.
pub fn reciprocal_q24(width: usize) -> u32 {
    assert!(width > 0, "window width {} out of range", width);
    let width = width as u64;
    ((ONE24 as u64 + width / 2) / width) as u32
}

/// Multiply a 32-bit accumulator by a Q24 coefficient of at most 1.0.
///
/// The magnitude goes through [`mul_round_u64`] and the sign is restored
/// afterwards, so positive and negative inputs round symmetrically.
/// Coefficients above `ONE24` are clamped to it.
pub fn scale_q24(value: i32, coeff_q24: u32) -> i32 {
    let magnitude = mul_round_u64(value.unsigned_abs(), coeff_q24.min(ONE24), N24) as i64;
    saturate_i32(if value < 0 { -magnitude } else { magnitude })
}

/// Clamp a 32-bit value into the 16-bit range.
#[inline]
pub fn saturate_i16(value: i32) -> i16 {
    value.clamp(MIN_FX as i32, MAX_FX as i32) as i16
}

#[inline]
fn saturate_i32(value: i64) -> i32 {
    value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/// Integer square root, `floor(sqrt(value))`.
pub fn isqrt(value: u64) -> u32 {
    let mut rem = value;
    let mut root = 0u64;
    let mut bit = 1u64 << 62;

    while bit > rem {
        bit >>= 2;
    }
    while bit != 0 {
        if rem >= root + bit {
            rem -= root + bit;
            root = (root >> 1) + bit;
        } else {
            root >>= 1;
        }
        bit >>= 2;
    }

    root as u32
}
