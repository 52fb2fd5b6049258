//! Checked scalar conversions and arithmetic.

use crate::{IntDomain, RtError, RtResult, Str};
use kiln_rts_alloc::Heap;

/// Render a signed integer in decimal.
pub fn i64_to_str(heap: &Heap, value: i64) -> RtResult<Str> {
    Str::from_bytes(heap, value.to_string().as_bytes())
}

/// Render a byte in decimal.
pub fn u8_to_str(heap: &Heap, value: u8) -> RtResult<Str> {
    i64_to_str(heap, i64::from(value))
}

/// Narrow an `I64` to a `U8`.
pub fn u8_from_i64(value: i64) -> RtResult<u8> {
    if value < 0 {
        return Err(RtError::overflow(
            IntDomain::U8,
            "Negative values cannot be cast into 'U8'",
        ));
    }
    u8::try_from(value).map_err(|_| {
        RtError::overflow(
            IntDomain::U8,
            format!("U8: cannot be casted from an I64 greater than: {}", u8::MAX),
        )
    })
}

/// Parse a decimal string as a `U8`.
pub fn u8_from_str(s: &Str) -> RtResult<u8> {
    u8_from_i64(s.to_i64())
}

/// Add two bytes, failing instead of wrapping.
pub fn u8_add(a: u8, b: u8) -> RtResult<u8> {
    u8_from_i64(i64::from(a) + i64::from(b))
}

/// Integer division truncating towards zero.
pub fn safe_div(a: i64, b: i64) -> RtResult<i64> {
    if b == 0 {
        return Err(RtError::divide_by_zero(format!("safe_div: {a} / 0")));
    }
    a.checked_div(b)
        .ok_or_else(|| RtError::overflow(IntDomain::I64, format!("safe_div: {a} / {b} overflows")))
}

/// Remainder with the sign of the dividend.
pub fn safe_rem(a: i64, b: i64) -> RtResult<i64> {
    if b == 0 {
        return Err(RtError::divide_by_zero(format!("safe_rem: {a} % 0")));
    }
    a.checked_rem(b)
        .ok_or_else(|| RtError::overflow(IntDomain::I64, format!("safe_rem: {a} % {b} overflows")))
}
