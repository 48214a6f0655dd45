//! Numeric helpers shared by the formulas and the engine.
//!
//! The simulation computes with `f64` and converts to integers with
//! [`floor_u64`]/[`floor_i64`] before any value touches world state.

/// Clamp `value` into `[min, max]`.
#[inline]
pub fn within(value: f64, min: f64, max: f64) -> f64 {
    value.max(min).min(max)
}

/// Floor a non-negative quantity into an unsigned integer.
///
/// Negative and NaN inputs map to zero.
#[inline]
pub fn floor_u64(value: f64) -> u64 {
    if value.is_nan() || value <= 0.0 {
        0
    } else {
        value.floor() as u64
    }
}

/// Floor a signed quantity into an integer.
#[inline]
pub fn floor_i64(value: f64) -> i64 {
    if value.is_nan() {
        0
    } else {
        value.floor() as i64
    }
}
