//! Fixed-point money helpers.
//!
//! All monetary amounts in this system use a 1e-6 (micros) fixed-point
//! representation stored as `i64`: 1 USD = 1_000_000. Non-monetary
//! quantities (share counts, contract counts, bar indices) remain plain
//! integers at scale 1.
//!
//! Analytic layers (features, Greeks, weights) work in `f64`; the two
//! conversion functions here are the only sanctioned crossing points so
//! that rounding happens in exactly one place.

/// 1 USD in micros.
pub const MICROS_SCALE: i64 = 1_000_000;

/// Convert a micros amount to `f64` dollars.
#[inline]
pub fn to_f64(micros: i64) -> f64 {
    micros as f64 / MICROS_SCALE as f64
}

/// Convert `f64` dollars to micros, rounding half away from zero.
///
/// Saturates at `i64::MAX` / `i64::MIN` for non-finite or out-of-range
/// inputs; callers validating upstream never hit the clamp.
#[inline]
pub fn from_f64(dollars: f64) -> i64 {
    let scaled = dollars * MICROS_SCALE as f64;
    if scaled >= i64::MAX as f64 {
        i64::MAX
    } else if scaled <= i64::MIN as f64 {
        i64::MIN
    } else {
        scaled.round() as i64
    }
}

/// Multiply a per-unit micros price by an integer quantity.
///
/// Returns `None` on overflow; overflow in a trade-value calculation is a
/// critical error, not a routine saturation, so callers must handle it.
#[inline]
pub fn checked_mul_qty(price_micros: i64, qty: i64) -> Option<i64> {
    price_micros.checked_mul(qty)
}

/// Basis points of `value` (e.g. `bps_of(100 * MICROS_SCALE, 150)` = $1.50).
#[inline]
pub fn bps_of(value_micros: i64, bps: i64) -> i64 {
    ((value_micros as i128 * bps as i128) / 10_000) as i64
}
