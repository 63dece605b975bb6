//! Exact rational helpers
//!
//! Configuration values arrive as JSON decimals (`0.05`, `-1.0`). They are
//! converted through their shortest decimal spelling, so `0.05` becomes
//! exactly 1/20 rather than the nearest binary fraction.

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};

/// Integer as a rational
pub fn int(value: impl Into<BigInt>) -> BigRational {
    BigRational::from_integer(value.into())
}

/// `numer / denom` as a rational
pub fn frac(numer: i64, denom: i64) -> BigRational {
    BigRational::new(BigInt::from(numer), BigInt::from(denom))
}

/// Exact value of the decimal a float was written as. `None` for NaN/infinity.
pub fn decimal_ratio(value: f64) -> Option<BigRational> {
    if !value.is_finite() {
        return None;
    }
    // Display for f64 never uses exponent notation and round-trips exactly
    let text = value.to_string();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.as_str()),
    };
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));

    let numer: BigInt = format!("{whole}{fraction}").parse().ok()?;
    let denom = num_traits::pow(BigInt::from(10), fraction.len());
    let ratio = BigRational::new(numer, denom);
    Some(if negative { -ratio } else { ratio })
}

/// Lossy conversion for display
pub fn to_f64(value: &BigRational) -> f64 {
    value.to_f64().unwrap_or(f64::NAN)
}

/// Round half away from zero to a whole number of coins
pub fn round_coins(value: &BigRational) -> BigInt {
    value.round().to_integer()
}

/// Render with exactly `decimals` places, rounding half away from zero.
/// The flag is `true` when the rendering is exact.
pub fn format_fixed(value: &BigRational, decimals: usize) -> (String, bool) {
    let scale = int(num_traits::pow(BigInt::from(10), decimals));
    let scaled = value * &scale;
    let rounded = scaled.round();
    let exact = rounded == scaled;

    let n = rounded.to_integer();
    let sign = if n.is_negative() { "-" } else { "" };
    let n = n.abs();
    let unit = num_traits::pow(BigInt::from(10), decimals);
    let whole = &n / &unit;
    let part = &n % &unit;

    let text = if decimals == 0 {
        format!("{sign}{whole}")
    } else {
        format!("{sign}{whole}.{:0>width$}", part.to_string(), width = decimals)
    };
    (text, exact)
}

/// Render a probability or RTP ratio as a percentage with four decimals.
///
/// - exact values: `"96.5000%"`
/// - values that do not round cleanly: `"~33.3333%"`
/// - non-zero values below display resolution: `"<0.0001%"`
pub fn format_percent(ratio: &BigRational) -> String {
    let percent = ratio * int(100);
    if percent.is_zero() {
        return "0.0000%".to_string();
    }
    let resolution = frac(1, 10_000);
    if percent.abs() < resolution {
        let sign = if percent.is_negative() { "-" } else { "" };
        return format!("<{sign}0.0001%");
    }
    let (text, exact) = format_fixed(&percent, 4);
    if exact {
        format!("{text}%")
    } else {
        format!("~{text}%")
    }
}

/// `1` as a rational
pub fn one() -> BigRational {
    BigRational::one()
}

/// `0` as a rational
pub fn zero() -> BigRational {
    BigRational::zero()
}
