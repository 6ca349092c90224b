//! Scaled decimal values: `mantissa * 10^exponent`.
//!
//! The exponent `i8::MIN` is reserved for sentinels:
//!
//! | mantissa | value     |
//! |----------|-----------|
//! | `0`      | NaN       |
//! | `1`      | +Infinity |
//! | `-1`     | -Infinity |

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::BlockError;
use crate::field::FieldType;

const SPECIAL_EXPONENT: i8 = i8::MIN;

/// A decimal number stored as a 64-bit mantissa and a base-10 exponent.
#[derive(Debug, Clone, Copy)]
pub struct Decimal {
    mantissa: i64,
    exponent: i8,
}

impl Decimal {
    /// Zero.
    pub const ZERO: Decimal = Decimal::new(0, 0);
    /// Not-a-number. Absorbs every addition.
    pub const NAN: Decimal = Decimal::from_raw_parts(0, SPECIAL_EXPONENT);
    /// Positive infinity.
    pub const POSITIVE_INFINITY: Decimal = Decimal::from_raw_parts(1, SPECIAL_EXPONENT);
    /// Negative infinity.
    pub const NEGATIVE_INFINITY: Decimal = Decimal::from_raw_parts(-1, SPECIAL_EXPONENT);
    /// Lower bound of the decimal domain.
    pub const MIN: Decimal = Decimal::NEGATIVE_INFINITY;
    /// Upper bound of the decimal domain.
    pub const MAX: Decimal = Decimal::POSITIVE_INFINITY;

    /// Creates a finite decimal.
    ///
    /// `exponent` must not be `i8::MIN`; that value is reserved for sentinels and
    /// is clamped to `i8::MIN + 1`.
    pub const fn new(mantissa: i64, exponent: i8) -> Self {
        let exponent = if exponent == SPECIAL_EXPONENT {
            SPECIAL_EXPONENT + 1
        } else {
            exponent
        };
        Self { mantissa, exponent }
    }

    /// Creates a decimal from its stored representation, sentinels included.
    pub const fn from_raw_parts(mantissa: i64, exponent: i8) -> Self {
        Self { mantissa, exponent }
    }

    /// Returns the stored mantissa.
    pub fn mantissa(&self) -> i64 {
        self.mantissa
    }

    /// Returns the stored exponent.
    pub fn exponent(&self) -> i8 {
        self.exponent
    }

    /// Returns true for NaN.
    pub fn is_nan(&self) -> bool {
        self.exponent == SPECIAL_EXPONENT && self.mantissa == 0
    }

    /// Returns true for either infinity.
    pub fn is_infinite(&self) -> bool {
        self.exponent == SPECIAL_EXPONENT && self.mantissa != 0
    }

    /// Returns true for ordinary numbers.
    pub fn is_finite(&self) -> bool {
        self.exponent != SPECIAL_EXPONENT
    }

    /// Returns true for a finite zero of any exponent.
    pub fn is_zero(&self) -> bool {
        self.is_finite() && self.mantissa == 0
    }

    /// Returns true if the raw parts form a valid sentinel or finite value.
    pub(crate) fn is_well_formed(&self) -> bool {
        self.is_finite() || (-1..=1).contains(&self.mantissa)
    }

    /// Approximates the value as an `f64`.
    pub fn to_f64(&self) -> f64 {
        if self.is_nan() {
            f64::NAN
        } else if self.is_infinite() {
            if self.mantissa > 0 {
                f64::INFINITY
            } else {
                f64::NEG_INFINITY
            }
        } else {
            self.mantissa as f64 * 10f64.powi(self.exponent as i32)
        }
    }

    /// Returns the additive inverse.
    pub fn negated(&self) -> Self {
        if self.is_nan() {
            *self
        } else {
            Self::from_raw_parts(self.mantissa.wrapping_neg(), self.exponent)
        }
    }

    /// Adds `other` in place, rescaling to the smaller exponent.
    ///
    /// NaN absorbs: if either operand is NaN the result is NaN. Infinity absorbs
    /// finite operands, and opposite infinities produce NaN.
    pub fn add(&mut self, other: &Decimal) {
        if self.is_nan() || other.is_nan() {
            *self = Self::NAN;
            return;
        }
        match (self.is_infinite(), other.is_infinite()) {
            (true, true) => {
                if self.mantissa != other.mantissa {
                    *self = Self::NAN;
                }
            }
            (true, false) => {}
            (false, true) => *self = *other,
            (false, false) => self.add_finite(other.mantissa, other.exponent),
        }
    }

    /// Subtracts `other` in place.
    ///
    /// When `self` is NaN this performs `add(other)` instead of a subtraction.
    /// Existing blocks were written with that rule, so it is kept as-is.
    pub fn subtract(&mut self, other: &Decimal) {
        if self.is_nan() {
            self.add(other);
            return;
        }
        self.add(&other.negated());
    }

    fn add_finite(&mut self, mantissa: i64, exponent: i8) {
        let delta = self.exponent as i32 - exponent as i32;
        match delta.cmp(&0) {
            Ordering::Equal => {
                self.mantissa = self.mantissa.wrapping_add(mantissa);
            }
            Ordering::Less => {
                let scaled = mantissa.wrapping_mul(pow10(delta.unsigned_abs()));
                self.mantissa = self.mantissa.wrapping_add(scaled);
            }
            Ordering::Greater => {
                let scaled = self.mantissa.wrapping_mul(pow10(delta.unsigned_abs()));
                self.mantissa = scaled.wrapping_add(mantissa);
                self.exponent = exponent;
            }
        }
    }

    /// Orders decimals by their `f64` approximation, NaN last.
    ///
    /// Distinct values closer together than `f64` precision compare equal.
    pub fn total_cmp(&self, other: &Decimal) -> Ordering {
        self.to_f64().total_cmp(&other.to_f64())
    }
}

fn pow10(exp: u32) -> i64 {
    10i64.wrapping_pow(exp)
}

impl Default for Decimal {
    fn default() -> Self {
        Self::ZERO
    }
}

impl PartialEq for Decimal {
    /// Numeric equality: `125e-1 == 1250e-2`. Sentinels compare by identity.
    fn eq(&self, other: &Self) -> bool {
        if !self.is_finite() || !other.is_finite() {
            return self.mantissa == other.mantissa && self.exponent == other.exponent;
        }
        let (mut a, mut b) = (self.mantissa as i128, other.mantissa as i128);
        let delta = self.exponent as i32 - other.exponent as i32;
        if delta.unsigned_abs() >= 19 {
            // Scaling a non-zero i64 by 10^19 leaves the i64 range.
            return a == 0 && b == 0;
        }
        let scale = 10i128.pow(delta.unsigned_abs());
        if delta > 0 {
            a *= scale;
        } else {
            b *= scale;
        }
        a == b
    }
}

impl Eq for Decimal {}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nan() {
            return f.write_str("NaN");
        }
        if self.is_infinite() {
            return f.write_str(if self.mantissa > 0 {
                "Infinity"
            } else {
                "-Infinity"
            });
        }

        let sign = if self.mantissa < 0 { "-" } else { "" };
        let digits = self.mantissa.unsigned_abs().to_string();
        if self.exponent >= 0 {
            if self.exponent <= 18 {
                let zeros = "0".repeat(self.exponent as usize);
                write!(f, "{sign}{digits}{zeros}")
            } else {
                write!(f, "{sign}{digits}e{}", self.exponent)
            }
        } else {
            let scale = self.exponent.unsigned_abs() as usize;
            let padded = if digits.len() <= scale {
                format!("{}{}", "0".repeat(scale + 1 - digits.len()), digits)
            } else {
                digits
            };
            let (int_part, frac_part) = padded.split_at(padded.len() - scale);
            write!(f, "{sign}{int_part}.{frac_part}")
        }
    }
}

impl FromStr for Decimal {
    type Err = BlockError;

    /// Parses `12.5`, `-0.001`, `1.5e3`, `NaN`, `Infinity` and `-Infinity`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BlockError::InvalidLiteral {
            literal: s.to_string(),
            target: FieldType::Decimal,
        };
        let text = s.trim();
        match text {
            "NaN" | "nan" => return Ok(Self::NAN),
            "Infinity" | "+Infinity" | "inf" | "+inf" => return Ok(Self::POSITIVE_INFINITY),
            "-Infinity" | "-inf" => return Ok(Self::NEGATIVE_INFINITY),
            _ => {}
        }

        let (number, exp_part) = match text.find(['e', 'E']) {
            Some(pos) => (&text[..pos], Some(&text[pos + 1..])),
            None => (text, None),
        };
        let exponent: i32 = match exp_part {
            Some(e) => e.parse().map_err(|_| invalid())?,
            None => 0,
        };

        let (int_part, frac_part) = match number.split_once('.') {
            Some((i, f)) => (i, f),
            None => (number, ""),
        };
        if !frac_part.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let unsigned = int_part.trim_start_matches(['-', '+']);
        if unsigned.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }

        let digits = format!("{int_part}{frac_part}");
        let mantissa: i64 = match digits.as_str() {
            "-" | "+" => 0,
            d => d.parse().map_err(|_| invalid())?,
        };
        let exponent = exponent - frac_part.len() as i32;
        let exponent = i8::try_from(exponent)
            .ok()
            .filter(|&e| e != SPECIAL_EXPONENT)
            .ok_or_else(invalid)?;
        Ok(Self::new(mantissa, exponent))
    }
}
