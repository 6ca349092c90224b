//! Typed scalar values stored in record columns.
//!
//! A [`Field`] is a closed tagged union over the supported column types. Every
//! variant provides:
//!
//! - a zero value and immutable minimum / maximum sentinels
//! - in-place `add` / `subtract`, used to compute and apply record deltas
//! - a total order used by block pruning
//! - a binary codec whose [`Field::serialized_size`] exactly predicts the bytes
//!   written by [`Field::write_to`]
//!
//! ## Binary Layout
//!
//! | Variant     | Encoding                                      |
//! |-------------|-----------------------------------------------|
//! | `Byte`      | zig-zag varint                                |
//! | `Integer`   | zig-zag varint                                |
//! | `Long`      | zig-zag varint                                |
//! | `Decimal`   | zig-zag varint mantissa, then exponent (i8)   |
//! | `Timestamp` | zig-zag varint raw value (unit from the type) |

pub mod decimal;
pub mod range;
pub mod timestamp;

use std::cmp::Ordering;
use std::fmt;

use bytes::{Buf, BufMut};
use chrono::TimeZone;

use crate::codec::varint::{read_signed_varint, signed_varint_len, write_signed_varint};
use crate::error::{BlockError, Result};

pub use decimal::Decimal;
pub use range::FieldRange;
pub use timestamp::TimeUnit;

/// The type of a [`Field`], as declared by a record layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// Small integer column.
    Byte,
    /// 32-bit integer column.
    Integer,
    /// 64-bit integer column.
    Long,
    /// Scaled decimal column.
    Decimal,
    /// Timestamp column with the given resolution.
    Timestamp(TimeUnit),
}

impl FieldType {
    /// Returns true for timestamp columns of any unit.
    pub fn is_timestamp(self) -> bool {
        matches!(self, Self::Timestamp(_))
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Byte => f.write_str("byte"),
            Self::Integer => f.write_str("integer"),
            Self::Long => f.write_str("long"),
            Self::Decimal => f.write_str("decimal"),
            Self::Timestamp(unit) => write!(f, "timestamp[{unit}]"),
        }
    }
}

/// A single typed value.
///
/// Fields are plain values: cloning copies the value, nothing is shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    /// Small integer value.
    Byte(i32),
    /// 32-bit integer value.
    Integer(i32),
    /// 64-bit integer value.
    Long(i64),
    /// Decimal value.
    Decimal(Decimal),
    /// Timestamp value as a count of `unit` ticks since the Unix epoch.
    Timestamp {
        /// Resolution of `raw`.
        unit: TimeUnit,
        /// Ticks since the epoch.
        raw: i64,
    },
}

impl Field {
    /// Returns the zero value of `ty`.
    pub fn zero(ty: FieldType) -> Self {
        match ty {
            FieldType::Byte => Self::Byte(0),
            FieldType::Integer => Self::Integer(0),
            FieldType::Long => Self::Long(0),
            FieldType::Decimal => Self::Decimal(Decimal::ZERO),
            FieldType::Timestamp(unit) => Self::Timestamp { unit, raw: 0 },
        }
    }

    /// Returns the minimum sentinel of `ty`, used as an open lower range bound.
    pub fn min_value(ty: FieldType) -> Self {
        match ty {
            FieldType::Byte => Self::Byte(i32::MIN),
            FieldType::Integer => Self::Integer(i32::MIN),
            FieldType::Long => Self::Long(i64::MIN),
            FieldType::Decimal => Self::Decimal(Decimal::MIN),
            FieldType::Timestamp(unit) => Self::Timestamp {
                unit,
                raw: i64::MIN,
            },
        }
    }

    /// Returns the maximum sentinel of `ty`, used as an open upper range bound.
    pub fn max_value(ty: FieldType) -> Self {
        match ty {
            FieldType::Byte => Self::Byte(i32::MAX),
            FieldType::Integer => Self::Integer(i32::MAX),
            FieldType::Long => Self::Long(i64::MAX),
            FieldType::Decimal => Self::Decimal(Decimal::MAX),
            FieldType::Timestamp(unit) => Self::Timestamp {
                unit,
                raw: i64::MAX,
            },
        }
    }

    /// Creates a timestamp field.
    pub fn timestamp(unit: TimeUnit, raw: i64) -> Self {
        Self::Timestamp { unit, raw }
    }

    /// Returns the type of this field.
    pub fn field_type(&self) -> FieldType {
        match self {
            Self::Byte(_) => FieldType::Byte,
            Self::Integer(_) => FieldType::Integer,
            Self::Long(_) => FieldType::Long,
            Self::Decimal(_) => FieldType::Decimal,
            Self::Timestamp { unit, .. } => FieldType::Timestamp(*unit),
        }
    }

    /// Returns a zero-valued field of the same type.
    pub fn new_instance(&self) -> Self {
        Self::zero(self.field_type())
    }

    /// Copies this value into `target`, which must have the same type.
    pub fn copy_to(&self, target: &mut Field) -> Result<()> {
        self.ensure_same_type(target, "copy")?;
        target.clone_from(self);
        Ok(())
    }

    /// Returns true if this field holds its type's zero value.
    pub fn is_zero(&self) -> bool {
        match self {
            Self::Byte(v) | Self::Integer(v) => *v == 0,
            Self::Long(v) => *v == 0,
            Self::Decimal(d) => d.is_zero(),
            Self::Timestamp { raw, .. } => *raw == 0,
        }
    }

    fn type_error(&self, requested: &'static str) -> BlockError {
        BlockError::TypeConversion {
            stored: self.field_type(),
            requested,
        }
    }

    fn ensure_same_type(&self, other: &Field, requested: &'static str) -> Result<()> {
        if self.field_type() == other.field_type() {
            Ok(())
        } else {
            Err(BlockError::TypeConversion {
                stored: self.field_type(),
                requested,
            })
        }
    }

    // ------------------------------------------------------------------
    // Arithmetic
    // ------------------------------------------------------------------

    /// Adds `other` in place. Both fields must have the same type.
    ///
    /// Integral variants wrap on overflow so `a + (b - a) == b` always holds.
    pub fn add(&mut self, other: &Field) -> Result<()> {
        match (self, other) {
            (Self::Byte(a), Self::Byte(b)) | (Self::Integer(a), Self::Integer(b)) => {
                *a = a.wrapping_add(*b);
            }
            (Self::Long(a), Self::Long(b)) => *a = a.wrapping_add(*b),
            (Self::Decimal(a), Self::Decimal(b)) => a.add(b),
            (Self::Timestamp { unit: ua, raw: a }, Self::Timestamp { unit: ub, raw: b })
                if *ua == *ub =>
            {
                *a = a.wrapping_add(*b);
            }
            (this, _) => return Err(this.type_error("add operand")),
        }
        Ok(())
    }

    /// Subtracts `other` in place. Both fields must have the same type.
    ///
    /// See [`Decimal::subtract`] for the NaN rule.
    pub fn subtract(&mut self, other: &Field) -> Result<()> {
        match (self, other) {
            (Self::Byte(a), Self::Byte(b)) | (Self::Integer(a), Self::Integer(b)) => {
                *a = a.wrapping_sub(*b);
            }
            (Self::Long(a), Self::Long(b)) => *a = a.wrapping_sub(*b),
            (Self::Decimal(a), Self::Decimal(b)) => a.subtract(b),
            (Self::Timestamp { unit: ua, raw: a }, Self::Timestamp { unit: ub, raw: b })
                if *ua == *ub =>
            {
                *a = a.wrapping_sub(*b);
            }
            (this, _) => return Err(this.type_error("subtract operand")),
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Ordering
    // ------------------------------------------------------------------

    /// Compares two fields of the same variant.
    ///
    /// Decimals compare through their `f64` approximation. Timestamps of
    /// different units compare by the instant they denote.
    pub fn compare(&self, other: &Field) -> Result<Ordering> {
        match (self, other) {
            (Self::Byte(a), Self::Byte(b)) | (Self::Integer(a), Self::Integer(b)) => Ok(a.cmp(b)),
            (Self::Long(a), Self::Long(b)) => Ok(a.cmp(b)),
            (Self::Decimal(a), Self::Decimal(b)) => Ok(a.total_cmp(b)),
            (Self::Timestamp { unit: ua, raw: a }, Self::Timestamp { unit: ub, raw: b }) => {
                let a = *a as i128 * ua.nanos_per_unit() as i128;
                let b = *b as i128 * ub.nanos_per_unit() as i128;
                Ok(a.cmp(&b))
            }
            (this, _) => Err(this.type_error("comparison operand")),
        }
    }

    // ------------------------------------------------------------------
    // Narrowing accessors
    // ------------------------------------------------------------------

    /// Reads the value as an `i32`. Only `Byte` and `Integer` qualify.
    pub fn as_i32(&self) -> Result<i32> {
        match self {
            Self::Byte(v) | Self::Integer(v) => Ok(*v),
            _ => Err(self.type_error("i32")),
        }
    }

    /// Reads the value as an `i64`. Decimals do not qualify.
    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Self::Byte(v) | Self::Integer(v) => Ok(i64::from(*v)),
            Self::Long(v) => Ok(*v),
            Self::Timestamp { raw, .. } => Ok(*raw),
            Self::Decimal(_) => Err(self.type_error("i64")),
        }
    }

    /// Reads the value as a decimal. Integral columns widen with exponent 0.
    pub fn as_decimal(&self) -> Result<Decimal> {
        match self {
            Self::Byte(v) | Self::Integer(v) => Ok(Decimal::new(i64::from(*v), 0)),
            Self::Long(v) => Ok(Decimal::new(*v, 0)),
            Self::Decimal(d) => Ok(*d),
            Self::Timestamp { .. } => Err(self.type_error("decimal")),
        }
    }

    /// Approximates the value as an `f64`.
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Byte(v) | Self::Integer(v) => f64::from(*v),
            Self::Long(v) => *v as f64,
            Self::Decimal(d) => d.to_f64(),
            Self::Timestamp { raw, .. } => *raw as f64,
        }
    }

    /// Returns the timestamp in nanoseconds since the epoch.
    pub fn timestamp_nanos(&self) -> Result<i64> {
        match self {
            Self::Timestamp { unit, raw } => Ok(unit.to_nanos(*raw)),
            _ => Err(self.type_error("timestamp")),
        }
    }

    /// Stores an `i32`. Widens into `Long` and `Decimal`; timestamps refuse it.
    pub fn set_i32(&mut self, value: i32) -> Result<()> {
        match self {
            Self::Byte(v) | Self::Integer(v) => *v = value,
            Self::Long(v) => *v = i64::from(value),
            Self::Decimal(d) => *d = Decimal::new(i64::from(value), 0),
            Self::Timestamp { .. } => return Err(self.type_error("i32")),
        }
        Ok(())
    }

    /// Stores an `i64`. `Byte` and `Integer` columns refuse the narrowing.
    pub fn set_i64(&mut self, value: i64) -> Result<()> {
        match self {
            Self::Long(v) => *v = value,
            Self::Timestamp { raw, .. } => *raw = value,
            Self::Decimal(d) => *d = Decimal::new(value, 0),
            Self::Byte(_) | Self::Integer(_) => return Err(self.type_error("i64")),
        }
        Ok(())
    }

    /// Stores a decimal. Only `Decimal` columns accept it.
    pub fn set_decimal(&mut self, value: Decimal) -> Result<()> {
        match self {
            Self::Decimal(d) => *d = value,
            _ => return Err(self.type_error("decimal")),
        }
        Ok(())
    }

    /// Parses `text` into this field, keeping its type.
    ///
    /// Timestamp columns accept quoted date-time literals (interpreted in `tz`)
    /// and integers with an optional unit suffix; see
    /// [`timestamp::parse_timestamp_literal`]. Decimal columns accept the forms
    /// listed on [`Decimal`]'s `FromStr` implementation.
    ///
    /// # Errors
    ///
    /// Returns `BlockError::InvalidLiteral` and leaves the field unchanged if
    /// the literal cannot be parsed.
    pub fn set_value_from_string<Tz: TimeZone>(&mut self, tz: &Tz, text: &str) -> Result<()> {
        let target = self.field_type();
        let invalid = || BlockError::InvalidLiteral {
            literal: text.to_string(),
            target,
        };
        let trimmed = text.trim();
        match self {
            Self::Byte(v) | Self::Integer(v) => *v = trimmed.parse().map_err(|_| invalid())?,
            Self::Long(v) => *v = trimmed.parse().map_err(|_| invalid())?,
            Self::Decimal(d) => *d = trimmed.parse().map_err(|_| invalid())?,
            Self::Timestamp { unit, raw } => {
                *raw = timestamp::parse_timestamp_literal(tz, trimmed, *unit)
                    .ok_or_else(invalid)?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Binary codec
    // ------------------------------------------------------------------

    /// Returns the exact number of bytes [`Field::write_to`] emits.
    pub fn serialized_size(&self) -> usize {
        match self {
            Self::Byte(v) | Self::Integer(v) => signed_varint_len(i64::from(*v)),
            Self::Long(v) => signed_varint_len(*v),
            Self::Decimal(d) => signed_varint_len(d.mantissa()) + 1,
            Self::Timestamp { raw, .. } => signed_varint_len(*raw),
        }
    }

    /// Writes the value and returns the number of bytes written.
    pub fn write_to<B: BufMut>(&self, buf: &mut B) -> usize {
        match self {
            Self::Byte(v) | Self::Integer(v) => write_signed_varint(i64::from(*v), buf),
            Self::Long(v) => write_signed_varint(*v, buf),
            Self::Decimal(d) => {
                let written = write_signed_varint(d.mantissa(), buf);
                buf.put_i8(d.exponent());
                written + 1
            }
            Self::Timestamp { raw, .. } => write_signed_varint(*raw, buf),
        }
    }

    /// Reads a value of type `ty` from the front of `buf`.
    ///
    /// # Errors
    ///
    /// Returns `BlockError::MalformedInput` on truncated input, an out-of-range
    /// 32-bit value or an invalid decimal sentinel.
    pub fn read_from<B: Buf>(ty: FieldType, buf: &mut B) -> Result<Self> {
        let narrow = |v: i64| {
            i32::try_from(v)
                .map_err(|_| BlockError::malformed(format!("{v} out of range for {ty} field")))
        };
        let field = match ty {
            FieldType::Byte => Self::Byte(narrow(read_signed_varint(buf)?)?),
            FieldType::Integer => Self::Integer(narrow(read_signed_varint(buf)?)?),
            FieldType::Long => Self::Long(read_signed_varint(buf)?),
            FieldType::Decimal => {
                let mantissa = read_signed_varint(buf)?;
                if !buf.has_remaining() {
                    return Err(BlockError::malformed("truncated decimal exponent"));
                }
                let decimal = Decimal::from_raw_parts(mantissa, buf.get_i8());
                if !decimal.is_well_formed() {
                    return Err(BlockError::malformed(format!(
                        "invalid decimal sentinel mantissa {mantissa}"
                    )));
                }
                Self::Decimal(decimal)
            }
            FieldType::Timestamp(unit) => Self::Timestamp {
                unit,
                raw: read_signed_varint(buf)?,
            },
        };
        Ok(field)
    }

    /// Advances `buf` past one encoded value of type `ty` without keeping it.
    pub fn skip<B: Buf>(ty: FieldType, buf: &mut B) -> Result<()> {
        read_signed_varint(buf)?;
        if ty == FieldType::Decimal {
            if !buf.has_remaining() {
                return Err(BlockError::malformed("truncated decimal exponent"));
            }
            buf.advance(1);
        }
        Ok(())
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Byte(v) | Self::Integer(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::Timestamp { unit, raw } => write!(f, "{raw}{unit}"),
        }
    }
}
