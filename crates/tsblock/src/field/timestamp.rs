//! Timestamp units and timestamp literal parsing.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone};

/// Resolution of a timestamp field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum TimeUnit {
    /// Nanoseconds since the Unix epoch.
    #[default]
    Nanoseconds,
    /// Microseconds since the Unix epoch.
    Microseconds,
    /// Milliseconds since the Unix epoch.
    Milliseconds,
    /// Seconds since the Unix epoch.
    Seconds,
}

impl TimeUnit {
    /// Number of nanoseconds in one tick of this unit.
    pub const fn nanos_per_unit(self) -> i64 {
        match self {
            Self::Nanoseconds => 1,
            Self::Microseconds => 1_000,
            Self::Milliseconds => 1_000_000,
            Self::Seconds => 1_000_000_000,
        }
    }

    /// Returns the literal suffix for this unit.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Nanoseconds => "ns",
            Self::Microseconds => "µs",
            Self::Milliseconds => "ms",
            Self::Seconds => "s",
        }
    }

    /// Parses a literal suffix. `us` is accepted as an ASCII spelling of `µs`.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "ns" => Some(Self::Nanoseconds),
            "µs" | "us" => Some(Self::Microseconds),
            "ms" => Some(Self::Milliseconds),
            "s" => Some(Self::Seconds),
            _ => None,
        }
    }

    /// Converts `value` expressed in this unit into `target` units.
    ///
    /// Conversions to a coarser unit round towards negative infinity so that a
    /// timestamp always lands in the tick that contains it. Conversions to a
    /// finer unit saturate.
    pub fn convert(self, value: i64, target: TimeUnit) -> i64 {
        let from = self.nanos_per_unit();
        let to = target.nanos_per_unit();
        if from == to {
            value
        } else if from > to {
            value.saturating_mul(from / to)
        } else {
            value.div_euclid(to / from)
        }
    }

    /// Converts `value` in this unit to nanoseconds, saturating at the i64 bounds.
    pub fn to_nanos(self, value: i64) -> i64 {
        self.convert(value, Self::Nanoseconds)
    }

    /// Like [`TimeUnit::convert`], but returns `None` instead of saturating.
    pub fn checked_convert(self, value: i64, target: TimeUnit) -> Option<i64> {
        let from = self.nanos_per_unit();
        let to = target.nanos_per_unit();
        if from > to {
            value.checked_mul(from / to)
        } else {
            Some(self.convert(value, target))
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Parses a date-time literal into a raw value of `unit`.
///
/// Literals carrying an explicit offset (RFC 3339) are taken as-is; all other
/// accepted forms are interpreted as local time in `tz`. Returns `None` if the
/// instant does not fit an `i64` of `unit`.
pub fn parse_datetime<Tz: TimeZone>(tz: &Tz, text: &str, unit: TimeUnit) -> Option<i64> {
    let (secs, subsec_nanos) = match DateTime::parse_from_rfc3339(text) {
        Ok(dt) => (dt.timestamp(), dt.timestamp_subsec_nanos()),
        Err(_) => {
            let naive = DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .or_else(|| {
                    NaiveDate::parse_from_str(text, "%Y-%m-%d")
                        .ok()
                        .and_then(|date| date.and_hms_opt(0, 0, 0))
                })?;
            // Ambiguous local times (DST fold) resolve to the earlier instant.
            let dt = tz.from_local_datetime(&naive).earliest()?;
            (dt.timestamp(), dt.timestamp_subsec_nanos())
        }
    };
    let subsec = TimeUnit::Nanoseconds.convert(i64::from(subsec_nanos), unit);
    TimeUnit::Seconds
        .checked_convert(secs, unit)?
        .checked_add(subsec)
}

/// Parses a timestamp literal into a raw value of `unit`.
///
/// Accepted forms:
/// - `'2024-03-10 12:00:00'`: quoted date-time, see [`parse_datetime`]
/// - `1500ms`: integer with a unit suffix (`ns`, `µs`/`us`, `ms`, `s`)
/// - `1500`: integer in the field's own unit
pub fn parse_timestamp_literal<Tz: TimeZone>(tz: &Tz, text: &str, unit: TimeUnit) -> Option<i64> {
    let text = text.trim();
    if let Some(inner) = text
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
    {
        return parse_datetime(tz, inner.trim(), unit);
    }

    let split = text
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let (number, suffix) = text.split_at(split);
    let value: i64 = number.parse().ok()?;
    let source = match suffix.trim() {
        "" => unit,
        symbol => TimeUnit::from_symbol(symbol)?,
    };
    source.checked_convert(value, unit)
}
