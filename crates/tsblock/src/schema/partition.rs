//! Time partitioning: mapping timestamps onto partition ranges.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::error::{BlockError, Result};

const NANOS_PER_SECOND: i64 = 1_000_000_000;
const NANOS_PER_DAY: i64 = 86_400 * NANOS_PER_SECOND;

/// A half-open time range `[start, end)` in nanoseconds since the Unix epoch.
///
/// A range ending at `i64::MAX` also holds `i64::MAX` itself, the value every
/// timestamp past the nanosecond range saturates to.
///
/// Ranges order by `(start, end)`, so partition ranges can key an ordered map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeRange {
    start: i64,
    end: i64,
}

impl TimeRange {
    /// Creates a new time range. `end` is clamped to be at least `start`.
    pub fn new(start: i64, end: i64) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    /// Inclusive start in nanoseconds.
    pub fn start(&self) -> i64 {
        self.start
    }

    /// Exclusive end in nanoseconds.
    pub fn end(&self) -> i64 {
        self.end
    }

    /// Returns true if `timestamp` falls within `[start, end)`, or is
    /// `i64::MAX` and the range ends there.
    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start
            && (timestamp < self.end || (self.end == i64::MAX && timestamp == i64::MAX))
    }

    /// Returns true if the two ranges share any instant.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Length of the range.
    pub fn duration(&self) -> Duration {
        Duration::from_nanos(self.end.abs_diff(self.start))
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Answers which partition a timestamp belongs to.
pub trait Partitioner: fmt::Debug + Send + Sync {
    /// Returns the partition range containing `timestamp_nanos`.
    fn partition_range_containing(&self, timestamp_nanos: i64) -> TimeRange;
}

/// Supported fixed partition durations.
///
/// # Examples
/// ```rust
/// use alopex_tsblock::schema::PartitionDuration;
///
/// assert_eq!(PartitionDuration::Hourly.as_nanos(), 3_600_000_000_000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionDuration {
    /// One-hour partitions.
    Hourly,
    /// One-day partitions (UTC days).
    Daily,
}

impl PartitionDuration {
    /// Returns the duration in nanoseconds.
    pub fn as_nanos(self) -> i64 {
        match self {
            Self::Hourly => Duration::from_secs(3600).as_nanos() as i64,
            Self::Daily => Duration::from_secs(86_400).as_nanos() as i64,
        }
    }
}

/// Epoch-aligned partitions of a fixed length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPartitioner {
    duration_nanos: i64,
}

impl FixedPartitioner {
    /// Creates a partitioner with the given partition length.
    ///
    /// # Errors
    ///
    /// Returns `BlockError::InvalidSchema` if the duration is zero or does not
    /// fit in an `i64` of nanoseconds.
    pub fn new(duration: Duration) -> Result<Self> {
        let nanos = i64::try_from(duration.as_nanos())
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| {
                BlockError::InvalidSchema(format!("invalid partition duration {duration:?}"))
            })?;
        Ok(Self {
            duration_nanos: nanos,
        })
    }

    /// Returns the partition length.
    pub fn duration(&self) -> Duration {
        Duration::from_nanos(self.duration_nanos as u64)
    }
}

impl From<PartitionDuration> for FixedPartitioner {
    fn from(value: PartitionDuration) -> Self {
        Self {
            duration_nanos: value.as_nanos(),
        }
    }
}

impl Partitioner for FixedPartitioner {
    fn partition_range_containing(&self, timestamp_nanos: i64) -> TimeRange {
        // Euclidean division keeps pre-epoch timestamps in the partition below them.
        let start = timestamp_nanos
            .div_euclid(self.duration_nanos)
            .saturating_mul(self.duration_nanos);
        TimeRange::new(start, start.saturating_add(self.duration_nanos))
    }
}

/// Calendar-day partitions in a time zone.
///
/// Days follow the zone's local midnights, so with a zone observing daylight
/// saving a partition may be 23 or 25 hours long.
#[derive(Debug, Clone)]
pub struct CalendarDayPartitioner<Tz: TimeZone> {
    tz: Tz,
}

impl<Tz: TimeZone> CalendarDayPartitioner<Tz> {
    /// Creates a partitioner for calendar days in `tz`.
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    fn local_midnight_nanos(&self, date: NaiveDate) -> Option<i64> {
        let midnight = date.and_hms_opt(0, 0, 0)?;
        self.tz
            .from_local_datetime(&midnight)
            .earliest()?
            .timestamp_nanos_opt()
    }

    fn day_range(&self, timestamp_nanos: i64) -> Option<TimeRange> {
        let secs = timestamp_nanos.div_euclid(NANOS_PER_SECOND);
        let nsecs = timestamp_nanos.rem_euclid(NANOS_PER_SECOND) as u32;
        let date = DateTime::<Utc>::from_timestamp(secs, nsecs)?
            .with_timezone(&self.tz)
            .date_naive();
        let start = self.local_midnight_nanos(date)?;
        let end = self.local_midnight_nanos(date.succ_opt()?)?;
        Some(TimeRange::new(start, end))
    }
}

impl CalendarDayPartitioner<Utc> {
    /// Calendar days in UTC.
    pub fn utc() -> Self {
        Self::new(Utc)
    }
}

impl<Tz> Partitioner for CalendarDayPartitioner<Tz>
where
    Tz: TimeZone + fmt::Debug + Send + Sync,
{
    fn partition_range_containing(&self, timestamp_nanos: i64) -> TimeRange {
        self.day_range(timestamp_nanos)
            .filter(|range| range.contains(timestamp_nanos))
            .unwrap_or_else(|| {
                // Midnight missing from the zone's calendar, or the day edge lies
                // outside the i64 nanosecond range: fall back to the UTC day.
                let start = timestamp_nanos
                    .div_euclid(NANOS_PER_DAY)
                    .saturating_mul(NANOS_PER_DAY);
                TimeRange::new(start, start.saturating_add(NANOS_PER_DAY))
            })
    }
}
