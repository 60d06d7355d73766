//! The canonical time grid a job expects data for.
//!
//! A [`JobTimeIndex`] is an ordered, duplicate-free list of instants sharing
//! one timezone. It is built by the job side (usually from a
//! [`TimeIndexConfig`] of `start`, exclusive `end`, `step` and `timezone`) and
//! is only read by reconciliation, so one index can be shared across many
//! uploads.
//!
//! Instants are stored as UTC epoch nanoseconds in an Arrow timestamp array
//! tagged with the index timezone; that array becomes the `time` column of
//! reindexed output as-is.

use std::{fmt, str::FromStr, sync::Arc};

use arrow::array::timezone::Tz;
use arrow::array::TimestampNanosecondArray;
use arrow::datatypes::{DataType, TimeUnit};
use arrow::error::ArrowError;
use chrono::{DateTime, FixedOffset, TimeZone};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

const SECONDS_PER_MINUTE: i64 = 60;
const SECONDS_PER_HOUR: i64 = 60 * 60;
const SECONDS_PER_DAY: i64 = 24 * 60 * 60;
const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Upper bound on the number of timestamps a range-built index may hold.
pub const MAX_GRID_LEN: usize = 100_000_000;

/// Errors produced when parsing a step such as `1h`, `15min` or `3600`.
#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum ParseTimeStepError {
    /// The text was empty or only whitespace.
    #[snafu(display("time step is empty"))]
    Empty,

    /// The text did not start with a number.
    #[snafu(display("time step '{input}' does not start with a number"))]
    MissingNumber {
        /// The text that was parsed.
        input: String,
    },

    /// The number could not be parsed.
    #[snafu(display("invalid step value in '{input}': {source}"))]
    InvalidNumber {
        /// The text that was parsed.
        input: String,
        /// The parse error returned by `u64::from_str`.
        source: std::num::ParseIntError,
    },

    /// The parsed number was zero.
    #[snafu(display("step value must be > 0 (got {value}) in '{input}'"))]
    NonPositive {
        /// The text that was parsed.
        input: String,
        /// The parsed number.
        value: u64,
    },

    /// The parsed number did not fit in a `u32`.
    #[snafu(display("step value too large for u32 (got {value}) in '{input}'"))]
    TooLarge {
        /// The text that was parsed.
        input: String,
        /// The parsed number.
        value: u64,
    },

    /// The unit suffix is not one of s, m, h, d.
    #[snafu(display("unknown time step unit '{unit}' in '{input}' (expected s|m|h|d)"))]
    UnknownUnit {
        /// The text that was parsed.
        input: String,
        /// The unrecognized unit suffix.
        unit: String,
    },
}

/// Fixed spacing between consecutive grid timestamps.
///
/// Steps are absolute durations: a `1d` step is always 24 hours, also across
/// daylight-saving transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TimeStep {
    /// A fixed number of seconds.
    Seconds(u32),
    /// A fixed number of minutes.
    Minutes(u32),
    /// A fixed number of hours.
    Hours(u32),
    /// A fixed number of days.
    Days(u32),
}

impl TimeStep {
    /// Step length in whole seconds.
    pub fn as_secs(&self) -> i64 {
        match *self {
            TimeStep::Seconds(n) => n as i64,
            TimeStep::Minutes(n) => (n as i64) * SECONDS_PER_MINUTE,
            TimeStep::Hours(n) => (n as i64) * SECONDS_PER_HOUR,
            TimeStep::Days(n) => (n as i64) * SECONDS_PER_DAY,
        }
    }

    /// Step length in nanoseconds, or `None` if it does not fit in an `i64`.
    pub fn as_nanos(&self) -> Option<i64> {
        self.as_secs().checked_mul(NANOS_PER_SECOND)
    }
}

impl fmt::Display for TimeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeStep::Seconds(n) => write!(f, "{n}s"),
            TimeStep::Minutes(n) => write!(f, "{n}m"),
            TimeStep::Hours(n) => write!(f, "{n}h"),
            TimeStep::Days(n) => write!(f, "{n}d"),
        }
    }
}

impl FromStr for TimeStep {
    type Err = ParseTimeStepError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let input = raw.trim();
        ensure!(!input.is_empty(), EmptySnafu);

        let unit = input.trim_start_matches(|c: char| c.is_ascii_digit());
        let number = &input[..input.len() - unit.len()];
        ensure!(!number.is_empty(), MissingNumberSnafu { input });

        let value: u64 = number.parse().context(InvalidNumberSnafu { input })?;
        ensure!(value > 0, NonPositiveSnafu { input, value });
        let count = u32::try_from(value)
            .ok()
            .context(TooLargeSnafu { input, value })?;

        let unit = unit.trim();
        let make: fn(u32) -> TimeStep = match unit.to_ascii_lowercase().as_str() {
            "" | "s" | "sec" | "secs" | "second" | "seconds" => TimeStep::Seconds,
            "m" | "min" | "mins" | "minute" | "minutes" => TimeStep::Minutes,
            "h" | "hr" | "hrs" | "hour" | "hours" => TimeStep::Hours,
            "d" | "day" | "days" => TimeStep::Days,
            _ => return UnknownUnitSnafu { input, unit }.fail(),
        };
        Ok(make(count))
    }
}

impl TryFrom<String> for TimeStep {
    type Error = ParseTimeStepError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeStep> for String {
    fn from(step: TimeStep) -> Self {
        step.to_string()
    }
}

/// Errors raised while building a [`JobTimeIndex`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TimeIndexError {
    /// The timezone is neither an IANA name nor a fixed offset.
    #[snafu(display("unknown timezone '{timezone}': {source}"))]
    InvalidTimezone {
        /// Timezone string supplied by the caller.
        timezone: String,
        /// Underlying Arrow timezone error.
        source: ArrowError,
    },

    /// `start` is not before `end`.
    #[snafu(display("time index start {start} must be before end {end}"))]
    EmptyRange {
        /// Inclusive range start.
        start: DateTime<FixedOffset>,
        /// Exclusive range end.
        end: DateTime<FixedOffset>,
    },

    /// Timestamps are not strictly increasing.
    #[snafu(display(
        "time index must be strictly increasing; position {position} is not after its predecessor"
    ))]
    NotIncreasing {
        /// Zero-based position of the offending timestamp.
        position: usize,
    },

    /// The step is longer than `i64` nanoseconds can express.
    #[snafu(display("time step {step} is too large to express in nanoseconds"))]
    StepTooLarge {
        /// The configured step.
        step: TimeStep,
    },

    /// The range would produce more timestamps than an index may hold.
    #[snafu(display(
        "time index from {start} to {end} every {step} exceeds {limit} timestamps"
    ))]
    RangeTooLarge {
        /// Inclusive range start.
        start: DateTime<FixedOffset>,
        /// Exclusive range end.
        end: DateTime<FixedOffset>,
        /// The configured step.
        step: TimeStep,
        /// Maximum number of timestamps allowed.
        limit: usize,
    },

    /// A timestamp cannot be represented as `i64` nanoseconds.
    #[snafu(display("time index timestamp at position {position} is out of range"))]
    OutOfRange {
        /// Zero-based position of the offending timestamp.
        position: usize,
    },
}

/// Serializable description of a regular time index.
///
/// `start` is inclusive and `end` exclusive; both must carry an offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeIndexConfig {
    /// First timestamp of the grid.
    pub start: DateTime<FixedOffset>,
    /// Exclusive upper bound of the grid.
    pub end: DateTime<FixedOffset>,
    /// Spacing between timestamps.
    pub step: TimeStep,
    /// IANA timezone name (for example `"America/Phoenix"`) or fixed offset.
    pub timezone: String,
}

impl TimeIndexConfig {
    /// Materialize the grid.
    pub fn build(&self) -> Result<JobTimeIndex, TimeIndexError> {
        JobTimeIndex::from_range(self.start, self.end, self.step, &self.timezone)
    }
}

/// Ordered, duplicate-free timestamps in one timezone.
#[derive(Debug, Clone)]
pub struct JobTimeIndex {
    timezone: String,
    tz: Tz,
    times: TimestampNanosecondArray,
}

fn parse_tz(timezone: &str) -> Result<Tz, TimeIndexError> {
    timezone.parse::<Tz>().context(InvalidTimezoneSnafu {
        timezone: timezone.to_string(),
    })
}

impl JobTimeIndex {
    /// Build from UTC epoch nanoseconds, which must be strictly increasing.
    pub fn try_from_nanos(timezone: &str, nanos: Vec<i64>) -> Result<Self, TimeIndexError> {
        let tz = parse_tz(timezone)?;

        if let Some(position) = nanos
            .windows(2)
            .position(|pair| pair[1] <= pair[0])
            .map(|i| i + 1)
        {
            return NotIncreasingSnafu { position }.fail();
        }

        let times = TimestampNanosecondArray::from(nanos).with_timezone(timezone);
        Ok(Self {
            timezone: timezone.to_string(),
            tz,
            times,
        })
    }

    /// Build from explicit instants in any timezone.
    pub fn try_from_datetimes<Z, I>(timezone: &str, times: I) -> Result<Self, TimeIndexError>
    where
        Z: TimeZone,
        I: IntoIterator<Item = DateTime<Z>>,
    {
        let nanos = times
            .into_iter()
            .enumerate()
            .map(|(position, dt)| {
                dt.timestamp_nanos_opt()
                    .context(OutOfRangeSnafu { position })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::try_from_nanos(timezone, nanos)
    }

    /// Build the half-open range `[start, end)` with a fixed step.
    pub fn from_range(
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
        step: TimeStep,
        timezone: &str,
    ) -> Result<Self, TimeIndexError> {
        ensure!(start < end, EmptyRangeSnafu { start, end });

        let first = start
            .timestamp_nanos_opt()
            .context(OutOfRangeSnafu { position: 0usize })?;
        let stop = end.timestamp_nanos_opt().context(OutOfRangeSnafu {
            position: usize::MAX,
        })?;
        let step_nanos = step.as_nanos().context(StepTooLargeSnafu { step })?;

        // The span of two i64 instants can exceed i64::MAX.
        let span = i128::from(stop) - i128::from(first);
        let step_wide = i128::from(step_nanos);
        let len = usize::try_from((span + step_wide - 1) / step_wide)
            .ok()
            .filter(|&len| len <= MAX_GRID_LEN)
            .context(RangeTooLargeSnafu {
                start,
                end,
                step,
                limit: MAX_GRID_LEN,
            })?;

        let mut nanos = Vec::with_capacity(len);
        nanos.extend(
            std::iter::successors(Some(first), |t| t.checked_add(step_nanos))
                .take_while(|&t| t < stop),
        );

        Self::try_from_nanos(timezone, nanos)
    }

    /// Timezone name of the grid.
    pub fn timezone(&self) -> &str {
        &self.timezone
    }

    /// Parsed timezone of the grid.
    pub fn tz(&self) -> &Tz {
        &self.tz
    }

    /// Number of timestamps.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// True if the grid has no timestamps.
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// UTC epoch nanoseconds in grid order.
    pub fn nanos(&self) -> &[i64] {
        self.times.values()
    }

    /// The grid as an Arrow timestamp array tagged with the grid timezone.
    pub fn as_array(&self) -> &TimestampNanosecondArray {
        &self.times
    }

    /// Arrow type of [`Self::as_array`].
    pub fn data_type(&self) -> DataType {
        DataType::Timestamp(
            TimeUnit::Nanosecond,
            Some(Arc::<str>::from(self.timezone.as_str())),
        )
    }

    /// Render epoch nanoseconds in the grid timezone.
    pub fn datetime(&self, nanos: i64) -> DateTime<Tz> {
        self.tz.timestamp_nanos(nanos)
    }

    /// Iterate the grid as zoned datetimes.
    pub fn iter(&self) -> impl Iterator<Item = DateTime<Tz>> + '_ {
        self.nanos().iter().map(|&n| self.datetime(n))
    }
}

impl PartialEq for JobTimeIndex {
    fn eq(&self, other: &Self) -> bool {
        self.timezone == other.timezone && self.nanos() == other.nanos()
    }
}
