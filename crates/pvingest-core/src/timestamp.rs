//! Timestamp parsing and second-level arithmetic for the `time` column.
//!
//! Only the `time` column gets date handling. Text values are parsed into one
//! of two shapes:
//!
//! - naive wall-clock values (no offset), kept as-is and later localized to
//!   the job timezone, or
//! - offset-aware values, stored as UTC epoch nanoseconds with the offset as
//!   the Arrow column timezone.
//!
//! A column is only promoted to a timestamp column when every non-null value
//! parses and all values agree on the shape (and, for aware values, on the
//! offset). Anything else stays text so validation can reject it with a
//! precise message.

use std::sync::Arc;

use arrow::array::timezone::Tz;
use arrow::array::{Array, AsArray, StringArray, TimestampNanosecondArray};
use arrow::datatypes::{
    DataType, TimeUnit, TimestampMicrosecondType, TimestampMillisecondType,
    TimestampNanosecondType, TimestampSecondType,
};
use chrono::{DateTime, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, TimeZone};

/// Nanoseconds in one second.
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

const AWARE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M%:z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S%.f",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// A single parsed `time` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedTimestamp {
    /// Wall-clock value without an offset.
    Naive(NaiveDateTime),
    /// Value with an explicit UTC offset.
    Aware(DateTime<FixedOffset>),
}

/// Parse one timestamp string.
///
/// Returns `None` when the value matches none of the accepted layouts.
pub fn parse_timestamp(raw: &str) -> Option<ParsedTimestamp> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    // `%:z` does not accept the `Z` designator.
    let zulu;
    let aware_input = match value.strip_suffix(['Z', 'z']) {
        Some(stripped) => {
            zulu = format!("{stripped}+00:00");
            zulu.as_str()
        }
        None => value,
    };

    for fmt in AWARE_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(aware_input, fmt) {
            return Some(ParsedTimestamp::Aware(dt));
        }
    }

    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(ParsedTimestamp::Naive(dt));
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, fmt) {
            return date.and_hms_opt(0, 0, 0).map(ParsedTimestamp::Naive);
        }
    }

    None
}

/// Arrow timezone string for a fixed offset (`UTC` for a zero offset).
fn offset_timezone(offset: &FixedOffset) -> String {
    if offset.local_minus_utc() == 0 {
        "UTC".to_string()
    } else {
        offset.to_string()
    }
}

/// Try to turn a text column into a nanosecond timestamp column.
///
/// `is_null` decides which raw strings count as missing values; those become
/// null timestamps. Returns `None` if any remaining value fails to parse, if
/// naive and aware values are mixed, or if aware values disagree on their
/// offset.
pub fn parse_time_column<F>(values: &StringArray, is_null: F) -> Option<TimestampNanosecondArray>
where
    F: Fn(&str) -> bool,
{
    let mut out: Vec<Option<i64>> = Vec::with_capacity(values.len());
    let mut naive_seen = false;
    let mut offset: Option<FixedOffset> = None;

    for value in values.iter() {
        let Some(raw) = value.filter(|raw| !is_null(raw)) else {
            out.push(None);
            continue;
        };

        match parse_timestamp(raw)? {
            ParsedTimestamp::Naive(naive) => {
                if offset.is_some() {
                    return None;
                }
                naive_seen = true;
                out.push(Some(naive.and_utc().timestamp_nanos_opt()?));
            }
            ParsedTimestamp::Aware(aware) => {
                if naive_seen {
                    return None;
                }
                match offset {
                    Some(seen) if seen != *aware.offset() => return None,
                    Some(_) => {}
                    None => offset = Some(*aware.offset()),
                }
                out.push(Some(aware.timestamp_nanos_opt()?));
            }
        }
    }

    let array = TimestampNanosecondArray::from(out);
    Some(match offset {
        Some(offset) => array.with_timezone(Arc::<str>::from(offset_timezone(&offset))),
        None => array,
    })
}

/// Round epoch nanoseconds to the nearest whole second, ties to even.
pub fn round_to_second(nanos: i64) -> i64 {
    let secs = nanos.div_euclid(NANOS_PER_SECOND);
    let rem = nanos.rem_euclid(NANOS_PER_SECOND);
    let half = NANOS_PER_SECOND / 2;

    let rounded = if rem > half || (rem == half && secs.rem_euclid(2) == 1) {
        secs.saturating_add(1)
    } else {
        secs
    };
    rounded.saturating_mul(NANOS_PER_SECOND)
}

/// Outcome of interpreting a wall-clock value in a timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Localized {
    /// The wall-clock value maps to exactly one instant (UTC epoch nanos).
    Instant(i64),
    /// The wall-clock value occurs twice (clocks turned back).
    Ambiguous,
    /// The wall-clock value is skipped (clocks turned forward).
    Nonexistent,
    /// The instant does not fit in `i64` nanoseconds.
    OutOfRange,
}

/// Interpret naive epoch nanoseconds (wall-clock encoded as if UTC) in `tz`.
pub fn localize_nanos(naive_nanos: i64, tz: &Tz) -> Localized {
    let naive = DateTime::from_timestamp_nanos(naive_nanos).naive_utc();
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => match dt.timestamp_nanos_opt() {
            Some(nanos) => Localized::Instant(nanos),
            None => Localized::OutOfRange,
        },
        LocalResult::Ambiguous(_, _) => Localized::Ambiguous,
        LocalResult::None => Localized::Nonexistent,
    }
}

/// Raw integer values of a timestamp column in its own unit.
///
/// Returns `None` for any other column type.
pub fn raw_timestamps(array: &dyn Array) -> Option<Vec<Option<i64>>> {
    let values = match array.data_type() {
        DataType::Timestamp(TimeUnit::Second, _) => {
            array.as_primitive::<TimestampSecondType>().iter().collect()
        }
        DataType::Timestamp(TimeUnit::Millisecond, _) => array
            .as_primitive::<TimestampMillisecondType>()
            .iter()
            .collect(),
        DataType::Timestamp(TimeUnit::Microsecond, _) => array
            .as_primitive::<TimestampMicrosecondType>()
            .iter()
            .collect(),
        DataType::Timestamp(TimeUnit::Nanosecond, _) => array
            .as_primitive::<TimestampNanosecondType>()
            .iter()
            .collect(),
        _ => return None,
    };
    Some(values)
}

/// Naive wall-clock value encoded in epoch nanoseconds.
pub fn naive_from_nanos(nanos: i64) -> NaiveDateTime {
    DateTime::from_timestamp_nanos(nanos).naive_utc()
}
