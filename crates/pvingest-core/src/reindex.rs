//! Aligning an upload's `time` column onto a job's time grid.
//!
//! Reconciliation never fails because data and grid disagree; it reports the
//! disagreement instead:
//!
//! - `extra`: distinct upload timestamps the grid does not contain,
//! - `missing`: grid timestamps absent from the upload,
//!
//! and returns a table with exactly one row per grid timestamp, in grid
//! order. Grid rows without data are null in every value column, and upload
//! rows outside the grid are dropped.
//!
//! Before matching, every timestamp is rounded to the nearest second (ties to
//! even). Naive timestamps are read as wall-clock time in the grid timezone;
//! offset-aware timestamps are compared as instants. When the rounded upload
//! still holds repeated timestamps, the first row in upload order wins.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use arrow::array::timezone::Tz;
use arrow::array::{Array, ArrayRef, UInt64Array};
use arrow::compute::take;
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::DateTime;
use snafu::prelude::*;

use crate::TIME_COLUMN;
use crate::error::{
    AmbiguousLocalTimeSnafu, IngestResult, MissingTimeColumnSnafu, NonexistentLocalTimeSnafu,
    ReindexSnafu, TimeNotTimestampSnafu, TimestampOutOfRangeSnafu,
};
use crate::time_index::JobTimeIndex;
use crate::timestamp::{
    Localized, localize_nanos, naive_from_nanos, raw_timestamps, round_to_second,
};

/// Result of aligning a table onto a [`JobTimeIndex`].
#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// One row per grid timestamp, `time` first and tagged with the grid
    /// timezone.
    pub table: RecordBatch,
    /// Upload timestamps not in the grid, ascending and distinct.
    pub extra: Vec<DateTime<Tz>>,
    /// Grid timestamps not in the upload, ascending.
    pub missing: Vec<DateTime<Tz>>,
}

impl Reconciliation {
    /// True when the upload covered the grid exactly.
    pub fn is_aligned(&self) -> bool {
        self.extra.is_empty() && self.missing.is_empty()
    }
}

fn nanos_per_unit(unit: &TimeUnit) -> i64 {
    match unit {
        TimeUnit::Second => 1_000_000_000,
        TimeUnit::Millisecond => 1_000_000,
        TimeUnit::Microsecond => 1_000,
        TimeUnit::Nanosecond => 1,
    }
}

/// Rounded instants (UTC epoch nanos) paired with their source row.
///
/// Null timestamps are skipped; the second value counts them.
fn instants(time: &dyn Array, index: &JobTimeIndex) -> IngestResult<(Vec<(i64, u64)>, usize)> {
    let DataType::Timestamp(unit, tz) = time.data_type() else {
        return TimeNotTimestampSnafu.fail();
    };
    let scale = nanos_per_unit(unit);
    let naive = tz.is_none();
    let values = raw_timestamps(time).context(TimeNotTimestampSnafu)?;

    let mut rows = Vec::with_capacity(values.len());
    let mut nulls = 0;
    for (row, value) in values.into_iter().enumerate() {
        let Some(value) = value else {
            nulls += 1;
            continue;
        };
        let nanos = value
            .checked_mul(scale)
            .context(TimestampOutOfRangeSnafu {
                value: format!("{value} ({unit:?})"),
            })?;
        let rounded = round_to_second(nanos);

        let instant = if naive {
            match localize_nanos(rounded, index.tz()) {
                Localized::Instant(instant) => instant,
                Localized::Ambiguous => {
                    return AmbiguousLocalTimeSnafu {
                        value: naive_from_nanos(rounded),
                        timezone: index.timezone(),
                    }
                    .fail();
                }
                Localized::Nonexistent => {
                    return NonexistentLocalTimeSnafu {
                        value: naive_from_nanos(rounded),
                        timezone: index.timezone(),
                    }
                    .fail();
                }
                Localized::OutOfRange => {
                    return TimestampOutOfRangeSnafu {
                        value: naive_from_nanos(rounded).to_string(),
                    }
                    .fail();
                }
            }
        } else {
            rounded
        };
        rows.push((instant, row as u64));
    }

    // Stable, so equal instants keep upload order.
    rows.sort_by_key(|(instant, _)| *instant);
    Ok((rows, nulls))
}

/// Align `batch` onto `index`, reporting extra and missing timestamps.
///
/// `batch` must have a timestamp-typed `time` column of any unit. Fails when
/// a naive timestamp is ambiguous or nonexistent in the grid timezone.
pub fn reindex_timeseries(
    batch: &RecordBatch,
    index: &JobTimeIndex,
) -> IngestResult<Reconciliation> {
    let time = batch
        .column_by_name(TIME_COLUMN)
        .context(MissingTimeColumnSnafu)?;
    let (rows, nulls) = instants(time.as_ref(), index)?;
    if nulls > 0 {
        log::warn!("dropping {nulls} rows with a null timestamp");
    }

    let grid = index.nanos();
    let aligned = rows.len() == grid.len() && rows.iter().map(|(t, _)| t).eq(grid.iter());

    let (take_indices, extra, missing) = if aligned {
        let positions: Vec<Option<u64>> = rows.iter().map(|(_, row)| Some(*row)).collect();
        (positions, Vec::new(), Vec::new())
    } else {
        let grid_set: HashSet<i64> = grid.iter().copied().collect();
        let mut first_row: HashMap<i64, u64> = HashMap::with_capacity(rows.len());
        let mut extra = BTreeSet::new();
        for &(instant, row) in &rows {
            first_row.entry(instant).or_insert(row);
            if !grid_set.contains(&instant) {
                extra.insert(instant);
            }
        }
        let missing: Vec<i64> = grid
            .iter()
            .copied()
            .filter(|t| !first_row.contains_key(t))
            .collect();
        let positions: Vec<Option<u64>> =
            grid.iter().map(|t| first_row.get(t).copied()).collect();
        (positions, extra.into_iter().collect(), missing)
    };

    if !extra.is_empty() || !missing.is_empty() {
        log::warn!(
            "upload does not match the time index: {} extra, {} missing timestamps",
            extra.len(),
            missing.len()
        );
    }

    let take_indices = UInt64Array::from(take_indices);
    let schema = batch.schema();
    let mut fields = vec![Field::new(TIME_COLUMN, index.data_type(), false)];
    let mut columns: Vec<ArrayRef> = vec![Arc::new(index.as_array().clone())];
    for (field, column) in schema.fields().iter().zip(batch.columns()) {
        if field.name() == TIME_COLUMN {
            continue;
        }
        fields.push(field.as_ref().clone().with_nullable(true));
        columns.push(take(column.as_ref(), &take_indices, None).context(ReindexSnafu)?);
    }
    let table =
        RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).context(ReindexSnafu)?;

    log::debug!(
        "reindexed {} input rows onto {} grid timestamps",
        batch.num_rows(),
        index.len()
    );

    Ok(Reconciliation {
        table,
        extra: extra.into_iter().map(|t| index.datetime(t)).collect(),
        missing: missing.into_iter().map(|t| index.datetime(t)).collect(),
    })
}

#[cfg(test)]
mod tests {
    use arrow::array::{AsArray, Float64Array, TimestampNanosecondArray, TimestampSecondArray};
    use arrow::datatypes::{Float64Type, TimestampNanosecondType};

    use super::*;
    use crate::error::IngestError;
    use crate::test_util::*;

    const T0: &str = "2021-01-01T00:00:00Z";
    const T1: &str = "2021-01-01T01:00:00Z";
    const T2: &str = "2021-01-01T02:00:00Z";
    const T3: &str = "2021-01-01T03:00:00Z";

    fn ghi(table: &RecordBatch) -> Vec<Option<f64>> {
        table
            .column_by_name("ghi")
            .map(|c| c.as_primitive::<Float64Type>().iter().collect())
            .unwrap_or_default()
    }

    fn rendered(times: &[DateTime<Tz>]) -> Vec<String> {
        times.iter().map(|t| t.to_rfc3339()).collect()
    }

    #[test]
    fn reports_extra_and_missing() -> TestResult {
        let index = index_of("UTC", &[T0, T1, T2])?;
        let batch = hourly_batch(&[T0, T2, T3], &[("ghi", &[1.0, 2.0, 3.0])])?;

        let out = reindex_timeseries(&batch, &index)?;
        assert_eq!(rendered(&out.missing), vec!["2021-01-01T01:00:00+00:00"]);
        assert_eq!(rendered(&out.extra), vec!["2021-01-01T03:00:00+00:00"]);
        assert!(!out.is_aligned());

        assert_eq!(out.table.num_rows(), 3);
        assert_eq!(ghi(&out.table), vec![Some(1.0), None, Some(2.0)]);
        let time = out.table.column(0).as_primitive::<TimestampNanosecondType>();
        assert_eq!(time.values().as_ref(), index.nanos());
        Ok(())
    }

    #[test]
    fn aligned_input_is_a_fixed_point() -> TestResult {
        let index = index_of("UTC", &[T0, T1, T2])?;
        let batch = hourly_batch(&[T2, T0, T1], &[("ghi", &[3.0, 1.0, 2.0])])?;

        let first = reindex_timeseries(&batch, &index)?;
        assert!(first.is_aligned());
        assert_eq!(ghi(&first.table), vec![Some(1.0), Some(2.0), Some(3.0)]);

        let second = reindex_timeseries(&first.table, &index)?;
        assert!(second.is_aligned());
        assert_eq!(second.table, first.table);
        Ok(())
    }

    #[test]
    fn time_moves_first_and_takes_grid_timezone() -> TestResult {
        let index = index_of("America/Phoenix", &[T0, T1])?;
        let time = TimestampNanosecondArray::from(vec![nanos(T0)?, nanos(T1)?]).with_timezone("UTC");
        let ghi_col = Float64Array::from(vec![1.0, 2.0]);
        let schema = Schema::new(vec![
            Field::new("ghi", DataType::Float64, false),
            Field::new("time", time.data_type().clone(), false),
        ]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(ghi_col) as ArrayRef, Arc::new(time)],
        )?;

        let out = reindex_timeseries(&batch, &index)?;
        let schema = out.table.schema();
        assert_eq!(schema.field(0).name(), "time");
        assert_eq!(
            schema.field(0).data_type(),
            &DataType::Timestamp(TimeUnit::Nanosecond, Some("America/Phoenix".into()))
        );
        assert_eq!(schema.field(1).name(), "ghi");
        assert!(schema.field(1).is_nullable());
        Ok(())
    }

    #[test]
    fn naive_times_are_localized_to_grid_timezone() -> TestResult {
        let index = index_of(
            "America/Phoenix",
            &["2021-01-01T00:00:00-07:00", "2021-01-01T01:00:00-07:00"],
        )?;
        // Wall clock values, encoded as if UTC.
        let time = TimestampNanosecondArray::from(vec![
            nanos("2021-01-01T00:00:00Z")?,
            nanos("2021-01-01T01:00:00Z")?,
        ]);
        let batch = batch_with_time(time, &[("ghi", &[1.0, 2.0])])?;

        let out = reindex_timeseries(&batch, &index)?;
        assert!(out.is_aligned());
        assert_eq!(ghi(&out.table), vec![Some(1.0), Some(2.0)]);
        Ok(())
    }

    #[test]
    fn nonexistent_local_time_is_an_error() -> TestResult {
        let index = index_of("America/Denver", &["2021-03-14T00:00:00-07:00"])?;
        let time = TimestampNanosecondArray::from(vec![nanos("2021-03-14T02:30:00Z")?]);
        let batch = batch_with_time(time, &[("ghi", &[1.0])])?;

        let err = reindex_timeseries(&batch, &index).unwrap_err();
        assert!(matches!(err, IngestError::NonexistentLocalTime { .. }));
        assert_eq!(err.status_code(), 400);
        Ok(())
    }

    #[test]
    fn ambiguous_local_time_is_an_error() -> TestResult {
        let index = index_of("America/Denver", &["2021-11-07T00:00:00-06:00"])?;
        let time = TimestampNanosecondArray::from(vec![nanos("2021-11-07T01:30:00Z")?]);
        let batch = batch_with_time(time, &[("ghi", &[1.0])])?;

        let err = reindex_timeseries(&batch, &index).unwrap_err();
        assert!(matches!(err, IngestError::AmbiguousLocalTime { .. }));
        Ok(())
    }

    #[test]
    fn subsecond_values_round_half_even() -> TestResult {
        let index = index_of("UTC", &[T0, T1])?;
        let time = TimestampNanosecondArray::from(vec![
            nanos(T0)? + 500_000_000,
            nanos(T1)? - 400_000_000,
        ])
        .with_timezone("UTC");
        let batch = batch_with_time(time, &[("ghi", &[1.0, 2.0])])?;

        let out = reindex_timeseries(&batch, &index)?;
        assert!(out.is_aligned());
        assert_eq!(ghi(&out.table), vec![Some(1.0), Some(2.0)]);
        Ok(())
    }

    #[test]
    fn duplicates_after_rounding_keep_first_row() -> TestResult {
        let index = index_of("UTC", &[T0, T1])?;
        let time = TimestampNanosecondArray::from(vec![
            nanos(T1)?,
            nanos(T0)? + 200_000_000,
            nanos(T0)?,
        ])
        .with_timezone("UTC");
        let batch = batch_with_time(time, &[("ghi", &[2.0, 10.0, 20.0])])?;

        let out = reindex_timeseries(&batch, &index)?;
        assert_eq!(ghi(&out.table), vec![Some(10.0), Some(2.0)]);
        assert!(out.extra.is_empty());
        Ok(())
    }

    #[test]
    fn null_times_are_dropped_not_extra() -> TestResult {
        let index = index_of("UTC", &[T0, T1])?;
        let time =
            TimestampNanosecondArray::from(vec![Some(nanos(T0)?), None, Some(nanos(T1)?)])
                .with_timezone("UTC");
        let batch = batch_with_time(time, &[("ghi", &[1.0, 99.0, 2.0])])?;

        let out = reindex_timeseries(&batch, &index)?;
        assert!(out.is_aligned());
        assert_eq!(ghi(&out.table), vec![Some(1.0), Some(2.0)]);
        Ok(())
    }

    #[test]
    fn accepts_second_resolution_input() -> TestResult {
        let index = index_of("UTC", &[T0, T1])?;
        let secs = TimestampSecondArray::from(vec![nanos(T0)? / 1_000_000_000])
            .with_timezone("+00:00");
        let schema = Schema::new(vec![
            Field::new("time", secs.data_type().clone(), true),
            Field::new("ghi", DataType::Float64, true),
        ]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(secs) as ArrayRef, Arc::new(Float64Array::from(vec![5.0]))],
        )?;

        let out = reindex_timeseries(&batch, &index)?;
        assert_eq!(rendered(&out.missing), vec!["2021-01-01T01:00:00+00:00"]);
        assert_eq!(ghi(&out.table), vec![Some(5.0), None]);
        Ok(())
    }

    #[test]
    fn missing_time_column_is_rejected() -> TestResult {
        let index = index_of("UTC", &[T0])?;
        let batch = text_batch(&[("ghi", &["1"])])?;
        let err = reindex_timeseries(&batch, &index).unwrap_err();
        assert!(matches!(err, IngestError::MissingTimeColumn));
        Ok(())
    }
}
