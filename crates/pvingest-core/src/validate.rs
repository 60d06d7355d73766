//! Schema checks for a decoded upload.

use std::collections::{BTreeSet, HashSet};

use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use snafu::prelude::*;

use crate::TIME_COLUMN;
use crate::error::{
    DuplicateTimesSnafu, IngestResult, MissingColumnsSnafu, NonNumericColumnsSnafu,
    TimeNotTimestampSnafu,
};
use crate::timestamp::raw_timestamps;

/// Check `batch` against the expected column names.
///
/// Checks run in precedence order and stop at the first failure:
/// missing columns, then the `time` column type and duplicates (only when
/// `time` is expected), then numeric types of the remaining expected columns.
/// Only the numeric check collects every offender. Boolean columns count as
/// numeric.
///
/// Returns the columns present in `batch` but not expected.
pub fn validate_table<I, S>(batch: &RecordBatch, expected: I) -> IngestResult<BTreeSet<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let expected: BTreeSet<String> = expected
        .into_iter()
        .map(|name| name.as_ref().to_string())
        .collect();
    let schema = batch.schema();
    let actual: BTreeSet<String> = schema.fields().iter().map(|f| f.name().clone()).collect();

    let missing: Vec<String> = expected.difference(&actual).cloned().collect();
    ensure!(missing.is_empty(), MissingColumnsSnafu { columns: missing });

    if expected.contains(TIME_COLUMN) {
        check_time_column(batch)?;
    }

    let non_numeric: Vec<String> = expected
        .iter()
        .filter(|name| name.as_str() != TIME_COLUMN)
        .filter(|name| {
            schema
                .field_with_name(name)
                .map(|field| !is_numeric(field.data_type()))
                .unwrap_or(true)
        })
        .cloned()
        .collect();
    ensure!(
        non_numeric.is_empty(),
        NonNumericColumnsSnafu {
            columns: non_numeric
        }
    );

    let extra: BTreeSet<String> = actual.difference(&expected).cloned().collect();
    log::debug!(
        "validated {} rows against {} expected columns ({} extra)",
        batch.num_rows(),
        expected.len(),
        extra.len()
    );
    Ok(extra)
}

fn is_numeric(data_type: &DataType) -> bool {
    data_type.is_numeric() || *data_type == DataType::Boolean
}

fn check_time_column(batch: &RecordBatch) -> IngestResult<()> {
    let Some(time) = batch.column_by_name(TIME_COLUMN) else {
        return MissingColumnsSnafu {
            columns: vec![TIME_COLUMN.to_string()],
        }
        .fail();
    };
    let values = raw_timestamps(time.as_ref()).context(TimeNotTimestampSnafu)?;

    // Rows minus distinct values; nulls count as one value.
    let distinct: HashSet<Option<i64>> = values.iter().copied().collect();
    let count = values.len() - distinct.len();
    ensure!(count == 0, DuplicateTimesSnafu { count });
    Ok(())
}
