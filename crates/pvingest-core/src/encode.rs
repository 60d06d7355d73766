//! Narrowing validated tables into the stored artifact layout.
//!
//! Artifacts keep `time` (when present) as the first column with second
//! precision and its original timezone; every other column is stored as
//! `Float32`.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef};
use arrow::compute::{CastOptions, cast, cast_with_options};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use snafu::prelude::*;

use crate::TIME_COLUMN;
use crate::error::{EncodeSnafu, IngestResult, LossyTimestampSnafu, NotDatetimeSnafu};
use crate::formats::arrow_ipc::dump_arrow_bytes;
use crate::timestamp::raw_timestamps;

const STRICT: CastOptions<'static> = CastOptions {
    safe: false,
    format_options: arrow::util::display::FormatOptions::new(),
};

fn unit_label(unit: &TimeUnit) -> &'static str {
    match unit {
        TimeUnit::Second => "s",
        TimeUnit::Millisecond => "ms",
        TimeUnit::Microsecond => "us",
        TimeUnit::Nanosecond => "ns",
    }
}

fn units_per_second(unit: &TimeUnit) -> i64 {
    match unit {
        TimeUnit::Second => 1,
        TimeUnit::Millisecond => 1_000,
        TimeUnit::Microsecond => 1_000_000,
        TimeUnit::Nanosecond => 1_000_000_000,
    }
}

fn encode_time(time: &ArrayRef) -> IngestResult<(Field, ArrayRef)> {
    let DataType::Timestamp(unit, tz) = time.data_type() else {
        return NotDatetimeSnafu.fail();
    };
    let values = raw_timestamps(time.as_ref()).context(NotDatetimeSnafu)?;

    let per_second = units_per_second(unit);
    if let Some(value) = values
        .iter()
        .flatten()
        .copied()
        .find(|v| v % per_second != 0)
    {
        let from = match tz {
            Some(tz) => format!("timestamp[{}, tz={tz}]", unit_label(unit)),
            None => format!("timestamp[{}]", unit_label(unit)),
        };
        return LossyTimestampSnafu { from, value }.fail();
    }

    let target = DataType::Timestamp(TimeUnit::Second, tz.clone());
    let array = cast(time.as_ref(), &target).context(EncodeSnafu)?;
    Ok((Field::new(TIME_COLUMN, target, true), array))
}

fn encode_value(field: &Field, column: &ArrayRef) -> IngestResult<(Field, ArrayRef)> {
    let array = cast_with_options(column.as_ref(), &DataType::Float32, &STRICT)
        .context(EncodeSnafu)?;
    Ok((Field::new(field.name(), DataType::Float32, true), array))
}

fn build(batch: &RecordBatch) -> IngestResult<RecordBatch> {
    let schema = batch.schema();
    let mut fields = Vec::with_capacity(batch.num_columns());
    let mut columns = Vec::with_capacity(batch.num_columns());

    if let Some(time) = batch.column_by_name(TIME_COLUMN) {
        let (field, array) = encode_time(time)?;
        fields.push(field);
        columns.push(array);
    }
    for (field, column) in schema.fields().iter().zip(batch.columns()) {
        if field.name() == TIME_COLUMN {
            continue;
        }
        let (field, array) = encode_value(field, column)?;
        fields.push(field);
        columns.push(array);
    }
    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).context(EncodeSnafu)
}

/// Convert a table to the artifact layout.
///
/// Fails when `time` is not a timestamp, when narrowing `time` to seconds
/// would drop a sub-second part, or when a value column cannot be read as a
/// number.
pub fn convert_to_arrow(batch: &RecordBatch) -> IngestResult<RecordBatch> {
    build(batch).inspect_err(|err| log::error!("failed to encode table: {err}"))
}

/// Convert a table to the artifact layout and serialize it as an Arrow IPC
/// file.
pub fn encode_table(batch: &RecordBatch) -> IngestResult<Vec<u8>> {
    let artifact = convert_to_arrow(batch)?;
    let bytes = dump_arrow_bytes(&artifact)?;
    log::debug!(
        "encoded artifact: {} rows, {} columns, {} bytes",
        artifact.num_rows(),
        artifact.num_columns(),
        bytes.len()
    );
    Ok(bytes)
}
