use std::error::Error;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, StringArray, TimestampNanosecondArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::DateTime;

use crate::time_index::JobTimeIndex;

pub(crate) type TestResult = Result<(), Box<dyn Error>>;

pub(crate) fn nanos(rfc3339: &str) -> Result<i64, Box<dyn Error>> {
    DateTime::parse_from_rfc3339(rfc3339)?
        .timestamp_nanos_opt()
        .ok_or_else(|| format!("{rfc3339} out of range").into())
}

/// UTC-tagged nanosecond `time` column plus float64 value columns.
pub(crate) fn hourly_batch(
    times: &[&str],
    columns: &[(&str, &[f64])],
) -> Result<RecordBatch, Box<dyn Error>> {
    let values = times
        .iter()
        .map(|t| nanos(t))
        .collect::<Result<Vec<_>, _>>()?;
    let time = TimestampNanosecondArray::from(values).with_timezone("UTC");
    batch_with_time(time, columns)
}

pub(crate) fn batch_with_time(
    time: TimestampNanosecondArray,
    columns: &[(&str, &[f64])],
) -> Result<RecordBatch, Box<dyn Error>> {
    let mut fields = vec![Field::new("time", time.data_type().clone(), true)];
    let mut arrays: Vec<ArrayRef> = vec![Arc::new(time)];
    for (name, values) in columns {
        fields.push(Field::new(*name, DataType::Float64, true));
        arrays.push(Arc::new(Float64Array::from(values.to_vec())));
    }
    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
}

/// All-text batch.
pub(crate) fn text_batch(columns: &[(&str, &[&str])]) -> Result<RecordBatch, Box<dyn Error>> {
    let fields: Vec<Field> = columns
        .iter()
        .map(|(name, _)| Field::new(*name, DataType::Utf8, true))
        .collect();
    let arrays: Vec<ArrayRef> = columns
        .iter()
        .map(|(_, values)| Arc::new(StringArray::from(values.to_vec())) as ArrayRef)
        .collect();
    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
}

pub(crate) fn index_of(timezone: &str, times: &[&str]) -> Result<JobTimeIndex, Box<dyn Error>> {
    let values = times
        .iter()
        .map(|t| nanos(t))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(JobTimeIndex::try_from_nanos(timezone, values)?)
}
