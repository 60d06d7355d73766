//! CSV reading and writing.
//!
//! Reading happens in two passes over one in-memory buffer:
//!
//! 1. Comment (`#`) and blank lines are dropped, then only the header record
//!    is scanned. Headers that look like data (a number) or like a
//!    placeholder (empty, `Unnamed: 3`) are rejected before the body is
//!    touched.
//! 2. The body is read with every column as text, then each column is typed:
//!    `time` is promoted to a timestamp column when its values parse, every
//!    other column becomes `Float64` when all non-missing values are numbers
//!    and stays text otherwise.
//!
//! Missing values are empty cells, the usual NA spellings and the sentinel
//! values `-999` / `-9999` (compared numerically, so `-999.00` also counts).

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, StringArray};
use arrow::compute::concat_batches;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use arrow_csv::reader::Format;
use arrow_csv::{ReaderBuilder, WriterBuilder};
use snafu::prelude::*;

use crate::TIME_COLUMN;
use crate::error::{
    CsvEncodingSnafu, CsvParseSnafu, CsvWriteSnafu, EmptyCsvSnafu, EmptyHeaderSnafu,
    IngestResult, NoColumnsSnafu, NumericHeaderSnafu,
};
use crate::timestamp::parse_time_column;

/// Numeric values treated as missing.
pub const NA_SENTINELS: [f64; 2] = [-999.0, -9999.0];

const NA_STRINGS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

const PLACEHOLDER_PREFIX: &str = "Unnamed:";

const BATCH_SIZE: usize = 8192;

/// True when a raw cell denotes a missing value.
pub fn is_na(raw: &str) -> bool {
    let raw = raw.trim();
    if NA_STRINGS.contains(&raw) {
        return true;
    }
    match raw.parse::<f64>() {
        Ok(v) => NA_SENTINELS.contains(&v),
        Err(_) => false,
    }
}

/// Drop comment and blank lines.
///
/// Only lines whose first character is `#` are comments; a `#` later in a
/// line is data.
fn strip_comments_and_blanks(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Read just the header record.
fn read_headers(body: &str) -> IngestResult<Vec<String>> {
    let format = Format::default().with_header(true);
    let (schema, _) = format
        .infer_schema(Cursor::new(body.as_bytes()), Some(0))
        .context(CsvParseSnafu)?;
    Ok(schema.fields().iter().map(|f| f.name().clone()).collect())
}

/// Reject header rows that are really data or contain unnamed columns.
pub fn validate_headers(headers: &[String]) -> IngestResult<()> {
    ensure!(!headers.is_empty(), NoColumnsSnafu);

    for (index, header) in headers.iter().enumerate() {
        if header.trim().parse::<f64>().is_ok() {
            return NumericHeaderSnafu {
                header: header.clone(),
            }
            .fail();
        }
        if header.is_empty() || header.starts_with(PLACEHOLDER_PREFIX) {
            return EmptyHeaderSnafu { index }.fail();
        }
    }
    Ok(())
}

/// Rename repeated headers to `name.1`, `name.2`, ... keeping the first as is.
fn dedupe_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::with_capacity(headers.len());
    for header in headers {
        let mut name = header.clone();
        while let Some(count) = seen.get_mut(&name) {
            *count += 1;
            name = format!("{header}.{count}");
        }
        seen.insert(name.clone(), 0);
        out.push(name);
    }
    out
}

/// Numeric view of a text column, if every non-missing value is a number.
fn as_numeric(values: &StringArray) -> Option<Float64Array> {
    values
        .iter()
        .map(|value| match value {
            None => Some(None),
            Some(raw) if is_na(raw) => Some(None),
            Some(raw) => raw.trim().parse::<f64>().ok().map(Some),
        })
        .collect::<Option<Vec<Option<f64>>>>()
        .map(Float64Array::from)
}

/// Text column with missing-value spellings turned into nulls.
fn as_text(values: &StringArray) -> StringArray {
    values
        .iter()
        .map(|value| value.filter(|raw| !is_na(raw)))
        .collect()
}

/// Assign the final type of one text column.
fn type_column(name: &str, values: &StringArray) -> (Field, ArrayRef) {
    if name == TIME_COLUMN {
        if let Some(times) = parse_time_column(values, is_na) {
            let field = Field::new(name, times.data_type().clone(), true);
            return (field, Arc::new(times));
        }
        log::debug!("\"{name}\" column left as text: values are not uniform timestamps");
    } else if let Some(numbers) = as_numeric(values) {
        return (Field::new(name, DataType::Float64, true), Arc::new(numbers));
    }
    (Field::new(name, DataType::Utf8, true), Arc::new(as_text(values)))
}

/// Read CSV bytes into one batch.
pub fn read_csv(content: &[u8]) -> IngestResult<RecordBatch> {
    let text = std::str::from_utf8(content).context(CsvEncodingSnafu)?;
    let body = strip_comments_and_blanks(text);

    let headers = read_headers(&body)?;
    validate_headers(&headers)?;
    let headers = dedupe_headers(headers);

    let raw_schema: SchemaRef = Arc::new(Schema::new(
        headers
            .iter()
            .map(|name| Field::new(name, DataType::Utf8, true))
            .collect::<Vec<_>>(),
    ));

    let reader = ReaderBuilder::new(raw_schema.clone())
        .with_format(Format::default().with_header(true))
        .with_batch_size(BATCH_SIZE)
        .build(Cursor::new(body.as_bytes()))
        .context(CsvParseSnafu)?;
    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .context(CsvParseSnafu)?;
    let raw = concat_batches(&raw_schema, &batches).context(CsvParseSnafu)?;

    ensure!(raw.num_rows() > 0, EmptyCsvSnafu);

    let mut fields = Vec::with_capacity(headers.len());
    let mut columns = Vec::with_capacity(headers.len());
    for (name, column) in headers.iter().zip(raw.columns()) {
        let Some(values) = column.as_any().downcast_ref::<StringArray>() else {
            // Every column was read as Utf8 above.
            continue;
        };
        let (field, array) = type_column(name, values);
        fields.push(field);
        columns.push(array);
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).context(CsvParseSnafu)
}

/// Render a batch as CSV text with a header row.
///
/// Timestamps are written in RFC 3339 form and nulls as empty cells, so the
/// output reads back through [`read_csv`].
pub fn write_csv(batch: &RecordBatch) -> IngestResult<Vec<u8>> {
    let mut writer = WriterBuilder::new().with_header(true).build(Vec::new());
    writer.write(batch).context(CsvWriteSnafu)?;
    Ok(writer.into_inner())
}
