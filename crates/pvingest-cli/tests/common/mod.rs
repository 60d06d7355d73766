#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, TimestampMillisecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::ipc::writer::FileWriter;
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Duration};
use tempfile::TempDir;

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

pub const START: &str = "2021-01-01T00:00:00-07:00";

pub fn write_file(dir: &TempDir, name: &str, contents: &[u8]) -> TestResult<PathBuf> {
    let path = dir.path().join(name);
    std::fs::write(&path, contents)?;
    Ok(path)
}

/// Hourly job over `hours` hours starting at [`START`] in Phoenix time.
pub fn write_job(dir: &TempDir, columns: &[&str], hours: i64) -> TestResult<PathBuf> {
    let start = DateTime::parse_from_rfc3339(START)?;
    let end = start + Duration::hours(hours);
    let job = serde_json::json!({
        "columns": columns,
        "time_index": {
            "start": start.to_rfc3339(),
            "end": end.to_rfc3339(),
            "step": "1h",
            "timezone": "America/Phoenix",
        },
    });
    write_file(dir, "job.json", serde_json::to_string_pretty(&job)?.as_bytes())
}

/// CSV with `time,ghi,temp_air` rows for the given hour offsets from [`START`].
pub fn csv_for_hours(hours: &[i64]) -> TestResult<String> {
    let start = DateTime::parse_from_rfc3339(START)?;
    let mut out = String::from("# exported by a logger\ntime,ghi,temp_air\n");
    for h in hours {
        let t = start + Duration::hours(*h);
        out.push_str(&format!("{},{},{}\n", t.to_rfc3339(), h * 100, 20 + h));
    }
    Ok(out)
}

/// Arrow IPC upload with a millisecond UTC `time` column.
pub fn write_arrow_upload(path: &Path, hours: &[i64]) -> TestResult {
    let start = DateTime::parse_from_rfc3339(START)?.timestamp_millis();
    let times: Vec<i64> = hours.iter().map(|h| start + h * 3_600_000).collect();
    let ghi: Vec<f64> = hours.iter().map(|h| *h as f64 * 100.0).collect();

    let time = TimestampMillisecondArray::from(times).with_timezone("UTC");
    let schema = Schema::new(vec![
        Field::new(
            "time",
            DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into())),
            false,
        ),
        Field::new("ghi", DataType::Float64, false),
    ]);
    let batch = RecordBatch::try_new(
        Arc::new(schema.clone()),
        vec![
            Arc::new(time) as ArrayRef,
            Arc::new(Float64Array::from(ghi)),
        ],
    )?;

    let file = std::fs::File::create(path)?;
    let mut writer = FileWriter::try_new(file, &schema)?;
    writer.write(&batch)?;
    writer.finish()?;
    Ok(())
}
