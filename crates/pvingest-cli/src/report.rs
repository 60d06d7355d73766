use std::io::Write;
use std::path::Path;

use arrow::array::timezone::Tz;
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use chrono::DateTime;
use pvingest_core::IngestReport;
use snafu::ResultExt;

use crate::error::{CliResult, RenderSnafu, StdoutSnafu};

/// Timestamps listed per category before the summary switches to a count.
const LISTED_TIMES: usize = 5;

pub fn write_ingest_summary<W: Write>(
    report: &IngestReport,
    output: &Path,
    out: &mut W,
) -> CliResult<()> {
    let extra_columns = if report.extra_columns.is_empty() {
        "(none)".to_string()
    } else {
        report
            .extra_columns
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    };

    writeln!(out, "rows: {}", report.rows).context(StdoutSnafu)?;
    writeln!(out, "extra_columns: {extra_columns}").context(StdoutSnafu)?;
    write_times(out, "extra_times", &rfc3339(&report.extra_times))?;
    write_times(out, "missing_times", &rfc3339(&report.missing_times))?;
    writeln!(
        out,
        "wrote: {} ({} bytes)",
        output.display(),
        report.artifact.len()
    )
    .context(StdoutSnafu)?;
    Ok(())
}

fn rfc3339(times: &[DateTime<Tz>]) -> Vec<String> {
    times.iter().map(DateTime::to_rfc3339).collect()
}

fn write_times<W: Write, T: std::fmt::Display>(
    out: &mut W,
    label: &str,
    times: &[T],
) -> CliResult<()> {
    writeln!(out, "{label}: {}", times.len()).context(StdoutSnafu)?;
    for t in times.iter().take(LISTED_TIMES) {
        writeln!(out, "  {t}").context(StdoutSnafu)?;
    }
    if times.len() > LISTED_TIMES {
        writeln!(out, "  ... {} more", times.len() - LISTED_TIMES).context(StdoutSnafu)?;
    }
    Ok(())
}

pub fn write_inspect<W: Write>(
    batch: &RecordBatch,
    max_rows: usize,
    out: &mut W,
) -> CliResult<()> {
    writeln!(out, "schema:").context(StdoutSnafu)?;
    for field in batch.schema().fields() {
        let nullable = if field.is_nullable() { "" } else { " not null" };
        writeln!(out, "  {}: {}{nullable}", field.name(), field.data_type())
            .context(StdoutSnafu)?;
    }

    let shown = max_rows.min(batch.num_rows());
    if shown > 0 {
        let preview = pretty_format_batches(&[batch.slice(0, shown)]).context(RenderSnafu)?;
        writeln!(out, "{preview}").context(StdoutSnafu)?;
    } else if batch.num_rows() > 0 {
        writeln!(out, "(preview suppressed; use --max-rows > 0)").context(StdoutSnafu)?;
    } else {
        writeln!(out, "(no rows)").context(StdoutSnafu)?;
    }

    writeln!(out, "total_rows: {}", batch.num_rows()).context(StdoutSnafu)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use arrow::array::{ArrayRef, Float32Array};
    use arrow::datatypes::{DataType, Field, Schema};

    use super::*;

    fn batch(rows: usize) -> Result<RecordBatch, Box<dyn std::error::Error>> {
        let values: Vec<f32> = (0..rows).map(|i| i as f32).collect();
        let schema = Schema::new(vec![Field::new("ghi", DataType::Float32, true)]);
        Ok(RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(Float32Array::from(values)) as ArrayRef],
        )?)
    }

    #[test]
    fn summary_lists_a_few_times_then_counts() -> Result<(), Box<dyn std::error::Error>> {
        let report = IngestReport {
            artifact: vec![0; 16],
            rows: 24,
            extra_columns: BTreeSet::from(["note".to_string(), "flag".to_string()]),
            extra_times: Vec::new(),
            missing_times: Vec::new(),
        };
        let mut out = Vec::new();
        write_ingest_summary(&report, Path::new("out.arrow"), &mut out)?;
        let text = String::from_utf8(out)?;
        assert!(text.contains("rows: 24"), "{text}");
        assert!(text.contains("extra_columns: flag, note"), "{text}");
        assert!(text.contains("missing_times: 0"), "{text}");
        assert!(text.contains("wrote: out.arrow (16 bytes)"), "{text}");

        let mut out = Vec::new();
        let times: Vec<u32> = (0..8).collect();
        write_times(&mut out, "missing_times", &times)?;
        let text = String::from_utf8(out)?;
        assert!(text.starts_with("missing_times: 8\n  0\n"), "{text}");
        assert!(text.contains("... 3 more"), "{text}");
        Ok(())
    }

    #[test]
    fn inspect_respects_max_rows() -> Result<(), Box<dyn std::error::Error>> {
        let mut out = Vec::new();
        write_inspect(&batch(4)?, 2, &mut out)?;
        let text = String::from_utf8(out)?;
        assert!(text.contains("ghi: Float32"), "{text}");
        assert!(text.contains("| 1.0 |") || text.contains("| 1   |"), "{text}");
        assert!(!text.contains("| 3"), "{text}");
        assert!(text.contains("total_rows: 4"), "{text}");

        let mut out = Vec::new();
        write_inspect(&batch(4)?, 0, &mut out)?;
        assert!(String::from_utf8(out)?.contains("preview suppressed"));
        Ok(())
    }
}
