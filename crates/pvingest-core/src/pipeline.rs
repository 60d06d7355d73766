//! The upload entry point: decode, validate, align and encode in one call.
//!
//! ```no_run
//! use pvingest_core::{IngestOptions, JobSpec, ingest};
//!
//! # fn run(job_json: &str, upload: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
//! let job: JobSpec = serde_json::from_str(job_json)?;
//! let index = job.time_index.build()?;
//! let report = ingest(upload, "text/csv", &job.columns, &index, &IngestOptions::default())?;
//! println!("{} rows, {} missing", report.rows, report.missing_times.len());
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeSet;

use arrow::array::timezone::Tz;
use arrow::record_batch::RecordBatch;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::TIME_COLUMN;
use crate::encode::encode_table;
use crate::error::{IngestResult, ProjectColumnsSnafu, TimeIndexMismatchSnafu};
use crate::formats::arrow_ipc::read_arrow;
use crate::formats::csv::write_csv;
use crate::formats::read_table;
use crate::reindex::reindex_timeseries;
use crate::time_index::{JobTimeIndex, TimeIndexConfig, TimeIndexError};
use crate::validate::validate_table;

/// How many offending timestamps a rejected mismatch names.
const MISMATCH_EXAMPLES: usize = 3;

/// What a job expects from an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Required column names; `time` is always required.
    pub columns: Vec<String>,
    /// The grid the upload is aligned to.
    pub time_index: TimeIndexConfig,
}

impl JobSpec {
    /// Materialize the job's time grid.
    pub fn build_time_index(&self) -> Result<JobTimeIndex, TimeIndexError> {
        self.time_index.build()
    }
}

/// Treatment of timestamps that do not line up with the grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MismatchPolicy {
    /// Accept the upload and report extra and missing timestamps.
    #[default]
    Report,
    /// Fail when any timestamp is extra or missing.
    Reject,
}

/// Knobs for [`ingest`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestOptions {
    /// Mismatch handling.
    pub mismatch: MismatchPolicy,
    /// Keep columns the job did not ask for in the artifact.
    pub keep_extra_columns: bool,
}

/// Outcome of a successful [`ingest`].
#[derive(Debug, Clone)]
pub struct IngestReport {
    /// Arrow IPC file bytes of the stored artifact.
    pub artifact: Vec<u8>,
    /// Rows in the artifact (the grid length).
    pub rows: usize,
    /// Upload columns the job did not ask for.
    pub extra_columns: BTreeSet<String>,
    /// Upload timestamps outside the grid.
    pub extra_times: Vec<DateTime<Tz>>,
    /// Grid timestamps the upload did not cover.
    pub missing_times: Vec<DateTime<Tz>>,
}

fn drop_columns(batch: &RecordBatch, drop: &BTreeSet<String>) -> IngestResult<RecordBatch> {
    if drop.is_empty() {
        return Ok(batch.clone());
    }
    let schema = batch.schema();
    let keep: Vec<usize> = schema
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, field)| !drop.contains(field.name()))
        .map(|(i, _)| i)
        .collect();
    batch.project(&keep).context(ProjectColumnsSnafu)
}

fn examples(extra: &[DateTime<Tz>], missing: &[DateTime<Tz>]) -> String {
    extra
        .iter()
        .map(|t| format!("extra {}", t.to_rfc3339()))
        .chain(missing.iter().map(|t| format!("missing {}", t.to_rfc3339())))
        .take(MISMATCH_EXAMPLES)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Run one upload through the whole pipeline.
///
/// Stages, each of which may reject the upload:
///
/// 1. the content type picks a decoder and the bytes are decoded,
/// 2. the table is checked against `columns` (plus `time`),
/// 3. unexpected columns are dropped unless
///    [`IngestOptions::keep_extra_columns`] is set,
/// 4. rows are aligned onto `index`; with [`MismatchPolicy::Reject`] any
///    extra or missing timestamp fails the upload,
/// 5. the aligned table is encoded into artifact bytes.
pub fn ingest<S: AsRef<str>>(
    content: &[u8],
    content_type: &str,
    columns: &[S],
    index: &JobTimeIndex,
    options: &IngestOptions,
) -> IngestResult<IngestReport> {
    let batch = read_table(content, content_type)?;

    let expected = columns
        .iter()
        .map(|c| c.as_ref())
        .chain(std::iter::once(TIME_COLUMN));
    let extra_columns = validate_table(&batch, expected)?;

    let batch = if options.keep_extra_columns {
        batch
    } else {
        drop_columns(&batch, &extra_columns)?
    };

    let reconciled = reindex_timeseries(&batch, index)?;
    if options.mismatch == MismatchPolicy::Reject && !reconciled.is_aligned() {
        return TimeIndexMismatchSnafu {
            extra_count: reconciled.extra.len(),
            missing_count: reconciled.missing.len(),
            examples: examples(&reconciled.extra, &reconciled.missing),
        }
        .fail();
    }

    let artifact = encode_table(&reconciled.table)?;
    log::info!(
        "ingested {} rows onto a grid of {} timestamps ({} extra, {} missing)",
        batch.num_rows(),
        index.len(),
        reconciled.extra.len(),
        reconciled.missing.len()
    );

    Ok(IngestReport {
        artifact,
        rows: reconciled.table.num_rows(),
        extra_columns,
        extra_times: reconciled.extra,
        missing_times: reconciled.missing,
    })
}

/// Decode artifact bytes produced by [`ingest`].
pub fn read_artifact(artifact: &[u8]) -> IngestResult<RecordBatch> {
    read_arrow(artifact)
}

/// Render artifact bytes as CSV text.
pub fn export_csv(artifact: &[u8]) -> IngestResult<Vec<u8>> {
    write_csv(&read_arrow(artifact)?)
}
