//! Data preparation pipeline for uploaded PV measurement time series.
//!
//! This crate turns raw uploads (CSV or Arrow IPC files) into clean,
//! schema-checked, time-aligned Arrow data:
//!
//! - Decoding raw bytes by media type into a single Arrow `RecordBatch`
//!   (`formats` module).
//! - Checking a batch against a job's expected columns, the `time` column
//!   type and duplicate timestamps (`validate` module).
//! - Building the canonical time grid a job expects data for
//!   (`time_index` module) and aligning uploads onto it while reporting
//!   extra and missing timestamps (`reindex` module).
//! - Narrowing validated data to the stored artifact layout (float32 values,
//!   second-precision timestamps) and writing it as an Arrow IPC file
//!   (`encode` module).
//! - A single upload entry point that chains the stages (`pipeline` module).
//!
//! Every operation is a synchronous function over in-memory buffers; errors
//! carry a status class so a transport layer can map them to responses.
#![deny(missing_docs)]
pub mod encode;
pub mod error;
pub mod formats;
pub mod pipeline;
pub mod reindex;
pub mod time_index;
pub mod timestamp;
pub mod validate;

#[cfg(test)]
pub(crate) mod test_util;

pub use error::{ErrorClass, ErrorKind, IngestError, IngestResult};
pub use pipeline::{
    IngestOptions, IngestReport, JobSpec, MismatchPolicy, export_csv, ingest, read_artifact,
};
pub use reindex::{Reconciliation, reindex_timeseries};
pub use time_index::{JobTimeIndex, TimeIndexConfig, TimeIndexError, TimeStep};

/// Name of the distinguished timestamp column.
pub const TIME_COLUMN: &str = "time";
