use std::path::PathBuf;

use pvingest_core::{IngestError, TimeIndexError};
use snafu::Snafu;

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("Input file not found or not readable: {}", path.display()))]
    ReadInput {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Failed to write {}", path.display()))]
    WriteOutput {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Failed to write to stdout: {source}"))]
    Stdout { source: std::io::Error },

    #[snafu(display("Job file {} is not a valid job description: {source}", path.display()))]
    ParseJob {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[snafu(display("Job file {} has an invalid time index: {source}", path.display()))]
    BuildTimeIndex {
        path: PathBuf,
        source: TimeIndexError,
    },

    #[snafu(display(
        "Cannot infer a content type from {}. Pass --content-type text/csv or \
         --content-type application/vnd.apache.arrow.file.",
        path.display()
    ))]
    UnknownContentType { path: PathBuf },

    #[snafu(display("{} rejected ({}): {source}", path.display(), source.class()))]
    Ingest {
        path: PathBuf,
        #[snafu(source(from(IngestError, Box::new)))]
        source: Box<IngestError>,
    },

    #[snafu(display("Failed to render table: {source}"))]
    Render { source: arrow::error::ArrowError },
}
