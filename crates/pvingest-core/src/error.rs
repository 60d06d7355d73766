//! Error types and SNAFU context selectors for the ingest pipeline.
//!
//! All stages report failures through [`IngestError`]. Each variant belongs to
//! one [`ErrorKind`] (what went wrong) and one [`ErrorClass`] (how a caller
//! such as an HTTP handler should answer). The display string is the
//! human-readable detail returned to the uploader, so keep new messages short
//! and free of internal jargon.

use arrow::error::ArrowError;
use chrono::NaiveDateTime;
use snafu::prelude::*;

/// A convenience alias for results produced by this crate.
pub type IngestResult<T> = Result<T, IngestError>;

/// Broad category of an ingest failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The content type is not one of the accepted formats.
    UnsupportedFormat,
    /// The bytes could not be parsed into a table.
    MalformedInput,
    /// The table does not match the expected columns or column types.
    SchemaViolation,
    /// The `time` column could not be aligned with the expected time index.
    TimeIndexViolation,
    /// A validated table could not be cast into the stored artifact layout.
    EncodingViolation,
}

/// Status class reported to the caller for a rejected upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The declared media type is not accepted (HTTP 415).
    UnsupportedMediaType,
    /// The content was rejected (HTTP 400).
    BadRequest,
}

impl ErrorClass {
    /// HTTP status code conventionally associated with this class.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorClass::UnsupportedMediaType => 415,
            ErrorClass::BadRequest => 400,
        }
    }

    /// Stable machine-readable label for this class.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::UnsupportedMediaType => "unsupported-media-type",
            ErrorClass::BadRequest => "bad-request",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from reading, validating, aligning or encoding uploaded data.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum IngestError {
    /// The content type is neither CSV nor an Arrow IPC file.
    #[snafu(display(
        "Acceptable formats are CSV (text/csv) and the Apache Arrow file format \
         (application/vnd.apache.arrow.file)"
    ))]
    UnsupportedMediaType {
        /// Content type supplied by the caller.
        content_type: String,
    },

    /// CSV bytes are not valid UTF-8.
    #[snafu(display("CSV content is not valid UTF-8: {source}"))]
    CsvEncoding {
        /// Underlying UTF-8 decoding error.
        source: std::str::Utf8Error,
    },

    /// The CSV input has no header row at all.
    #[snafu(display("No columns to parse from file"))]
    NoColumns,

    /// A header token parses as a number, so the header row is probably missing.
    #[snafu(display(
        "The header '{header}' can be parsed as a float indicating a header row may be missing?"
    ))]
    NumericHeader {
        /// Offending header token.
        header: String,
    },

    /// A header token is empty or an auto-generated placeholder.
    #[snafu(display("Empty header for column {index}"))]
    EmptyHeader {
        /// Zero-based position of the offending column.
        index: usize,
    },

    /// The CSV has a header but no data rows.
    #[snafu(display("Empty CSV file"))]
    EmptyCsv,

    /// Structural CSV failure reported by the CSV parser.
    #[snafu(display("{source}"))]
    CsvParse {
        /// Underlying Arrow CSV error.
        source: ArrowError,
    },

    /// The Arrow IPC file could not be decoded.
    #[snafu(display("{source}"))]
    ArrowRead {
        /// Underlying Arrow IPC error.
        source: ArrowError,
    },

    /// Required columns are absent.
    #[snafu(display("Data is missing column(s) {}", columns.join(", ")))]
    MissingColumns {
        /// Every missing column name, sorted.
        columns: Vec<String>,
    },

    /// The `time` column is not timestamp-typed.
    #[snafu(display("\"time\" column could not be parsed as a timestamp"))]
    TimeNotTimestamp,

    /// The `time` column contains repeated values.
    #[snafu(display("\"time\" column has {count} duplicate entries"))]
    DuplicateTimes {
        /// Number of rows beyond the first occurrence of each value.
        count: usize,
    },

    /// Expected data columns hold non-numeric values.
    #[snafu(display("The following column(s) are not numeric: {}", columns.join(", ")))]
    NonNumericColumns {
        /// Every offending column name, sorted.
        columns: Vec<String>,
    },

    /// The table has no `time` column to align.
    #[snafu(display("Data is missing column(s) time"))]
    MissingTimeColumn,

    /// A naive timestamp falls in a repeated wall-clock hour of the grid timezone.
    #[snafu(display("Cannot localize {value} to {timezone}: the local time is ambiguous"))]
    AmbiguousLocalTime {
        /// Naive wall-clock value.
        value: NaiveDateTime,
        /// Timezone of the expected time index.
        timezone: String,
    },

    /// A naive timestamp falls in a skipped wall-clock hour of the grid timezone.
    #[snafu(display("Cannot localize {value} to {timezone}: the local time does not exist"))]
    NonexistentLocalTime {
        /// Naive wall-clock value.
        value: NaiveDateTime,
        /// Timezone of the expected time index.
        timezone: String,
    },

    /// A timestamp cannot be represented as nanoseconds since the epoch.
    #[snafu(display("Timestamp {value} is out of the supported range"))]
    TimestampOutOfRange {
        /// Offending value as rendered for diagnostics.
        value: String,
    },

    /// Upload timestamps do not match the expected time index and the caller
    /// asked for strict alignment.
    #[snafu(display(
        "Data timestamps do not match the expected time index: \
         {extra_count} extra, {missing_count} missing (e.g. {examples})"
    ))]
    TimeIndexMismatch {
        /// Number of timestamps present in the data but not expected.
        extra_count: usize,
        /// Number of expected timestamps absent from the data.
        missing_count: usize,
        /// A few offending timestamps for the message.
        examples: String,
    },

    /// Arrow failure while dropping columns the job does not expect.
    #[snafu(display("Failed to drop unexpected columns: {source}"))]
    ProjectColumns {
        /// Underlying Arrow error.
        source: ArrowError,
    },

    /// Arrow failure while assembling the reindexed table.
    #[snafu(display("Failed to align data to the time index: {source}"))]
    Reindex {
        /// Underlying Arrow error.
        source: ArrowError,
    },

    /// The `time` column is not a timestamp when building the artifact.
    #[snafu(display("\"time\" column is not a datetime"))]
    NotDatetime,

    /// Narrowing the `time` column to seconds would drop sub-second detail.
    #[snafu(display("Casting from {from} to timestamp[s] would lose data: {value}"))]
    LossyTimestamp {
        /// Source timestamp type description.
        from: String,
        /// Raw value in the source unit.
        value: i64,
    },

    /// A column could not be cast into the artifact schema.
    #[snafu(display("{source}"))]
    Encode {
        /// Underlying Arrow cast or batch construction error.
        source: ArrowError,
    },

    /// Writing the Arrow IPC file failed.
    #[snafu(display("Failed to write Arrow file: {source}"))]
    ArrowWrite {
        /// Underlying Arrow IPC error.
        source: ArrowError,
    },

    /// Rendering a table back to CSV failed.
    #[snafu(display("Failed to write CSV: {source}"))]
    CsvWrite {
        /// Underlying Arrow CSV error.
        source: ArrowError,
    },
}

impl IngestError {
    /// Category of this failure.
    pub fn kind(&self) -> ErrorKind {
        use IngestError::*;
        match self {
            UnsupportedMediaType { .. } => ErrorKind::UnsupportedFormat,
            CsvEncoding { .. }
            | NoColumns
            | NumericHeader { .. }
            | EmptyHeader { .. }
            | EmptyCsv
            | CsvParse { .. }
            | ArrowRead { .. } => ErrorKind::MalformedInput,
            MissingColumns { .. }
            | TimeNotTimestamp
            | DuplicateTimes { .. }
            | NonNumericColumns { .. }
            | MissingTimeColumn
            | ProjectColumns { .. } => ErrorKind::SchemaViolation,
            AmbiguousLocalTime { .. }
            | NonexistentLocalTime { .. }
            | TimestampOutOfRange { .. }
            | TimeIndexMismatch { .. }
            | Reindex { .. } => ErrorKind::TimeIndexViolation,
            NotDatetime
            | LossyTimestamp { .. }
            | Encode { .. }
            | ArrowWrite { .. }
            | CsvWrite { .. } => ErrorKind::EncodingViolation,
        }
    }

    /// Status class for reporting this failure.
    pub fn class(&self) -> ErrorClass {
        match self.kind() {
            ErrorKind::UnsupportedFormat => ErrorClass::UnsupportedMediaType,
            _ => ErrorClass::BadRequest,
        }
    }

    /// HTTP status code for reporting this failure.
    pub fn status_code(&self) -> u16 {
        self.class().status_code()
    }

    /// Human-readable detail string.
    pub fn detail(&self) -> String {
        self.to_string()
    }
}
