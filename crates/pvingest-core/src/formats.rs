//! Upload format detection and decoding.
//!
//! Uploads arrive as raw bytes plus a declared media type. Two families are
//! accepted:
//!
//! - delimited text (`text/csv`, and `application/vnd.ms-excel` which some
//!   browsers send for `.csv` files), handled by [`csv`];
//! - Arrow IPC files (`application/vnd.apache.arrow.file`, and the generic
//!   `application/octet-stream`), handled by [`arrow_ipc`].
//!
//! The media type is checked before any byte is parsed.

pub mod arrow_ipc;
pub mod csv;

use arrow::record_batch::RecordBatch;

use crate::error::{IngestResult, UnsupportedMediaTypeSnafu};

/// Media types decoded as CSV.
pub const CSV_MEDIA_TYPES: &[&str] = &["text/csv", "application/vnd.ms-excel"];

/// Media types decoded as Arrow IPC files.
pub const ARROW_MEDIA_TYPES: &[&str] = &[
    "application/octet-stream",
    "application/vnd.apache.arrow.file",
];

/// Media type written for stored artifacts.
pub const ARROW_FILE_MEDIA_TYPE: &str = "application/vnd.apache.arrow.file";

/// Accepted upload format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// Comma separated text with a header row.
    Csv,
    /// Arrow IPC file.
    ArrowFile,
}

impl InputFormat {
    /// Decode `content` in this format.
    pub fn read(self, content: &[u8]) -> IngestResult<RecordBatch> {
        match self {
            InputFormat::Csv => csv::read_csv(content),
            InputFormat::ArrowFile => arrow_ipc::read_arrow(content),
        }
    }
}

/// Map a declared content type onto an accepted format.
///
/// Parameters such as `; charset=utf-8` and letter case are ignored.
pub fn verify_content_type(content_type: &str) -> IngestResult<InputFormat> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if CSV_MEDIA_TYPES.contains(&essence.as_str()) {
        Ok(InputFormat::Csv)
    } else if ARROW_MEDIA_TYPES.contains(&essence.as_str()) {
        Ok(InputFormat::ArrowFile)
    } else {
        UnsupportedMediaTypeSnafu {
            content_type: content_type.to_string(),
        }
        .fail()
    }
}

/// Check the content type, then decode `content` into one batch.
pub fn read_table(content: &[u8], content_type: &str) -> IngestResult<RecordBatch> {
    let format = verify_content_type(content_type)?;
    let batch = format.read(content)?;
    log::debug!(
        "decoded {format:?} upload: {} rows, {} columns",
        batch.num_rows(),
        batch.num_columns()
    );
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorClass, IngestError};

    #[test]
    fn csv_types_dispatch_to_csv() {
        for ct in ["text/csv", "application/vnd.ms-excel", "Text/CSV; charset=utf-8"] {
            assert_eq!(verify_content_type(ct).ok(), Some(InputFormat::Csv), "{ct}");
        }
    }

    #[test]
    fn arrow_types_dispatch_to_arrow() {
        for ct in [
            "application/octet-stream",
            "application/vnd.apache.arrow.file",
        ] {
            assert_eq!(
                verify_content_type(ct).ok(),
                Some(InputFormat::ArrowFile),
                "{ct}"
            );
        }
    }

    #[test]
    fn other_types_are_rejected_before_parsing() {
        // Content is valid CSV; the media type alone decides.
        let err = read_table(b"time,ghi\n2021-01-01,1\n", "application/json").unwrap_err();
        assert!(matches!(
            &err,
            IngestError::UnsupportedMediaType { content_type } if content_type == "application/json"
        ));
        assert_eq!(err.class(), ErrorClass::UnsupportedMediaType);

        assert!(verify_content_type("").is_err());
        assert!(verify_content_type("application/vnd.apache.arrow.stream").is_err());
    }
}
