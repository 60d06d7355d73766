//! Arrow IPC file ("Feather v2") reading and writing.
//!
//! Uploads and stored artifacts use the random-access IPC *file* format: a
//! single embedded schema followed by one or more record batches. Readers need
//! no external schema.

use std::io::Cursor;

use arrow::compute::concat_batches;
use arrow::ipc::reader::FileReader;
use arrow::ipc::writer::FileWriter;
use arrow::record_batch::RecordBatch;
use snafu::prelude::*;

use crate::error::{ArrowReadSnafu, ArrowWriteSnafu, IngestResult};

/// Decode an Arrow IPC file, concatenating all of its batches.
pub fn read_arrow(content: &[u8]) -> IngestResult<RecordBatch> {
    let reader = FileReader::try_new(Cursor::new(content), None).context(ArrowReadSnafu)?;
    let schema = reader.schema();
    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .context(ArrowReadSnafu)?;
    concat_batches(&schema, &batches).context(ArrowReadSnafu)
}

/// Write one batch as a self-describing Arrow IPC file.
pub fn dump_arrow_bytes(batch: &RecordBatch) -> IngestResult<Vec<u8>> {
    let mut writer =
        FileWriter::try_new(Vec::new(), batch.schema().as_ref()).context(ArrowWriteSnafu)?;
    writer.write(batch).context(ArrowWriteSnafu)?;
    writer.finish().context(ArrowWriteSnafu)?;
    writer.into_inner().context(ArrowWriteSnafu)
}
