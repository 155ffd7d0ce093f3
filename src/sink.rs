//! CSV output for report rows
//!
//! Rows have different widths, so the writer runs in flexible mode. Cells
//! containing commas (every item label does) are quoted.

use crate::error::StatError;
use crate::stats::ReportRow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub struct CsvSink;

impl CsvSink {
    /// Write all rows to `writer`
    pub fn write_rows<W: Write>(writer: W, rows: &[ReportRow]) -> Result<(), StatError> {
        let mut wtr = csv::WriterBuilder::new()
            .flexible(true)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(writer);

        for row in rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Write all rows to a file, replacing it
    pub fn write_file(path: impl AsRef<Path>, rows: &[ReportRow]) -> Result<(), StatError> {
        let file = File::create(path.as_ref())?;
        Self::write_rows(BufWriter::new(file), rows)
    }

    /// Render rows to an in-memory string
    pub fn to_string(rows: &[ReportRow]) -> Result<String, StatError> {
        let mut buf = Vec::new();
        Self::write_rows(&mut buf, rows)?;
        String::from_utf8(buf).map_err(|e| StatError::Sink(e.to_string()))
    }
}
