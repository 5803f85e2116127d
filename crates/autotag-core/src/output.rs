//! The keyword suggestion report.
//!
//! A JSON object mapping each tagged image path to its `[keyword, score]`
//! pairs, in catalog order:
//!
//! ```json
//! {
//!   "/photos/DSC_0001.NEF": [["sunset", 0.71], ["mountain", 0.62]]
//! }
//! ```

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::types::ProcessingResult;

/// Serializes the suggestions of a [`ProcessingResult`].
struct Report<'a>(&'a ProcessingResult);

impl Serialize for Report<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for (path, keywords) in self.0.suggestions() {
            map.serialize_entry(&path.to_string_lossy(), keywords)?;
        }
        map.end()
    }
}

/// Writes reports to any [`Write`] sink.
pub struct ReportWriter<W: Write> {
    writer: W,
    pretty: bool,
    entries_written: usize,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(writer: W, pretty: bool) -> Self {
        Self {
            writer,
            pretty,
            entries_written: 0,
        }
    }

    /// Write the report for `result`, followed by a newline.
    pub fn write(&mut self, result: &ProcessingResult) -> io::Result<()> {
        let report = Report(result);
        if self.pretty {
            serde_json::to_writer_pretty(&mut self.writer, &report).map_err(io::Error::other)?;
        } else {
            serde_json::to_writer(&mut self.writer, &report).map_err(io::Error::other)?;
        }
        writeln!(self.writer)?;
        self.entries_written += result.suggestions().count();
        self.writer.flush()
    }

    /// Number of image entries written so far.
    pub fn entries_written(&self) -> usize {
        self.entries_written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl ReportWriter<BufWriter<File>> {
    /// Write the report for `result` to `path`, replacing any existing file.
    ///
    /// Returns the number of image entries written.
    pub fn write_file(path: &Path, result: &ProcessingResult, pretty: bool) -> io::Result<usize> {
        let file = File::create(path)?;
        let mut writer = ReportWriter::new(BufWriter::new(file), pretty);
        writer.write(result)?;
        tracing::info!(
            "Wrote suggestions for {} images to {:?}",
            writer.entries_written(),
            path
        );
        Ok(writer.entries_written())
    }
}

/// Serialize the report to a string.
pub fn to_json(result: &ProcessingResult, pretty: bool) -> Result<String, serde_json::Error> {
    if pretty {
        serde_json::to_string_pretty(&Report(result))
    } else {
        serde_json::to_string(&Report(result))
    }
}
