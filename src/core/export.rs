// LogStitch - core/export.rs
//
// CSV and JSON-lines export of parsed events.
// Core layer: writes to any Write trait object. Events are written one at a
// time so a stream never has to be collected first.

use crate::core::model::ParsedEvent;
use crate::util::error::ExportError;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Output format for parsed events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Header row, then `sequence,timestamp,fields,text` per event. The
    /// fields column holds a JSON object.
    Csv,
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" | "jsonl" | "json-lines" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(format!("unknown export format '{other}' (expected json or csv)")),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Json => f.write_str("json"),
            ExportFormat::Csv => f.write_str("csv"),
        }
    }
}

enum Sink<W: Write> {
    Json(W),
    Csv(csv::Writer<W>),
}

/// Incremental event writer.
///
/// `path` names the destination in error messages only.
pub struct EventWriter<W: Write> {
    sink: Sink<W>,
    path: PathBuf,
    count: usize,
}

impl<W: Write> EventWriter<W> {
    /// Create a writer; for CSV the header row is written immediately.
    pub fn new(writer: W, format: ExportFormat, path: &Path) -> Result<Self, ExportError> {
        let sink = match format {
            ExportFormat::Json => Sink::Json(writer),
            ExportFormat::Csv => {
                let mut csv_writer = csv::Writer::from_writer(writer);
                csv_writer
                    .write_record(["sequence", "timestamp", "fields", "text"])
                    .map_err(|e| ExportError::Csv {
                        path: path.to_path_buf(),
                        source: e,
                    })?;
                Sink::Csv(csv_writer)
            }
        };
        Ok(Self {
            sink,
            path: path.to_path_buf(),
            count: 0,
        })
    }

    pub fn write(&mut self, event: &ParsedEvent) -> Result<(), ExportError> {
        match &mut self.sink {
            Sink::Json(writer) => {
                serde_json::to_writer(&mut *writer, event).map_err(|e| ExportError::Json {
                    path: self.path.clone(),
                    source: e,
                })?;
                writer.write_all(b"\n").map_err(|e| ExportError::Io {
                    path: self.path.clone(),
                    source: e,
                })?;
            }
            Sink::Csv(writer) => {
                let fields = serde_json::to_string(event.fields()).map_err(|e| ExportError::Json {
                    path: self.path.clone(),
                    source: e,
                })?;
                writer
                    .write_record([
                        event.sequence().to_string().as_str(),
                        event.timestamp().to_rfc3339().as_str(),
                        fields.as_str(),
                        event.text(),
                    ])
                    .map_err(|e| ExportError::Csv {
                        path: self.path.clone(),
                        source: e,
                    })?;
            }
        }
        self.count += 1;
        Ok(())
    }

    /// Flush and return the number of events written.
    pub fn finish(self) -> Result<usize, ExportError> {
        let flushed = match self.sink {
            Sink::Json(mut writer) => writer.flush(),
            Sink::Csv(mut writer) => writer.flush(),
        };
        flushed.map_err(|e| ExportError::Io {
            path: self.path,
            source: e,
        })?;
        Ok(self.count)
    }
}

/// Export events as JSON lines.
pub fn export_json_lines<W: Write>(
    events: &[ParsedEvent],
    writer: W,
    export_path: &Path,
) -> Result<usize, ExportError> {
    export_all(events, writer, ExportFormat::Json, export_path)
}

/// Export events as CSV.
pub fn export_csv<W: Write>(
    events: &[ParsedEvent],
    writer: W,
    export_path: &Path,
) -> Result<usize, ExportError> {
    export_all(events, writer, ExportFormat::Csv, export_path)
}

fn export_all<W: Write>(
    events: &[ParsedEvent],
    writer: W,
    format: ExportFormat,
    export_path: &Path,
) -> Result<usize, ExportError> {
    let mut out = EventWriter::new(writer, format, export_path)?;
    for event in events {
        out.write(event)?;
    }
    out.finish()
}
