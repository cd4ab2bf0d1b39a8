//! Tagged run records and the sinks that consume them
//!
//! A run emits a flat stream of records. Every consumer (the in-memory
//! report, the live console, the persisted log) implements [`RecordSink`].
//!
//! ```text
//! test GET /items
//! ok 200
//! ok 200
//! failed 500 200,404
//! ```

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::model::DocumentedCodes;
use crate::strategy::ParamValues;

/// One event of a run, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    OperationStart { method: String, path: String },
    Pass { status: u16 },
    Fail { status: u16, documented: DocumentedCodes },
}

impl Record {
    /// Whitespace-tokenized run-log line (no trailing newline).
    #[must_use]
    pub fn to_log_line(&self) -> String {
        match self {
            Self::OperationStart { method, path } => format!("test {method} {path}"),
            Self::Pass { status } => format!("ok {status}"),
            Self::Fail { status, documented } => {
                format!("failed {status} {}", documented.to_token())
            }
        }
    }

    /// Parse one line written by [`Record::to_log_line`].
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Malformed`] when the line is not a known record.
    pub fn parse_log_line(line: &str) -> Result<Self, ReportError> {
        let malformed = || ReportError::Malformed(line.to_string());
        let mut tokens = line.split_whitespace();
        let record = match tokens.next() {
            Some("test") => Self::OperationStart {
                method: tokens.next().ok_or_else(malformed)?.to_string(),
                path: tokens.next().ok_or_else(malformed)?.to_string(),
            },
            Some("ok") => Self::Pass {
                status: parse_status(tokens.next()).ok_or_else(malformed)?,
            },
            Some("failed") => Self::Fail {
                status: parse_status(tokens.next()).ok_or_else(malformed)?,
                documented: tokens
                    .next()
                    .and_then(DocumentedCodes::parse_token)
                    .ok_or_else(malformed)?,
            },
            _ => return Err(malformed()),
        };
        if tokens.next().is_some() {
            return Err(malformed());
        }
        Ok(record)
    }
}

fn parse_status(token: Option<&str>) -> Option<u16> {
    token?.parse().ok()
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_log_line())
    }
}

/// Consumer of the record stream.
pub trait RecordSink {
    /// # Errors
    ///
    /// A sink that cannot record (I/O failure, record out of order) returns
    /// [`ReportError`]; the run treats this as fatal.
    fn accept(&mut self, record: &Record) -> Result<(), ReportError>;

    /// A trial verdict along with the values it was drawn with.
    ///
    /// The record stays the unit of persistence; sinks that have nowhere to
    /// show inputs keep the default and see the record alone.
    fn accept_trial(&mut self, record: &Record, params: &ParamValues) -> Result<(), ReportError> {
        let _ = params;
        self.accept(record)
    }
}

impl<S: RecordSink + ?Sized> RecordSink for &mut S {
    fn accept(&mut self, record: &Record) -> Result<(), ReportError> {
        (**self).accept(record)
    }

    fn accept_trial(&mut self, record: &Record, params: &ParamValues) -> Result<(), ReportError> {
        (**self).accept_trial(record, params)
    }
}

/// Durable run log: one line per record, flushed as it arrives.
pub struct RunLog<W: Write> {
    writer: W,
}

impl RunLog<BufWriter<File>> {
    /// Create (or truncate) the log file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Io`] if the file cannot be created.
    pub fn create(path: &Path) -> Result<Self, ReportError> {
        let file = File::create(path)
            .map_err(|e| ReportError::Io(format!("create {}: {e}", path.display())))?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> RunLog<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> RecordSink for RunLog<W> {
    fn accept(&mut self, record: &Record) -> Result<(), ReportError> {
        writeln!(self.writer, "{}", record.to_log_line())
            .and_then(|()| self.writer.flush())
            .map_err(|e| ReportError::Io(format!("write run log: {e}")))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("malformed record: {0:?}")]
    Malformed(String),
    #[error("trial record before any operation start: {0}")]
    Orphan(String),
}
