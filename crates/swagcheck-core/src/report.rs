//! Aggregated per-operation outcomes of one run
//!
//! [`RunReport`] is itself a [`RecordSink`]: the engine feeds it live, and
//! [`RunReport::replay`] rebuilds the same report from a persisted run log.

use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::model::DocumentedCodes;
use crate::record::{Record, RecordSink, ReportError};

/// Outcomes of every tested operation, in the order operations were tested.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RunReport {
    pub operations: Vec<OperationReport>,
}

/// Tallies for one tested operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OperationReport {
    /// HTTP method
    pub method: String,
    /// Path template
    pub path: String,
    /// Trial count per passing status code
    pub passes: BTreeMap<u16, u64>,
    /// Every failing trial, in arrival order
    pub failures: Vec<FailureEntry>,
}

/// A status the operation does not document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FailureEntry {
    /// Observed HTTP status
    pub status: u16,
    /// Codes the operation documents
    pub documented: DocumentedCodes,
}

impl OperationReport {
    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            passes: BTreeMap::new(),
            failures: Vec::new(),
        }
    }

    #[must_use]
    pub fn trials(&self) -> u64 {
        self.passes.values().sum::<u64>() + self.failures.len() as u64
    }
}

impl RunReport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a report from run-log lines. Blank lines are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError`] on an unreadable or malformed line, or a trial
    /// record that precedes every operation start.
    pub fn replay(reader: impl BufRead) -> Result<Self, ReportError> {
        let mut report = Self::new();
        for line in reader.lines() {
            let line = line.map_err(|e| ReportError::Io(format!("read run log: {e}")))?;
            if line.trim().is_empty() {
                continue;
            }
            report.accept(&Record::parse_log_line(&line)?)?;
        }
        Ok(report)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    #[must_use]
    pub fn total_passes(&self) -> u64 {
        self.operations
            .iter()
            .flat_map(|op| op.passes.values())
            .sum()
    }

    #[must_use]
    pub fn total_failures(&self) -> usize {
        self.operations.iter().map(|op| op.failures.len()).sum()
    }

    /// Write the human-readable report. Successes precede failures within
    /// each operation.
    ///
    /// # Errors
    ///
    /// Propagates write errors from `out`.
    pub fn render(&self, out: &mut impl Write) -> io::Result<()> {
        for (i, op) in self.operations.iter().enumerate() {
            if i > 0 {
                writeln!(out)?;
            }
            writeln!(out, "[{}] {}", op.method, op.path)?;
            for (status, count) in &op.passes {
                writeln!(out, "  SUCCESS  code {status}  tests: {count}")?;
            }
            for failure in &op.failures {
                writeln!(
                    out,
                    "  FAIL     response code {} not in documented codes {}",
                    failure.status, failure.documented
                )?;
            }
        }
        Ok(())
    }

    /// Format as human-readable terminal output.
    #[must_use]
    pub fn to_terminal(&self) -> String {
        let mut buf = Vec::new();
        // writing into a Vec cannot fail
        let _ = self.render(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn current(&mut self, record: &Record) -> Result<&mut OperationReport, ReportError> {
        self.operations
            .last_mut()
            .ok_or_else(|| ReportError::Orphan(record.to_log_line()))
    }
}

impl RecordSink for RunReport {
    fn accept(&mut self, record: &Record) -> Result<(), ReportError> {
        match record {
            Record::OperationStart { method, path } => {
                self.operations
                    .push(OperationReport::new(method.clone(), path.clone()));
            }
            Record::Pass { status } => {
                *self.current(record)?.passes.entry(*status).or_default() += 1;
            }
            Record::Fail { status, documented } => {
                self.current(record)?.failures.push(FailureEntry {
                    status: *status,
                    documented: documented.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(method: &str, path: &str) -> Record {
        Record::OperationStart {
            method: method.into(),
            path: path.into(),
        }
    }

    fn fail(status: u16) -> Record {
        Record::Fail {
            status,
            documented: DocumentedCodes::from_codes([200, 404]),
        }
    }

    #[test]
    fn reduces_passes_and_failures() {
        let mut report = RunReport::new();
        for r in [
            start("GET", "/items"),
            Record::Pass { status: 200 },
            Record::Pass { status: 200 },
            fail(500),
        ] {
            report.accept(&r).unwrap();
        }

        assert_eq!(report.operations.len(), 1);
        let op = &report.operations[0];
        assert_eq!(op.passes.get(&200), Some(&2));
        assert_eq!(op.failures.len(), 1);
        assert_eq!(op.failures[0].status, 500);
        assert_eq!(op.trials(), 3);
    }

    #[test]
    fn failures_keep_arrival_order() {
        let mut report = RunReport::new();
        for r in [start("GET", "/a"), fail(503), fail(500), fail(503)] {
            report.accept(&r).unwrap();
        }
        let statuses: Vec<u16> = report.operations[0]
            .failures
            .iter()
            .map(|f| f.status)
            .collect();
        assert_eq!(statuses, vec![503, 500, 503]);
    }

    #[test]
    fn trial_before_start_is_rejected() {
        let mut report = RunReport::new();
        let err = report.accept(&Record::Pass { status: 200 }).unwrap_err();
        assert!(matches!(err, ReportError::Orphan(_)));
    }

    #[test]
    fn replay_matches_live_report() {
        let records = [
            start("GET", "/items"),
            Record::Pass { status: 200 },
            Record::Pass { status: 404 },
            start("DELETE", "/items/{id}"),
            fail(500),
        ];
        let mut live = RunReport::new();
        let mut log = String::new();
        for r in &records {
            live.accept(r).unwrap();
            log.push_str(&r.to_log_line());
            log.push('\n');
        }
        log.push('\n');

        let replayed = RunReport::replay(log.as_bytes()).unwrap();
        assert_eq!(replayed, live);
    }

    #[test]
    fn replay_reports_malformed_line() {
        let err = RunReport::replay("test GET /x\nok many\n".as_bytes()).unwrap_err();
        assert!(matches!(err, ReportError::Malformed(_)));
    }

    #[test]
    fn terminal_rendering() {
        let mut report = RunReport::new();
        for r in [
            start("GET", "/items"),
            fail(500),
            Record::Pass { status: 200 },
            Record::Pass { status: 200 },
            Record::Pass { status: 404 },
            start("POST", "/items"),
            Record::Pass { status: 201 },
        ] {
            report.accept(&r).unwrap();
        }

        insta::assert_snapshot!(report.to_terminal(), @r"
        [GET] /items
          SUCCESS  code 200  tests: 2
          SUCCESS  code 404  tests: 1
          FAIL     response code 500 not in documented codes {200, 404}

        [POST] /items
          SUCCESS  code 201  tests: 1
        ");
    }

    #[test]
    fn json_shape() {
        let mut report = RunReport::new();
        report.accept(&start("GET", "/items")).unwrap();
        report.accept(&Record::Pass { status: 200 }).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["operations"][0]["method"], "GET");
        assert_eq!(json["operations"][0]["passes"]["200"], 1);
        assert!(json["operations"][0]["failures"].as_array().unwrap().is_empty());
    }
}
