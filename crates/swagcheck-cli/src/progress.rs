//! Live per-trial progress on stdout

use console::{Term, style};

use swagcheck_core::{ParamValues, ParamsDisplay, Record, RecordSink, ReportError};

/// Streams each record as it arrives; the batch report is printed at the end.
pub struct ConsoleProgress {
    term: Term,
    enabled: bool,
}

impl ConsoleProgress {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            term: Term::stdout(),
            enabled,
        }
    }

    /// A failing trial also names the values it was sent with.
    fn line(record: &Record, params: Option<&ParamValues>) -> String {
        let line = match record {
            Record::OperationStart { method, path } => {
                format!("{} {path}", style(format!("[{method}]")).bold().cyan())
            }
            Record::Pass { status } => format!("  {} {status}", style("[ ok ]").green()),
            Record::Fail { status, documented } => format!(
                "  {} {status} not in {documented}",
                style("[fail]").red().bold()
            ),
        };
        match (record, params) {
            (Record::Fail { .. }, Some(params)) => {
                format!("{line} with {}", style(ParamsDisplay(params)).dim())
            }
            _ => line,
        }
    }

    fn write(&self, line: &str) -> Result<(), ReportError> {
        if !self.enabled {
            return Ok(());
        }
        self.term
            .write_line(line)
            .map_err(|e| ReportError::Io(format!("write progress: {e}")))
    }
}

impl RecordSink for ConsoleProgress {
    fn accept(&mut self, record: &Record) -> Result<(), ReportError> {
        self.write(&Self::line(record, None))
    }

    fn accept_trial(&mut self, record: &Record, params: &ParamValues) -> Result<(), ReportError> {
        self.write(&Self::line(record, Some(params)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use swagcheck_core::{DocumentedCodes, Location, ParamKey};

    #[test]
    fn lines_carry_status_and_documented_codes() {
        console::set_colors_enabled(false);
        assert_eq!(
            ConsoleProgress::line(
                &Record::OperationStart {
                    method: "GET".into(),
                    path: "/items".into()
                },
                None
            ),
            "[GET] /items"
        );
        assert_eq!(
            ConsoleProgress::line(&Record::Pass { status: 200 }, None),
            "  [ ok ] 200"
        );
        assert_eq!(
            ConsoleProgress::line(
                &Record::Fail {
                    status: 500,
                    documented: DocumentedCodes::from_codes([200, 404])
                },
                None
            ),
            "  [fail] 500 not in {200, 404}"
        );
    }

    #[test]
    fn fail_line_names_the_drawn_params() {
        console::set_colors_enabled(false);
        let params = ParamValues::from([
            (ParamKey::new(Location::Path, "id"), json!(-3)),
            (ParamKey::new(Location::Query, "q"), json!("a b")),
        ]);
        assert_eq!(
            ConsoleProgress::line(
                &Record::Fail {
                    status: 500,
                    documented: DocumentedCodes::from_codes([200])
                },
                Some(&params)
            ),
            r#"  [fail] 500 not in {200} with {path:id=-3, query:q="a b"}"#
        );
        assert_eq!(
            ConsoleProgress::line(&Record::Pass { status: 200 }, Some(&params)),
            "  [ ok ] 200"
        );
    }

    #[test]
    fn disabled_sink_accepts_silently() {
        let mut progress = ConsoleProgress::new(false);
        assert!(progress.accept(&Record::Pass { status: 200 }).is_ok());
    }
}
