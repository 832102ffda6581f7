//! Output formatting

use std::io::Write;

use chrono::{DateTime, SecondsFormat, Utc};
use miette::{IntoDiagnostic, LabeledSpan, MietteDiagnostic, NamedSource, Report, Result};
use serde::Serialize;
use sqlframe_core::{Diagnostic, Severity, SqlFileAnalysis};

/// First line of every output file
#[derive(Debug, Serialize)]
pub struct RunRecord<'a> {
    kind: &'static str,
    pub started_at: String,
    pub input_path: &'a str,
    pub total_files: usize,
}

impl<'a> RunRecord<'a> {
    pub fn new(started_at: DateTime<Utc>, input_path: &'a str, total_files: usize) -> Self {
        Self {
            kind: "run",
            started_at: timestamp(started_at),
            input_path,
            total_files,
        }
    }
}

/// A file that could not be read or analyzed
#[derive(Debug, Serialize)]
pub struct ErrorRecord<'a> {
    kind: &'static str,
    pub file: &'a str,
    pub language: &'static str,
    pub error: String,
}

impl<'a> ErrorRecord<'a> {
    pub fn new(file: &'a str, error: impl ToString) -> Self {
        Self {
            kind: "error",
            file,
            language: "sql",
            error: error.to_string(),
        }
    }
}

/// Last line of every output file
#[derive(Debug, Serialize)]
pub struct DoneRecord {
    kind: &'static str,
    pub ended_at: String,
    pub files_analyzed: usize,
    pub files_with_errors: usize,
    pub duration_seconds: i64,
}

impl DoneRecord {
    pub fn new(
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        files_analyzed: usize,
        files_with_errors: usize,
    ) -> Self {
        Self {
            kind: "done",
            ended_at: timestamp(ended_at),
            files_analyzed,
            files_with_errors,
            duration_seconds: (ended_at - started_at).num_seconds(),
        }
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Writes one JSON object per line
pub struct JsonlWriter<W: Write> {
    out: W,
}

impl<W: Write> JsonlWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn write_run(&mut self, record: &RunRecord<'_>) -> Result<()> {
        self.write_line(record)
    }

    pub fn write_analysis(&mut self, analysis: &SqlFileAnalysis) -> Result<()> {
        self.write_line(analysis)
    }

    pub fn write_error(&mut self, record: &ErrorRecord<'_>) -> Result<()> {
        self.write_line(record)
    }

    pub fn write_done(&mut self, record: &DoneRecord) -> Result<()> {
        self.write_line(record)?;
        self.out.flush().into_diagnostic()
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_line<T: Serialize>(&mut self, value: &T) -> Result<()> {
        serde_json::to_writer(&mut self.out, value).into_diagnostic()?;
        self.out.write_all(b"\n").into_diagnostic()
    }
}

/// Build a renderable report for one diagnostic against its source
pub fn diagnostic_report(file_name: &str, source: &str, diag: &Diagnostic) -> Report {
    let severity = match diag.severity {
        Severity::Warning => miette::Severity::Warning,
    };
    let mut report = MietteDiagnostic::new(diag.message.clone())
        .with_code(format!("{}({})", diag.code(), diag.kind.name()))
        .with_severity(severity);
    if let Some(span) = diag.span {
        report = report.with_label(LabeledSpan::at(span, "here"));
    }
    if let Some(help) = &diag.help {
        report = report.with_help(help.clone());
    }
    Report::new(report).with_source_code(NamedSource::new(file_name, source.to_string()))
}

/// Print diagnostics to stderr
pub fn print_diagnostics(file_name: &str, source: &str, diagnostics: &[Diagnostic]) {
    for diag in diagnostics {
        eprintln!("{:?}", diagnostic_report(file_name, source, diag));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use sqlframe_core::{analyze_sql, DiagnosticKind, Span};

    fn lines(writer: JsonlWriter<Vec<u8>>) -> Vec<serde_json::Value> {
        String::from_utf8(writer.into_inner())
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_run_analysis_error_done_records() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 3).unwrap();
        let analysis = analyze_sql("db/a.sql", "CREATE TABLE t (id INT);");

        let mut writer = JsonlWriter::new(Vec::new());
        writer.write_run(&RunRecord::new(start, "db", 2)).unwrap();
        writer.write_analysis(&analysis).unwrap();
        writer
            .write_error(&ErrorRecord::new("db/b.sql", "stream did not contain valid UTF-8"))
            .unwrap();
        writer.write_done(&DoneRecord::new(start, end, 1, 1)).unwrap();

        let records = lines(writer);
        assert_eq!(records.len(), 4);
        assert_eq!(
            records[0],
            serde_json::json!({
                "kind": "run",
                "started_at": "2024-05-01T12:00:00.000Z",
                "input_path": "db",
                "total_files": 2
            })
        );
        assert_eq!(records[1]["filePath"], "db/a.sql");
        assert_eq!(records[1]["createTables"][0]["tableName"], "t");
        assert_eq!(
            records[2],
            serde_json::json!({
                "kind": "error",
                "file": "db/b.sql",
                "language": "sql",
                "error": "stream did not contain valid UTF-8"
            })
        );
        assert_eq!(records[3]["kind"], "done");
        assert_eq!(records[3]["files_analyzed"], 1);
        assert_eq!(records[3]["files_with_errors"], 1);
        assert_eq!(records[3]["duration_seconds"], 3);
    }

    #[test]
    fn test_diagnostic_report() {
        let source = "SELECT 1;\nALTER TABLE t FROBNICATE;";
        let diag = Diagnostic::warning(DiagnosticKind::StatementParseError, "statement skipped")
            .with_span(Span::locate(source, 10, 25))
            .with_help("check the syntax");
        let report = diagnostic_report("a.sql", source, &diag);
        assert_eq!(report.to_string(), "statement skipped");
        assert_eq!(
            report.code().map(|c| c.to_string()),
            Some("S0001(statement-parse-error)".to_string())
        );
        assert_eq!(report.severity(), Some(miette::Severity::Warning));
        assert_eq!(report.labels().map(|l| l.count()), Some(1));
    }
}
