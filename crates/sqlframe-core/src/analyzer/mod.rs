//! Per-file analysis entry point

use tracing::debug;

use crate::dialect::detect_dialect;
use crate::error::Diagnostic;
use crate::model::{Operation, SqlFileAnalysis};
use crate::structure::StructuralParser;
use crate::triggers::extract_triggers;

/// Options that shape the finalized output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalyzerOptions {
    /// Leave column listings out of table operations
    pub hide_sql_table_columns: bool,
}

/// SQL Analyzer - extracts structural facts from one SQL file at a time.
///
/// Holds only options; every call builds fresh parsers, so one analyzer can
/// be reused across files.
#[derive(Debug, Clone, Default)]
pub struct SqlAnalyzer {
    options: AnalyzerOptions,
}

impl SqlAnalyzer {
    pub fn new(options: AnalyzerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> AnalyzerOptions {
        self.options
    }

    /// Analyze a file and return its structural summary
    pub fn analyze(&self, file_path: &str, source: &str) -> SqlFileAnalysis {
        self.analyze_with_diagnostics(file_path, source).0
    }

    /// Analyze a file, also returning what was skipped or only partly read
    pub fn analyze_with_diagnostics(
        &self,
        file_path: &str,
        source: &str,
    ) -> (SqlFileAnalysis, Vec<Diagnostic>) {
        let file_dialect = detect_dialect(source);
        debug!(file = file_path, dialect = ?file_dialect, "analyzing SQL file");

        let triggers = extract_triggers(source);
        let mut analysis = SqlFileAnalysis::new(file_path);

        let mut parser = StructuralParser::new(source, file_dialect);
        parser.parse(&triggers, &mut analysis);
        let diagnostics = parser.into_diagnostics();

        for trigger in triggers.triggers {
            analysis.push(Operation::CreateTrigger(trigger));
        }

        if self.options.hide_sql_table_columns {
            analysis.hide_table_columns();
        }
        debug!(
            file = file_path,
            operations = analysis.operation_count(),
            diagnostics = diagnostics.len(),
            "analysis finished"
        );
        (analysis, diagnostics)
    }
}

/// Analyze with default options
pub fn analyze_sql(file_path: &str, source: &str) -> SqlFileAnalysis {
    SqlAnalyzer::default().analyze(file_path, source)
}
