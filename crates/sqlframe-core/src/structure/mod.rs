//! Statement-by-statement structural extraction
//!
//! Each split statement is classified by its leading keywords and routed:
//! DDL goes through sqlparser (PostgreSQL grammar first, then the file's
//! dialect, then the generic grammar) with lexical fallbacks, routines and
//! packages go to [`crate::routines`], trigger statements not already taken
//! by the header patterns go to [`crate::triggers::statement`], and
//! standalone DML feeds the file's top-level references and calls.

mod ddl;
mod fallback;

pub use ddl::convert_statement;
pub use fallback::{fallback_operations, read_create_index, read_drop, read_view};

use sqlparser::ast::Statement;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use tracing::debug;

use crate::body::analyzer_for;
use crate::dialect::{detect_dialect, SqlDialect};
use crate::error::{AnalysisError, Diagnostic, DiagnosticKind, Span};
use crate::model::{Operation, SqlFileAnalysis};
use crate::references::ReferenceCollector;
use crate::routines::{extract_package, extract_routine, RoutineOutcome};
use crate::script::scanner::tokenize;
use crate::script::{classify, split_statements, RawStatement, StatementKind};
use crate::triggers::statement::extract_statement_trigger;
use crate::triggers::TriggerScan;

/// Walks a file's statements and appends what it finds to a
/// [`SqlFileAnalysis`]
pub struct StructuralParser<'s> {
    source: &'s str,
    file_dialect: Option<SqlDialect>,
    diagnostics: Vec<Diagnostic>,
}

impl<'s> StructuralParser<'s> {
    pub fn new(source: &'s str, file_dialect: Option<SqlDialect>) -> Self {
        Self {
            source,
            file_dialect,
            diagnostics: Vec::new(),
        }
    }

    /// Process every statement. Statements whose span holds a trigger the
    /// header patterns already matched are skipped.
    pub fn parse(&mut self, triggers: &TriggerScan, out: &mut SqlFileAnalysis) {
        for raw in split_statements(self.source) {
            self.process_statement(raw, triggers, out);
        }
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    fn process_statement(
        &mut self,
        raw: RawStatement<'_>,
        triggers: &TriggerScan,
        out: &mut SqlFileAnalysis,
    ) {
        let lexemes = tokenize(raw.text);
        let kind = classify(&lexemes);
        debug!(offset = raw.offset, ?kind, "processing statement");

        match kind {
            StatementKind::CreateTable
            | StatementKind::AlterTable
            | StatementKind::CreateView
            | StatementKind::AlterView
            | StatementKind::CreateIndex
            | StatementKind::Drop => self.process_ddl(raw, out),
            StatementKind::Routine { .. } => self.process_routine(raw, out),
            StatementKind::PackageBody => match extract_package(raw.text) {
                Some(operations) => operations.into_iter().for_each(|op| out.push(op)),
                None => self.report(
                    raw,
                    DiagnosticKind::UnsupportedConstruct,
                    "package body could not be read",
                ),
            },
            StatementKind::PackageSpec => self.report(
                raw,
                DiagnosticKind::UnsupportedConstruct,
                "package specifications are not extracted",
            ),
            StatementKind::Unsupported => self.report(
                raw,
                DiagnosticKind::UnsupportedConstruct,
                "statement is recognized but not extracted",
            ),
            StatementKind::Trigger => {
                if triggers.covers(raw.offset, raw.offset + raw.text.len()) {
                    return;
                }
                match extract_statement_trigger(raw.text) {
                    Some(trigger) => out.push(Operation::CreateTrigger(trigger)),
                    None => self.report(
                        raw,
                        DiagnosticKind::TriggerPatternMiss,
                        "trigger matches no known shape",
                    ),
                }
            }
            StatementKind::Dml => self.process_top_level(raw, out),
            StatementKind::AnonymousBlock => {
                let analysis = self.top_level_analyzer(raw.text).analyze(raw.text);
                out.add_top_level(analysis);
            }
            StatementKind::Other => {}
        }
    }

    fn process_ddl(&mut self, raw: RawStatement<'_>, out: &mut SqlFileAnalysis) {
        let parsed = match parse_any(raw.text, self.file_dialect) {
            Ok(statements) => statements,
            Err(err) => {
                debug!(
                    offset = raw.offset,
                    error = %err,
                    "DDL did not parse, reading it lexically"
                );
                match fallback_operations(raw.text, self.file_dialect) {
                    Some(operations) => {
                        operations.into_iter().for_each(|op| out.push(op));
                    }
                    None => self.report(
                        raw,
                        DiagnosticKind::StatementParseError,
                        format!("statement skipped: {err}"),
                    ),
                }
                return;
            }
        };
        for statement in &parsed {
            for operation in convert_statement(statement, raw.text) {
                out.push(operation);
            }
        }
    }

    fn process_routine(&mut self, raw: RawStatement<'_>, out: &mut SqlFileAnalysis) {
        match extract_routine(raw.text, self.file_dialect) {
            RoutineOutcome::Extracted(operation) => out.push(operation),
            RoutineOutcome::HeaderOnly(operation, reason) => {
                out.push(operation);
                self.report(raw, DiagnosticKind::RoutineBodyParseFailure, reason);
            }
            RoutineOutcome::Unsupported(reason) => {
                self.report(raw, DiagnosticKind::UnsupportedConstruct, reason);
            }
            RoutineOutcome::NotARoutine => self.report(
                raw,
                DiagnosticKind::StatementParseError,
                "routine header could not be read",
            ),
        }
    }

    /// Standalone DML, calls and `EXEC`. A statement no grammar accepts is
    /// analyzed quietly.
    fn process_top_level(&mut self, raw: RawStatement<'_>, out: &mut SqlFileAnalysis) {
        match parse_any(raw.text, self.file_dialect) {
            Ok(statements) => {
                let mut collector = ReferenceCollector::new();
                for statement in &statements {
                    collector.collect_statement(statement);
                }
                out.add_top_level(collector.finish());
            }
            Err(err) => {
                debug!(offset = raw.offset, error = %err, "top-level statement analyzed quietly");
                let analysis = self.top_level_analyzer(raw.text).analyze(raw.text);
                out.add_top_level(analysis);
            }
        }
    }

    // bare `pkg.proc(1);` calls are PL/SQL unless the text says otherwise
    fn top_level_analyzer(&self, text: &str) -> Box<dyn crate::body::RoutineBodyAnalyzer> {
        let dialect = detect_dialect(text)
            .or(self.file_dialect)
            .unwrap_or(SqlDialect::PlSql);
        analyzer_for(dialect)
    }

    fn report(&mut self, raw: RawStatement<'_>, kind: DiagnosticKind, message: impl Into<String>) {
        let diagnostic = Diagnostic::warning(kind, message)
            .with_span(Span::locate(self.source, raw.offset, raw.text.len()));
        debug!(
            code = diagnostic.code(),
            line = diagnostic.span.map(|s| s.line),
            message = %diagnostic.message,
            "statement diagnostic"
        );
        self.diagnostics.push(diagnostic);
    }
}

/// Parse with PostgreSQL, then the file's dialect, then the generic grammar
pub fn parse_any(
    text: &str,
    file_dialect: Option<SqlDialect>,
) -> Result<Vec<Statement>, AnalysisError> {
    let mut last_error = AnalysisError::NoGrammar;
    let mut grammars = vec![SqlDialect::PostgreSQL.parser_dialect()];
    if let Some(dialect) = file_dialect.filter(|d| *d != SqlDialect::PostgreSQL) {
        grammars.push(dialect.parser_dialect());
    }
    grammars.push(Box::new(GenericDialect {}));

    for grammar in &grammars {
        match Parser::parse_sql(grammar.as_ref(), text) {
            Ok(statements) if !statements.is_empty() => return Ok(statements),
            Ok(_) => {}
            Err(err) => last_error = err.into(),
        }
    }
    Err(last_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DropObjectType, TriggerTiming};
    use crate::triggers::extract_triggers;
    use pretty_assertions::assert_eq;

    fn run(source: &str, dialect: Option<SqlDialect>) -> (SqlFileAnalysis, Vec<Diagnostic>) {
        let triggers = extract_triggers(source);
        let mut out = SqlFileAnalysis::new("test.sql");
        let mut parser = StructuralParser::new(source, dialect);
        parser.parse(&triggers, &mut out);
        (out, parser.into_diagnostics())
    }

    #[test]
    fn test_parse_any_falls_through_grammars() {
        assert!(parse_any("SELECT 1", None).is_ok());
        let mysql = Some(SqlDialect::MySQL);
        assert!(parse_any("CREATE TABLE t (id INT) ENGINE=InnoDB", mysql).is_ok());
        assert!(parse_any(")))(((", None).is_err());
    }

    #[test]
    fn test_mixed_statements() {
        let source = "CREATE TABLE users (id INT PRIMARY KEY);
DROP VIEW IF EXISTS v_old;
SELECT u.id FROM users u JOIN orders o ON o.user_id = u.id;
CREATE FUNCTION f() RETURNS int AS $$ SELECT count(*) FROM users $$ LANGUAGE sql;";
        let (out, diagnostics) = run(source, None);
        assert_eq!(out.create_tables.len(), 1);
        assert_eq!(out.drop_operations[0].object_type, DropObjectType::View);
        assert!(out.drop_operations[0].if_exists);
        assert_eq!(out.create_functions[0].function_name, "f");
        assert_eq!(
            out.top_level_references.relations.iter().collect::<Vec<_>>(),
            vec!["users", "orders"]
        );
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_unparseable_statement_is_reported_and_skipped() {
        let source = "ALTER TABLE t FROBNICATE everything;\nCREATE INDEX ix ON t (a);";
        let (out, diagnostics) = run(source, None);
        assert_eq!(out.create_indexes.len(), 1);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::StatementParseError);
        assert_eq!(diagnostics[0].span.map(|s| s.line), Some(1));
    }

    #[test]
    fn test_statement_triggers_and_misses() {
        let source = "CREATE TRIGGER trg ON dbo.t AFTER DELETE AS BEGIN DELETE FROM dbo.audit; END\nGO\nCREATE TRIGGER broken\nGO";
        let (out, diagnostics) = run(source, Some(SqlDialect::TSql));
        assert_eq!(out.create_triggers.len(), 1);
        assert_eq!(out.create_triggers[0].timing, TriggerTiming::After);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::TriggerPatternMiss);
    }

    #[test]
    fn test_pattern_matched_triggers_are_not_repeated() {
        let source = "CREATE TRIGGER t AFTER INSERT ON orders FOR EACH ROW EXECUTE FUNCTION log_insert();";
        let (out, diagnostics) = run(source, None);
        assert!(out.create_triggers.is_empty());
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_package_spec_is_unsupported() {
        let (out, diagnostics) = run("CREATE PACKAGE pkg AS PROCEDURE a; END pkg;\n/", None);
        assert_eq!(out.operation_count(), 0);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::UnsupportedConstruct);
    }
}
