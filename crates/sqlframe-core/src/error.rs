//! Error and diagnostic types

use miette::SourceSpan;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Source location span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// Byte offset from start of source
    pub offset: usize,
    /// Length in bytes
    pub length: usize,
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed, in characters)
    pub column: usize,
}

impl Span {
    /// Create a span for `length` bytes at `offset`, resolving line and column
    /// against `source`.
    pub fn locate(source: &str, offset: usize, length: usize) -> Self {
        let offset = offset.min(source.len());
        let before = source.get(..offset).unwrap_or(source);
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let column = before
            .get(line_start..)
            .map(|s| s.chars().count())
            .unwrap_or(0)
            + 1;
        Self {
            offset,
            length,
            line,
            column,
        }
    }
}

impl From<Span> for SourceSpan {
    fn from(span: Span) -> Self {
        SourceSpan::new(span.offset.into(), span.length)
    }
}

/// Diagnostic severity level
///
/// Extraction never fails a file, so every diagnostic is a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
}

/// Something the extractor skipped or only partially understood.
///
/// Diagnostics never abort analysis; they are returned next to the
/// extracted operations so tooling can show what was left out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    pub message: String,
    pub span: Option<Span>,
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn warning(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Warning,
            message: message.into(),
            span: None,
            help: None,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Get the diagnostic code string (e.g., "S0001")
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

/// Types of diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// S0001: a top-level statement failed every grammar and was skipped
    StatementParseError,
    /// S0002: a routine body could not be analyzed; header metadata only
    RoutineBodyParseFailure,
    /// S0003: recognized but intentionally not parsed
    UnsupportedConstruct,
    /// S0004: looks like a trigger but matches no known shape
    TriggerPatternMiss,
}

impl DiagnosticKind {
    pub fn code(&self) -> &'static str {
        match self {
            DiagnosticKind::StatementParseError => "S0001",
            DiagnosticKind::RoutineBodyParseFailure => "S0002",
            DiagnosticKind::UnsupportedConstruct => "S0003",
            DiagnosticKind::TriggerPatternMiss => "S0004",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DiagnosticKind::StatementParseError => "statement-parse-error",
            DiagnosticKind::RoutineBodyParseFailure => "routine-body-parse-failure",
            DiagnosticKind::UnsupportedConstruct => "unsupported-construct",
            DiagnosticKind::TriggerPatternMiss => "trigger-pattern-miss",
        }
    }
}

/// Internal failure of one extraction step.
///
/// These never leave the crate's public entry points: callers convert them
/// into a [`Diagnostic`] or an empty result.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("tokenizer error: {0}")]
    Tokenize(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("no grammar accepted the statement")]
    NoGrammar,
}

impl From<sqlparser::tokenizer::TokenizerError> for AnalysisError {
    fn from(err: sqlparser::tokenizer::TokenizerError) -> Self {
        AnalysisError::Tokenize(err.to_string())
    }
}

impl From<sqlparser::parser::ParserError> for AnalysisError {
    fn from(err: sqlparser::parser::ParserError) -> Self {
        AnalysisError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_locate_resolves_line_and_column() {
        let src = "SELECT 1;\nSELECT x FROM t;";
        let span = Span::locate(src, 17, 4);
        assert_eq!(span.line, 2);
        assert_eq!(span.column, 8);
        assert_eq!(span.offset, 17);
    }

    #[test]
    fn test_span_locate_clamps_offset() {
        let span = Span::locate("abc", 100, 1);
        assert_eq!(span.offset, 3);
        assert_eq!(span.line, 1);
        assert_eq!(span.column, 4);
    }

    #[test]
    fn test_diagnostic_codes() {
        let d = Diagnostic::warning(DiagnosticKind::TriggerPatternMiss, "x");
        assert_eq!(d.code(), "S0004");
        assert_eq!(d.kind.name(), "trigger-pattern-miss");
    }
}
