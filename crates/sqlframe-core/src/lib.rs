//! sqlframe-core: structural extraction from SQL files
//!
//! This library reads SQL scripts written for PostgreSQL, MySQL, T-SQL or
//! PL/SQL, without being told which, and reports the tables, views, indexes,
//! routines, triggers and drops they define together with the relations and
//! calls inside routine bodies.

pub mod analyzer;
pub mod body;
pub mod dialect;
pub mod error;
pub mod model;
pub mod names;
pub mod references;
pub mod routines;
pub mod script;
pub mod structure;
pub mod triggers;

pub use analyzer::{analyze_sql, AnalyzerOptions, SqlAnalyzer};
pub use dialect::{detect_dialect, SqlDialect};
pub use error::{AnalysisError, Diagnostic, DiagnosticKind, Severity, Span};
pub use model::{
    HasReferencesAndCalls, Operation, SqlFileAnalysis, SqlInvocations, SqlReferences,
};
