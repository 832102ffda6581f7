//! Routine body analysis
//!
//! A body either parses strictly with the PostgreSQL grammar ([`parse_strict`])
//! or is handed to the analyzer of the dialect the text looks like
//! ([`analyzer_for`]). Analyzers hold only configuration; every call builds
//! its own tokenizer and parser.

mod quiet;

pub use quiet::QuietParser;

use sqlparser::dialect::{GenericDialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;
use tracing::debug;

use crate::dialect::SqlDialect;
use crate::error::AnalysisError;
use crate::model::BodyAnalysis;
use crate::references::{HarvestRules, ReferenceCollector};

/// Best-effort extraction of references and calls from a routine body
pub trait RoutineBodyAnalyzer {
    /// Dialect this analyzer is fixed to
    fn dialect(&self) -> SqlDialect;

    /// Never fails; a body that cannot be tokenized yields an empty result.
    fn analyze(&self, body: &str) -> BodyAnalysis;
}

/// T-SQL bodies: `EXEC name` and `EXEC @rc = name` are procedure calls
#[derive(Debug, Clone, Copy, Default)]
pub struct TSqlBodyAnalyzer;

impl RoutineBodyAnalyzer for TSqlBodyAnalyzer {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::TSql
    }

    fn analyze(&self, body: &str) -> BodyAnalysis {
        let dialect = MsSqlDialect {};
        quietly(
            self.dialect(),
            QuietParser::new(&dialect, HarvestRules::default()).analyze(body),
        )
    }
}

/// PL/SQL bodies: statement-position `pkg.proc(args);` and `pkg.proc;` are
/// procedure calls
#[derive(Debug, Clone, Copy, Default)]
pub struct PlSqlBodyAnalyzer;

impl RoutineBodyAnalyzer for PlSqlBodyAnalyzer {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::PlSql
    }

    fn analyze(&self, body: &str) -> BodyAnalysis {
        let dialect = GenericDialect {};
        let rules = HarvestRules { bare_calls: true };
        quietly(self.dialect(), QuietParser::new(&dialect, rules).analyze(body))
    }
}

/// MySQL and PL/pgSQL bodies.
///
/// `CALL` is a procedure call. In PL/pgSQL `EXECUTE <expr>` runs dynamic SQL
/// and is not recorded.
#[derive(Debug, Clone, Copy)]
pub struct ProceduralBodyAnalyzer {
    dialect: SqlDialect,
}

impl ProceduralBodyAnalyzer {
    pub fn mysql() -> Self {
        Self {
            dialect: SqlDialect::MySQL,
        }
    }

    pub fn postgres() -> Self {
        Self {
            dialect: SqlDialect::PostgreSQL,
        }
    }
}

impl RoutineBodyAnalyzer for ProceduralBodyAnalyzer {
    fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    fn analyze(&self, body: &str) -> BodyAnalysis {
        let result = match self.dialect {
            SqlDialect::MySQL => {
                let dialect = MySqlDialect {};
                QuietParser::new(&dialect, HarvestRules::default()).analyze(body)
            }
            _ => {
                let dialect = PostgreSqlDialect {};
                QuietParser::new(&dialect, HarvestRules::default())
                    .with_dynamic_execute()
                    .analyze(body)
            }
        };
        quietly(self.dialect, result)
    }
}

/// The analyzer for a detected dialect
pub fn analyzer_for(dialect: SqlDialect) -> Box<dyn RoutineBodyAnalyzer> {
    match dialect {
        SqlDialect::TSql => Box::new(TSqlBodyAnalyzer),
        SqlDialect::PlSql => Box::new(PlSqlBodyAnalyzer),
        SqlDialect::MySQL => Box::new(ProceduralBodyAnalyzer::mysql()),
        SqlDialect::PostgreSQL => Box::new(ProceduralBodyAnalyzer::postgres()),
    }
}

/// Parse a body with the PostgreSQL grammar, all or nothing.
pub fn parse_strict(body: &str) -> Result<BodyAnalysis, AnalysisError> {
    let statements = Parser::parse_sql(&PostgreSqlDialect {}, body)?;
    if statements.is_empty() {
        return Err(AnalysisError::NoGrammar);
    }
    let mut collector = ReferenceCollector::new().with_dynamic_execute();
    for statement in &statements {
        collector.collect_statement(statement);
    }
    Ok(collector.finish())
}

fn quietly(dialect: SqlDialect, result: Result<BodyAnalysis, AnalysisError>) -> BodyAnalysis {
    match result {
        Ok(analysis) => analysis,
        Err(err) => {
            debug!(%dialect, error = %err, "routine body analysis failed");
            BodyAnalysis::default()
        }
    }
}
