//! Procedure and function definitions
//!
//! Headers come from sqlparser when the PostgreSQL grammar accepts the whole
//! statement, otherwise from the lexical [`read_signature`]. Bodies are parsed
//! strictly first; a body that does not parse goes to the analyzer of the
//! dialect detected in the routine text, or in the file.

mod package;
mod signature;

pub use package::{read_package_body, PackageBody};
pub use signature::{read_signature, RoutineSignature};

pub(crate) use signature::{matching_paren, read_chain, span_text, split_top_level};

use sqlparser::ast::Statement;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use tracing::debug;

use crate::body::{self, analyzer_for, PlSqlBodyAnalyzer, RoutineBodyAnalyzer};
use crate::dialect::{detect_dialect, SqlDialect};
use crate::model::{
    AlterFunctionOperation, AlterProcedureOperation, BodyAnalysis, CreateFunctionOperation,
    CreateProcedureOperation, Operation, ParameterDefinition, ParameterDirection,
};
use crate::names;
use crate::script::RoutineKind;

/// Outcome of extracting one routine statement
#[derive(Debug)]
pub enum RoutineOutcome {
    Extracted(Operation),
    /// Emitted with header fields only; the body could not be analyzed
    HeaderOnly(Operation, String),
    /// An `ALTER` without a body, such as `ALTER FUNCTION f RENAME TO g`
    Unsupported(String),
    NotARoutine,
}

/// Extract a `CREATE|ALTER PROCEDURE|FUNCTION` statement.
pub fn extract_routine(text: &str, file_dialect: Option<SqlDialect>) -> RoutineOutcome {
    let Some(mut signature) = read_signature(text) else {
        return RoutineOutcome::NotARoutine;
    };
    if signature.kind == RoutineKind::Function && !signature.alter {
        apply_parsed_header(&mut signature, text);
    }

    let Some(body) = signature.body.take() else {
        if signature.alter {
            return RoutineOutcome::Unsupported(format!(
                "ALTER of '{}' carries no body",
                signature.name
            ));
        }
        let name = signature.name.clone();
        return RoutineOutcome::HeaderOnly(
            into_operation(signature, BodyAnalysis::default()),
            format!("no body found for routine '{name}'"),
        );
    };

    match analyze_body(&body, text, file_dialect) {
        Some(analysis) => RoutineOutcome::Extracted(into_operation(signature, analysis)),
        None => {
            let name = signature.name.clone();
            RoutineOutcome::HeaderOnly(
                into_operation(signature, BodyAnalysis::default()),
                format!("body of routine '{name}' did not parse and no dialect markers were found"),
            )
        }
    }
}

/// Routines of a PL/SQL package body, each analyzed with the PL/SQL analyzer
pub fn extract_package(text: &str) -> Option<Vec<Operation>> {
    let package = read_package_body(text)?;
    let analyzer = PlSqlBodyAnalyzer;
    let operations = package
        .members
        .into_iter()
        .map(|mut member| {
            let analysis = member
                .body
                .take()
                .map(|body| analyzer.analyze(&body))
                .unwrap_or_default();
            into_operation(member, analysis)
        })
        .collect();
    Some(operations)
}

/// Strict parse, then detected-dialect analysis. `None` when neither applies.
pub fn analyze_body(
    body: &str,
    routine_text: &str,
    file_dialect: Option<SqlDialect>,
) -> Option<BodyAnalysis> {
    match body::parse_strict(body) {
        Ok(analysis) => return Some(analysis),
        Err(err) => debug!(error = %err, "strict body parse failed"),
    }
    let dialect = detect_dialect(routine_text).or(file_dialect)?;
    debug!(%dialect, "analyzing routine body with dialect analyzer");
    Some(analyzer_for(dialect).analyze(body))
}

// PostgreSQL `CREATE FUNCTION` headers parse; their modes and types are
// taken from the AST.
fn apply_parsed_header(signature: &mut RoutineSignature, text: &str) {
    let Ok(statements) = Parser::parse_sql(&PostgreSqlDialect {}, text) else {
        return;
    };
    let [Statement::CreateFunction(function)] = statements.as_slice() else {
        return;
    };
    if let Some((schema, name)) = names::object_schema_and_name(&function.name) {
        signature.schema = schema;
        signature.name = name;
    }
    signature.or_replace = function.or_replace;
    if let Some(args) = &function.args {
        // Lexical parameters keep source spelling; the AST wins when the two disagree.
        let lexical = std::mem::take(&mut signature.parameters);
        let same_shape = lexical.len() == args.len();
        signature.parameters = args
            .iter()
            .zip(lexical.into_iter().map(Some).chain(std::iter::repeat(None)))
            .map(|(arg, spelled)| ParameterDefinition {
                name: arg.name.as_ref().and_then(names::ident_value),
                data_type: spelled
                    .filter(|_| same_shape)
                    .and_then(|p| p.data_type)
                    .or_else(|| names::normalize_type_format(&arg.data_type.to_string())),
                direction: arg
                    .mode
                    .as_ref()
                    .and_then(|mode| ParameterDirection::from_keyword(&mode.to_string())),
                default: arg.default_expr.as_ref().map(|expr| expr.to_string()),
            })
            .collect();
    }
    if let Some(return_type) = &function.return_type {
        if signature.return_type.is_none() {
            signature.return_type = names::normalize_type_format(&return_type.to_string());
        }
    }
}

fn into_operation(signature: RoutineSignature, analysis: BodyAnalysis) -> Operation {
    let RoutineSignature {
        kind,
        alter,
        or_replace,
        name,
        schema,
        parameters,
        return_type,
        ..
    } = signature;

    let mut operation = match (kind, alter) {
        (RoutineKind::Procedure, false) => Operation::CreateProcedure(CreateProcedureOperation {
            procedure_name: name,
            schema,
            or_replace,
            parameters,
            return_type,
            ..Default::default()
        }),
        (RoutineKind::Procedure, true) => Operation::AlterProcedure(AlterProcedureOperation {
            procedure_name: name,
            schema,
            parameters,
            return_type,
            ..Default::default()
        }),
        (RoutineKind::Function, false) => Operation::CreateFunction(CreateFunctionOperation {
            function_name: name,
            schema,
            or_replace,
            parameters,
            return_type,
            ..Default::default()
        }),
        (RoutineKind::Function, true) => Operation::AlterFunction(AlterFunctionOperation {
            function_name: name,
            schema,
            parameters,
            return_type,
            ..Default::default()
        }),
    };
    if let Some(body) = operation.body_mut() {
        body.absorb(analysis);
    }
    operation
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexSet;
    use pretty_assertions::assert_eq;

    fn set(items: &[&str]) -> IndexSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn extracted(outcome: RoutineOutcome) -> Operation {
        match outcome {
            RoutineOutcome::Extracted(op) => op,
            other => panic!("expected an extracted routine, got {other:?}"),
        }
    }

    #[test]
    fn test_sql_function_body_parses_strictly() {
        let op = extracted(extract_routine(
            "CREATE FUNCTION active_count() RETURNS bigint AS $$ SELECT count(*) FROM users WHERE active $$ LANGUAGE sql",
            None,
        ));
        let Operation::CreateFunction(f) = op else {
            panic!("expected a function");
        };
        assert_eq!(f.function_name, "active_count");
        assert_eq!(f.references.relations, set(&["users"]));
        assert_eq!(f.calls.functions, set(&["count"]));
    }

    #[test]
    fn test_plpgsql_body_uses_detected_dialect() {
        let op = extracted(extract_routine(
            "CREATE OR REPLACE FUNCTION audit() RETURNS trigger AS $$\nBEGIN\n  INSERT INTO audit_log VALUES (NEW.id);\n  RETURN NEW;\nEND;\n$$ LANGUAGE plpgsql",
            None,
        ));
        let Operation::CreateFunction(f) = op else {
            panic!("expected a function");
        };
        assert!(f.or_replace);
        assert!(f
            .return_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("trigger")));
        assert_eq!(f.references.relations, set(&["audit_log"]));
    }

    #[test]
    fn test_function_header_types_keep_source_spelling() {
        let op = extracted(extract_routine(
            "CREATE FUNCTION label(a integer, b numeric ( 10 , 2 )) RETURNS text AS $$ SELECT 'x' $$ LANGUAGE sql",
            None,
        ));
        let Operation::CreateFunction(f) = op else {
            panic!("expected a function");
        };
        let types: Vec<_> = f
            .parameters
            .iter()
            .map(|p| p.data_type.as_deref().unwrap_or_default())
            .collect();
        assert_eq!(types, vec!["integer", "numeric(10,2)"]);
        assert_eq!(f.return_type.as_deref(), Some("text"));
    }

    #[test]
    fn test_tsql_procedure_from_create_or_alter() {
        let op = extracted(extract_routine(
            "CREATE OR ALTER PROCEDURE dbo.usp_Close @id INT AS BEGIN UPDATE dbo.Orders SET closed = 1 WHERE id = @id; EXEC dbo.usp_Log @id; END",
            None,
        ));
        let Operation::CreateProcedure(p) = op else {
            panic!("expected a procedure");
        };
        assert!(p.or_replace);
        assert_eq!(p.schema.as_deref(), Some("dbo"));
        assert_eq!(p.references.relations, set(&["dbo.Orders"]));
        assert_eq!(p.calls.procedures, set(&["dbo.usp_Log"]));
    }

    #[test]
    fn test_undetectable_body_keeps_header() {
        let outcome = extract_routine("CREATE PROCEDURE p(a int) AS BEGIN )))((( END", None);
        let RoutineOutcome::HeaderOnly(Operation::CreateProcedure(p), _) = outcome else {
            panic!("expected header-only procedure");
        };
        assert_eq!(p.procedure_name, "p");
        assert_eq!(p.parameters.len(), 1);
        assert!(p.references.is_empty());
    }

    #[test]
    fn test_alter_rename_is_unsupported() {
        assert!(matches!(
            extract_routine("ALTER FUNCTION f(int) RENAME TO g", None),
            RoutineOutcome::Unsupported(_)
        ));
    }

    #[test]
    fn test_alter_procedure_with_body() {
        let op = extracted(extract_routine(
            "ALTER PROCEDURE dbo.p AS SELECT * FROM dbo.t",
            Some(SqlDialect::TSql),
        ));
        let Operation::AlterProcedure(p) = op else {
            panic!("expected an alter procedure");
        };
        assert_eq!(p.references.relations, set(&["dbo.t"]));
    }
}
