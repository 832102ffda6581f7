//! Lexical reader for `CREATE|ALTER PROCEDURE|FUNCTION` headers
//!
//! Works on scanner lexemes, so it accepts every dialect's header syntax:
//! parenthesized parameter lists, T-SQL `@` parameters without parentheses,
//! PL/SQL `name IN OUT type` and MySQL `DEFINER=` clauses.

use crate::model::{ParameterDefinition, ParameterDirection};
use crate::names;
use crate::script::scanner::{dollar_body_inner, string_content, tokenize};
use crate::script::{Lexeme, LexemeKind, RoutineKind};

/// Header fields and body text of one routine definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineSignature {
    pub kind: RoutineKind,
    pub alter: bool,
    pub or_replace: bool,
    pub name: String,
    pub schema: Option<String>,
    pub parameters: Vec<ParameterDefinition>,
    pub return_type: Option<String>,
    pub body: Option<String>,
}

const HEADER_WINDOW: usize = 12;

/// Words that end a return type
const RETURN_TYPE_STOP: &[&str] = &[
    "AS", "IS", "LANGUAGE", "BEGIN", "RETURN", "DETERMINISTIC", "NOT", "READS", "MODIFIES",
    "NO", "CONTAINS", "COMMENT", "IMMUTABLE", "STABLE", "VOLATILE", "STRICT", "SECURITY",
    "CALLED", "PARALLEL", "COST", "ROWS", "PIPELINED", "RESULT_CACHE", "AUTHID",
    "PARALLEL_ENABLE", "SQL", "EXTERNAL", "LEAKPROOF", "SUPPORT", "TRANSFORM", "WINDOW",
];

/// Words that can start a body without `AS`/`IS`
const BODY_START_WORDS: &[&str] = &[
    "BEGIN", "SELECT", "INSERT", "UPDATE", "DELETE", "CALL", "REPLACE",
];

/// Read a routine header. Returns `None` when `text` is not a routine
/// definition or has no usable name.
pub fn read_signature(text: &str) -> Option<RoutineSignature> {
    let lexemes = tokenize(text);
    let first = lexemes.first()?;
    let alter = first.is_word("ALTER");
    if !alter && !first.is_word("CREATE") {
        return None;
    }

    let mut or_replace = false;
    let mut i = 1;
    if lexemes.get(i).is_some_and(|l| l.is_word("OR"))
        && lexemes
            .get(i + 1)
            .is_some_and(|l| l.is_any_word(&["REPLACE", "ALTER"]))
    {
        or_replace = true;
        i += 2;
    }

    // DEFINER=`root`@`%`, EDITIONABLE and friends sit before the object word
    let (kind_index, kind) = lexemes
        .iter()
        .enumerate()
        .skip(i)
        .take(HEADER_WINDOW)
        .find_map(|(idx, l)| {
            if l.is_any_word(&["PROCEDURE", "PROC"]) {
                Some((idx, RoutineKind::Procedure))
            } else if l.is_word("FUNCTION") {
                Some((idx, RoutineKind::Function))
            } else {
                None
            }
        })?;
    i = kind_index + 1;

    if lexemes.get(i).is_some_and(|l| l.is_word("IF")) {
        while lexemes.get(i).is_some_and(|l| l.is_any_word(&["IF", "NOT", "EXISTS"])) {
            i += 1;
        }
    }

    let (chain, next) = read_chain(text, &lexemes, i)?;
    let (schema, name) = names::normalize_identifier_chain(chain)
        .as_deref()
        .and_then(names::split_schema_and_name)?;
    i = next;
    // T-SQL numbered procedures: `dbo.p;2`
    if lexemes.get(i).is_some_and(|l| l.is_symbol(b';'))
        && lexemes.get(i + 1).is_some_and(|l| l.kind == LexemeKind::Number)
    {
        i += 2;
    }

    let mut parameters = Vec::new();
    if lexemes.get(i).is_some_and(|l| l.is_symbol(b'(')) {
        let close = matching_paren(&lexemes, i).unwrap_or(lexemes.len());
        parameters = read_parameters(text, &lexemes[i + 1..close.min(lexemes.len())]);
        i = (close + 1).min(lexemes.len());
    } else if lexemes.get(i).is_some_and(|l| l.text.starts_with('@')) {
        let end = tsql_parameter_end(&lexemes, i);
        parameters = read_parameters(text, &lexemes[i..end]);
        i = end;
    }

    let mut return_type = None;
    let mut saw_returns = false;
    if kind == RoutineKind::Function {
        if let Some(l) = lexemes.get(i) {
            if l.is_any_word(&["RETURNS", "RETURN"]) {
                saw_returns = l.is_word("RETURNS");
                let (ty, next) = read_return_type(text, &lexemes, i + 1);
                return_type = ty;
                i = next;
            }
        }
    }

    let body = read_body(text, &lexemes, i, saw_returns);

    Some(RoutineSignature {
        kind,
        alter,
        or_replace,
        name,
        schema,
        parameters,
        return_type,
        body,
    })
}

/// A dotted name starting at `i`, as source text
pub(crate) fn read_chain<'a>(
    text: &'a str,
    lexemes: &[Lexeme<'a>],
    i: usize,
) -> Option<(&'a str, usize)> {
    let first = lexemes.get(i).filter(|l| l.is_name())?;
    let mut end = i;
    while lexemes.get(end + 1).is_some_and(|l| l.is_symbol(b'.'))
        && lexemes.get(end + 2).is_some_and(|l| l.is_name())
    {
        end += 2;
    }
    Some((&text[first.start..lexemes[end].end], end + 1))
}

pub(crate) fn matching_paren(lexemes: &[Lexeme<'_>], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, lexeme) in lexemes.iter().enumerate().skip(open) {
        if lexeme.is_symbol(b'(') {
            depth += 1;
        } else if lexeme.is_symbol(b')') {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return Some(idx);
            }
        }
    }
    None
}

/// Split at commas outside parentheses
pub(crate) fn split_top_level<'l, 'a>(lexemes: &'l [Lexeme<'a>]) -> Vec<&'l [Lexeme<'a>]> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (idx, lexeme) in lexemes.iter().enumerate() {
        if lexeme.is_symbol(b'(') {
            depth += 1;
        } else if lexeme.is_symbol(b')') {
            depth = depth.saturating_sub(1);
        } else if lexeme.is_symbol(b',') && depth == 0 {
            parts.push(&lexemes[start..idx]);
            start = idx + 1;
        }
    }
    parts.push(&lexemes[start..]);
    parts.into_iter().filter(|p| !p.is_empty()).collect()
}

/// Source text covered by a lexeme run
pub(crate) fn span_text<'a>(text: &'a str, lexemes: &[Lexeme<'a>]) -> Option<&'a str> {
    let (first, last) = (lexemes.first()?, lexemes.last()?);
    Some(&text[first.start..last.end])
}

// T-SQL `@a INT, @b INT OUTPUT AS ...` runs to AS, WITH or RETURNS
fn tsql_parameter_end(lexemes: &[Lexeme<'_>], start: usize) -> usize {
    let mut depth = 0usize;
    for (idx, lexeme) in lexemes.iter().enumerate().skip(start) {
        if lexeme.is_symbol(b'(') {
            depth += 1;
        } else if lexeme.is_symbol(b')') {
            depth = depth.saturating_sub(1);
        } else if depth == 0 && lexeme.is_any_word(&["AS", "WITH", "RETURNS", "FOR"]) {
            return idx;
        }
    }
    lexemes.len()
}

fn read_parameters(text: &str, lexemes: &[Lexeme<'_>]) -> Vec<ParameterDefinition> {
    split_top_level(lexemes)
        .into_iter()
        .filter_map(|segment| read_parameter(text, segment))
        .collect()
}

fn read_parameter(text: &str, segment: &[Lexeme<'_>]) -> Option<ParameterDefinition> {
    let mut param = ParameterDefinition::default();
    let mut i = 0;

    // Leading mode: PostgreSQL and MySQL
    if let Some((direction, used)) = read_direction(segment, i) {
        if segment.len() > used {
            param.direction = Some(direction);
            i += used;
        }
    } else if segment.first().is_some_and(|l| l.is_word("VARIADIC")) {
        i += 1;
    }

    let first = segment.get(i)?;
    let tsql = first.text.starts_with('@');
    let rest = segment.len() - i;
    let has_name = tsql
        || (first.is_name()
            && rest > 1
            && !(names::is_sql_type_name(first.text)
                && segment.get(i + 1).is_some_and(|n| {
                    n.is_symbol(b'(') || n.is_any_word(&["PRECISION", "VARYING", "WITH", "WITHOUT"])
                }))
            && !segment.get(i + 1).is_some_and(|n| n.is_symbol(b'.') || n.is_symbol(b'%')));
    if has_name {
        param.name = names::strip_quotes(first.text);
        i += 1;
    }
    if tsql {
        param.direction = Some(ParameterDirection::In);
        if segment.get(i).is_some_and(|l| l.is_word("AS")) {
            i += 1;
        }
    }

    // PL/SQL mode after the name
    if param.direction.is_none() {
        if let Some((direction, used)) = read_direction(segment, i) {
            param.direction = Some(direction);
            i += used;
        }
    }
    if segment.get(i).is_some_and(|l| l.is_word("NOCOPY")) {
        i += 1;
    }

    let type_start = i;
    while let Some(l) = segment.get(i) {
        if l.is_any_word(&["DEFAULT", "OUTPUT", "OUT", "READONLY"])
            || l.is_symbol(b'=')
            || (l.is_symbol(b':') && segment.get(i + 1).is_some_and(|n| n.is_symbol(b'=')))
        {
            break;
        }
        i += 1;
    }
    param.data_type =
        span_text(text, &segment[type_start..i]).and_then(names::normalize_type_format);

    let mut default_end = segment.len();
    while default_end > i && segment[default_end - 1].is_any_word(&["OUTPUT", "OUT", "READONLY"]) {
        if tsql && !segment[default_end - 1].is_word("READONLY") {
            param.direction = Some(ParameterDirection::Out);
        }
        default_end -= 1;
    }
    if let Some(l) = segment.get(i) {
        let skip = if l.is_symbol(b':') { 2 } else { 1 };
        if l.is_word("DEFAULT") || l.is_symbol(b'=') || l.is_symbol(b':') {
            let from = (i + skip).min(default_end);
            param.default =
                span_text(text, &segment[from..default_end]).map(|s| s.trim().to_string());
        }
    }

    if param.name.is_none() && param.data_type.is_none() {
        return None;
    }
    Some(param)
}

fn read_direction(segment: &[Lexeme<'_>], i: usize) -> Option<(ParameterDirection, usize)> {
    let lexeme = segment.get(i)?;
    if lexeme.is_word("IN") {
        if segment.get(i + 1).is_some_and(|l| l.is_word("OUT")) {
            return Some((ParameterDirection::InOut, 2));
        }
        return Some((ParameterDirection::In, 1));
    }
    if lexeme.is_any_word(&["OUT", "INOUT"]) {
        return ParameterDirection::from_keyword(lexeme.text).map(|d| (d, 1));
    }
    None
}

fn read_return_type(text: &str, lexemes: &[Lexeme<'_>], start: usize) -> (Option<String>, usize) {
    // T-SQL table-valued: RETURNS @t TABLE (...)
    if lexemes.get(start).is_some_and(|l| l.text.starts_with('@'))
        && lexemes.get(start + 1).is_some_and(|l| l.is_word("TABLE"))
    {
        let mut next = start + 2;
        if lexemes.get(next).is_some_and(|l| l.is_symbol(b'(')) {
            next = matching_paren(lexemes, next).map_or(lexemes.len(), |c| c + 1);
        }
        return (Some("TABLE".to_string()), next);
    }

    let mut i = start;
    let mut depth = 0usize;
    while let Some(l) = lexemes.get(i) {
        if l.is_symbol(b'(') {
            depth += 1;
        } else if l.is_symbol(b')') {
            depth = depth.saturating_sub(1);
        } else if depth == 0 {
            let with_clause = l.is_word("WITH")
                && !lexemes
                    .get(i + 1)
                    .is_some_and(|n| n.is_any_word(&["TIME", "LOCAL"]));
            if l.is_any_word(RETURN_TYPE_STOP)
                || with_clause
                || l.is_symbol(b';')
                || matches!(l.kind, LexemeKind::DollarBody | LexemeKind::StringLit)
            {
                break;
            }
        }
        i += 1;
    }
    let ty = span_text(text, &lexemes[start..i]).and_then(names::normalize_type_format);
    (ty, i)
}

fn read_body(
    text: &str,
    lexemes: &[Lexeme<'_>],
    start: usize,
    saw_returns: bool,
) -> Option<String> {
    let mut depth = 0usize;
    for idx in start..lexemes.len() {
        let lexeme = &lexemes[idx];
        if lexeme.is_symbol(b'(') {
            depth += 1;
            continue;
        }
        if lexeme.is_symbol(b')') {
            depth = depth.saturating_sub(1);
            continue;
        }
        if depth > 0 {
            continue;
        }
        match lexeme.kind {
            LexemeKind::DollarBody => return Some(dollar_body_inner(lexeme.text).to_string()),
            LexemeKind::Word => {}
            _ => continue,
        }

        let after_execute = idx > 0 && lexemes[idx - 1].is_word("EXECUTE");
        if lexeme.is_any_word(&["AS", "IS"]) && !after_execute {
            return body_after(text, lexemes, idx + 1);
        }
        // MySQL `RETURNS INT RETURN expr`, SQL-standard `RETURN expr`
        if lexeme.is_word("RETURN") && saw_returns {
            return rest_from(text, lexemes, idx + 1);
        }
        if lexeme.is_any_word(BODY_START_WORDS) {
            return rest_from(text, lexemes, idx);
        }
    }
    None
}

fn body_after(text: &str, lexemes: &[Lexeme<'_>], idx: usize) -> Option<String> {
    let next = lexemes.get(idx)?;
    match next.kind {
        LexemeKind::DollarBody => Some(dollar_body_inner(next.text).to_string()),
        LexemeKind::StringLit => Some(string_content(next.text)),
        _ => rest_from(text, lexemes, idx),
    }
}

fn rest_from(text: &str, lexemes: &[Lexeme<'_>], idx: usize) -> Option<String> {
    let start = lexemes.get(idx)?.start;
    let body = text[start..].trim();
    (!body.is_empty()).then(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn param(
        name: Option<&str>,
        ty: &str,
        direction: Option<ParameterDirection>,
    ) -> ParameterDefinition {
        ParameterDefinition {
            name: name.map(String::from),
            data_type: Some(ty.to_string()),
            direction,
            default: None,
        }
    }

    #[test]
    fn test_postgres_function_header() {
        let sig = read_signature(
            "CREATE OR REPLACE FUNCTION public.order_total(p_id integer, OUT total numeric ( 12 , 2 )) \
             RETURNS numeric LANGUAGE plpgsql AS $fn$ BEGIN RETURN 1; END $fn$",
        )
        .unwrap();
        assert_eq!(sig.kind, RoutineKind::Function);
        assert!(sig.or_replace);
        assert_eq!(sig.schema.as_deref(), Some("public"));
        assert_eq!(sig.name, "order_total");
        assert_eq!(
            sig.parameters,
            vec![
                param(Some("p_id"), "integer", None),
                param(Some("total"), "numeric(12,2)", Some(ParameterDirection::Out)),
            ]
        );
        assert_eq!(sig.return_type.as_deref(), Some("numeric"));
        assert_eq!(sig.body.as_deref(), Some(" BEGIN RETURN 1; END "));
    }

    #[test]
    fn test_tsql_procedure_header() {
        let sig = read_signature(
            "CREATE OR ALTER PROCEDURE [dbo].[usp_Load] @day DATE, @count INT = 0 OUTPUT\nAS\nBEGIN SELECT 1; END",
        )
        .unwrap();
        assert_eq!(sig.kind, RoutineKind::Procedure);
        assert!(sig.or_replace);
        assert_eq!(sig.schema.as_deref(), Some("dbo"));
        assert_eq!(sig.name, "usp_Load");
        assert_eq!(sig.parameters[0], param(Some("@day"), "DATE", Some(ParameterDirection::In)));
        assert_eq!(sig.parameters[1].direction, Some(ParameterDirection::Out));
        assert_eq!(sig.parameters[1].default.as_deref(), Some("0"));
        assert_eq!(sig.body.as_deref(), Some("BEGIN SELECT 1; END"));
    }

    #[test]
    fn test_plsql_procedure_header() {
        let sig = read_signature(
            "CREATE OR REPLACE PROCEDURE hr.raise_salary(p_emp IN NUMBER, p_pct IN OUT NOCOPY NUMBER := 5) IS\n  v NUMBER;\nBEGIN\n  NULL;\nEND raise_salary",
        )
        .unwrap();
        assert_eq!(sig.schema.as_deref(), Some("hr"));
        assert_eq!(sig.parameters[0], param(Some("p_emp"), "NUMBER", Some(ParameterDirection::In)));
        assert_eq!(sig.parameters[1].direction, Some(ParameterDirection::InOut));
        assert_eq!(sig.parameters[1].default.as_deref(), Some("5"));
        assert!(sig.body.unwrap().starts_with("v NUMBER;"));
    }

    #[test]
    fn test_mysql_function_header() {
        let sig = read_signature(
            "CREATE DEFINER=`admin`@`%` FUNCTION `shop`.`order_count`(cid INT) RETURNS INT DETERMINISTIC\nRETURN (SELECT COUNT(*) FROM orders WHERE customer_id = cid)",
        )
        .unwrap();
        assert!(!sig.or_replace);
        assert_eq!(sig.schema.as_deref(), Some("shop"));
        assert_eq!(sig.name, "order_count");
        assert_eq!(sig.return_type.as_deref(), Some("INT"));
        assert_eq!(
            sig.body.as_deref(),
            Some("(SELECT COUNT(*) FROM orders WHERE customer_id = cid)")
        );
    }

    #[test]
    fn test_type_only_parameters_and_table_return() {
        let sig = read_signature(
            "CREATE FUNCTION f(integer, double precision) RETURNS TABLE(id int) AS 'SELECT 1' LANGUAGE sql",
        )
        .unwrap();
        assert_eq!(
            sig.parameters,
            vec![param(None, "integer", None), param(None, "double precision", None)]
        );
        assert_eq!(sig.return_type.as_deref(), Some("TABLE(id int)"));
        assert_eq!(sig.body.as_deref(), Some("SELECT 1"));
    }

    #[test]
    fn test_tsql_table_valued_return() {
        let sig = read_signature(
            "CREATE FUNCTION dbo.recent(@n INT) RETURNS @t TABLE (id INT) AS BEGIN RETURN; END",
        )
        .unwrap();
        assert_eq!(sig.return_type.as_deref(), Some("TABLE"));
        assert_eq!(sig.body.as_deref(), Some("BEGIN RETURN; END"));
    }

    #[test]
    fn test_alter_without_body() {
        let sig = read_signature("ALTER FUNCTION f(int) RENAME TO g").unwrap();
        assert!(sig.alter);
        assert_eq!(sig.body, None);
    }

    #[test]
    fn test_not_a_routine() {
        assert_eq!(read_signature("CREATE TABLE t (id int)"), None);
        assert_eq!(read_signature("SELECT 1"), None);
    }
}
