//! PL/SQL package bodies

use super::signature::{read_chain, read_signature, RoutineSignature};
use crate::names;
use crate::script::scanner::tokenize;
use crate::script::{block_delta, Lexeme};

/// A `CREATE PACKAGE BODY` split into its member routines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageBody {
    pub name: String,
    pub schema: Option<String>,
    pub or_replace: bool,
    /// Members with names qualified as `package.member`
    pub members: Vec<RoutineSignature>,
}

pub fn read_package_body(text: &str) -> Option<PackageBody> {
    let lexemes = tokenize(text);
    let body_at = lexemes.iter().take(8).position(|l| l.is_word("BODY"))?;
    let or_replace = lexemes[..body_at].iter().any(|l| l.is_any_word(&["REPLACE", "ALTER"]));

    let (chain, next) = read_chain(text, &lexemes, body_at + 1)?;
    let (schema, name) = names::normalize_identifier_chain(chain)
        .as_deref()
        .and_then(names::split_schema_and_name)?;

    let start = lexemes
        .iter()
        .enumerate()
        .skip(next)
        .find(|(_, l)| l.is_any_word(&["AS", "IS"]))
        .map(|(i, _)| i + 1)?;

    let members = member_spans(&lexemes, start)
        .into_iter()
        .filter_map(|(from, to)| {
            let source = &text[lexemes[from].start..lexemes[to].end];
            let mut member = read_signature(&format!("CREATE {source}"))?;
            member.name = format!("{}.{}", name, member.name);
            member.schema = schema.clone();
            member.or_replace = or_replace;
            Some(member)
        })
        .collect();

    Some(PackageBody {
        name,
        schema,
        or_replace,
        members,
    })
}

/// Lexeme ranges (inclusive) of member procedures and functions.
/// Forward declarations are skipped.
fn member_spans(lexemes: &[Lexeme<'_>], start: usize) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut i = start;
    while i < lexemes.len() {
        let lexeme = &lexemes[i];
        // initialization section or the package's own END
        if lexeme.is_any_word(&["BEGIN", "END"]) {
            break;
        }
        if !lexeme.is_any_word(&["PROCEDURE", "FUNCTION"]) {
            i += 1;
            continue;
        }
        match member_end(lexemes, i) {
            Some(MemberEnd::Definition(end)) => {
                spans.push((i, end));
                i = end + 1;
            }
            Some(MemberEnd::Declaration(end)) => i = end + 1,
            None => break,
        }
    }
    spans
}

enum MemberEnd {
    /// Index of the last lexeme before the closing `;`
    Definition(usize),
    /// Index of the `;` ending a forward declaration
    Declaration(usize),
}

fn member_end(lexemes: &[Lexeme<'_>], start: usize) -> Option<MemberEnd> {
    let mut depth = 0i32;
    let mut parens = 0u32;
    let mut opened = false;
    let mut has_body = false;
    let mut nested = 0u32;

    for i in start + 1..lexemes.len() {
        let lexeme = &lexemes[i];
        if lexeme.is_symbol(b'(') {
            parens += 1;
            continue;
        }
        if lexeme.is_symbol(b')') {
            parens = parens.saturating_sub(1);
            continue;
        }
        if parens > 0 {
            continue;
        }
        if depth == 0 && lexeme.is_any_word(&["IS", "AS"]) {
            has_body = true;
        }
        if depth == 0 && has_body && lexeme.is_any_word(&["PROCEDURE", "FUNCTION"]) {
            nested += 1;
        }
        match block_delta(lexemes, i) {
            1 => {
                depth += 1;
                opened = true;
            }
            -1 => depth -= 1,
            _ => {}
        }
        if lexeme.is_symbol(b';') && depth <= 0 {
            if !has_body {
                return Some(MemberEnd::Declaration(i));
            }
            if opened {
                if nested == 0 {
                    return Some(MemberEnd::Definition(i - 1));
                }
                nested -= 1;
                opened = false;
            }
        }
    }
    None
}
