//! Identifier and type-signature normalization
//!
//! Every name that reaches the output goes through one of these helpers, so
//! `"HR"."Orders"`, `` `HR`.`Orders` `` and `[HR].[Orders]` all come out as
//! `HR.Orders`.

use regex::Regex;
use sqlparser::ast::{Ident, ObjectName};
use std::sync::LazyLock;

static WS_BEFORE_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+\(").expect("valid regex"));
static WS_AFTER_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\s+").expect("valid regex"));
static WS_BEFORE_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+\)").expect("valid regex"));
static WS_BEFORE_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+,").expect("valid regex"));
static WS_AFTER_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s+").expect("valid regex"));

/// Remove one matching pair of `"…"`, `` `…` `` or `[…]` around a trimmed
/// identifier.
pub fn strip_quotes(id: &str) -> Option<String> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return None;
    }
    let bytes = trimmed.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        let paired = matches!(
            (first, last),
            (b'"', b'"') | (b'`', b'`') | (b'[', b']')
        );
        if paired {
            return Some(trimmed[1..trimmed.len() - 1].to_string());
        }
    }
    Some(trimmed.to_string())
}

/// Split `schema.name` on the last dot, quote-stripping both halves.
pub fn split_schema_and_name(combined: &str) -> Option<(Option<String>, String)> {
    let trimmed = combined.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.rfind('.') {
        Some(idx) => {
            let schema = strip_quotes(&trimmed[..idx]);
            let name = strip_quotes(&trimmed[idx + 1..])?;
            Some((schema, name))
        }
        None => Some((None, strip_quotes(trimmed)?)),
    }
}

/// Canonicalize whitespace around parentheses and commas in a type signature.
pub fn normalize_type_format(ty: &str) -> Option<String> {
    let trimmed = ty.trim();
    if trimmed.is_empty() {
        return None;
    }
    let s = WS_BEFORE_OPEN.replace_all(trimmed, "(");
    let s = WS_AFTER_OPEN.replace_all(&s, "(");
    let s = WS_BEFORE_CLOSE.replace_all(&s, ")");
    let s = WS_BEFORE_COMMA.replace_all(&s, ",");
    let s = WS_AFTER_COMMA.replace_all(&s, ",");
    Some(s.into_owned())
}

/// Normalize a dotted identifier chain, stripping quotes per segment.
pub fn normalize_identifier_chain(chain: &str) -> Option<String> {
    let parts: Vec<String> = split_chain(chain)
        .into_iter()
        .filter_map(|seg| strip_quotes(seg))
        .collect();
    join_nonempty(parts)
}

/// Like [`normalize_identifier_chain`], also cutting each segment at its first
/// `@` (Oracle database links).
pub fn normalize_function_name_chain(chain: &str) -> Option<String> {
    let parts: Vec<String> = split_chain(chain)
        .into_iter()
        .filter_map(|seg| {
            let seg = seg.split('@').next().unwrap_or_default();
            strip_quotes(seg)
        })
        .collect();
    join_nonempty(parts)
}

/// Normalized dotted name of a sqlparser [`ObjectName`].
pub fn object_name(name: &ObjectName) -> Option<String> {
    join_nonempty(name.0.iter().filter_map(ident_value).collect())
}

/// Unquoted value of a sqlparser [`Ident`].
pub fn ident_value(ident: &Ident) -> Option<String> {
    let value = ident.value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Split an [`ObjectName`] into `(schema, name)` on its last part.
pub fn object_schema_and_name(name: &ObjectName) -> Option<(Option<String>, String)> {
    let parts: Vec<String> = name.0.iter().filter_map(ident_value).collect();
    match parts.as_slice() {
        [] => None,
        [single] => Some((None, single.clone())),
        [prefix @ .., last] => Some((Some(prefix.join(".")), last.clone())),
    }
}

const TYPE_NAMES: &[&str] = &[
    "DECIMAL", "NUMERIC", "NUMBER", "INT", "INTEGER", "SMALLINT", "BIGINT", "TINYINT",
    "MEDIUMINT", "DOUBLE", "FLOAT", "REAL", "DATE", "TIME", "TIMESTAMP", "DATETIME",
    "DATETIME2", "INTERVAL", "VARCHAR", "VARCHAR2", "NVARCHAR", "NVARCHAR2", "CHAR", "NCHAR",
    "CHARACTER", "TEXT", "CLOB", "BLOB", "RAW", "BINARY", "VARBINARY", "BOOLEAN", "BOOL", "BIT",
    "MONEY", "UUID", "JSON", "JSONB", "XML",
];

/// Whether `word` is a scalar type keyword (`NUMBER`, `VARCHAR2`, ...).
pub fn is_sql_type_name(word: &str) -> bool {
    let upper = word.trim().to_ascii_uppercase();
    TYPE_NAMES.contains(&upper.as_str())
}

// Dots inside quotes belong to the segment.
fn split_chain(chain: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut quote: Option<u8> = None;
    for (i, b) in chain.bytes().enumerate() {
        match (quote, b) {
            (None, b'"') | (None, b'`') => quote = Some(b),
            (None, b'[') => quote = Some(b']'),
            (Some(q), _) if b == q => quote = None,
            (None, b'.') => {
                segments.push(&chain[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    segments.push(&chain[start..]);
    segments
}

fn join_nonempty(parts: Vec<String>) -> Option<String> {
    let parts: Vec<String> = parts.into_iter().filter(|p| !p.is_empty()).collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("."))
    }
}
