//! Lexical readers for DDL that no sqlparser grammar accepts
//!
//! T-SQL `CREATE TABLE ... WITH (...) ON [PRIMARY]`, Oracle storage clauses,
//! `DROP PROCEDURE` without parentheses and similar statements end up here.

use regex::Regex;
use std::sync::LazyLock;

use super::ddl::{add_label, label_column, push_unique};
use crate::body::analyzer_for;
use crate::dialect::SqlDialect;
use crate::model::{
    AlterViewOperation, ColumnDefinition, CreateIndexOperation, CreateTableOperation,
    CreateViewOperation, DropObjectType, DropOperation, ForeignKeyDefinition, Operation,
    SqlReferences,
};
use crate::names;
use crate::routines::{matching_paren, read_chain, span_text, split_top_level};
use crate::script::scanner::tokenize;
use crate::script::Lexeme;

static DROP_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)^\s*DROP\s+(TABLE|MATERIALIZED\s+VIEW|VIEW|INDEX|PROCEDURE|PROC|FUNCTION|TRIGGER)\s+(IF\s+EXISTS\s+)?",
    )
    .expect("valid regex")
});

static INDEX_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)^\s*CREATE\s+(UNIQUE\s+)?(?:(?:CLUSTERED|NONCLUSTERED|BITMAP|FULLTEXT|SPATIAL)\s+)?INDEX\s+(?:CONCURRENTLY\s+)?(?:IF\s+NOT\s+EXISTS\s+)?(\S+)\s+ON\s+(?:ONLY\s+)?",
    )
    .expect("valid regex")
});

static VIEW_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)^\s*(CREATE|ALTER)\s+(OR\s+(?:REPLACE|ALTER)\s+)?(?:(?:FORCE|NOFORCE|EDITIONABLE|NONEDITIONABLE|TEMP|TEMPORARY|MATERIALIZED)\s+)*(?:ALGORITHM\s*=\s*\w+\s+)?(?:DEFINER\s*=\s*\S+\s+)?(?:SQL\s+SECURITY\s+\w+\s+)?VIEW\s+(?:IF\s+NOT\s+EXISTS\s+)?",
    )
    .expect("valid regex")
});

/// Words that end a column's type in a table body
const COLUMN_TAIL: &[&str] = &[
    "NOT", "NULL", "PRIMARY", "UNIQUE", "REFERENCES", "DEFAULT", "CONSTRAINT", "CHECK",
    "IDENTITY", "AUTO_INCREMENT", "AUTOINCREMENT", "GENERATED", "COLLATE", "COMMENT", "ON",
    "ENCODE", "SPARSE", "ROWGUIDCOL", "FILESTREAM", "AS", "WITH", "CHARACTER", "CHARSET",
];

/// Read a statement of the given kind lexically
pub fn fallback_operations(text: &str, file_dialect: Option<SqlDialect>) -> Option<Vec<Operation>> {
    let lexemes = tokenize(text);
    let first = lexemes.first()?;
    if first.is_word("DROP") {
        return read_drop(text);
    }
    let object = lexemes
        .iter()
        .skip(1)
        .take(12)
        .find(|l| l.is_any_word(&["TABLE", "VIEW", "INDEX"]))?;
    if object.is_word("INDEX") {
        return read_create_index(text).map(|op| vec![Operation::CreateIndex(op)]);
    }
    if object.is_word("VIEW") {
        return read_view(text, file_dialect).map(|op| vec![op]);
    }
    if first.is_word("CREATE") {
        return read_create_table(text, &lexemes).map(|op| vec![Operation::CreateTable(op)]);
    }
    None
}

/// `DROP <type> [IF EXISTS] name [, name]...`
pub fn read_drop(text: &str) -> Option<Vec<Operation>> {
    let caps = DROP_HEADER.captures(text)?;
    let object_type = DropObjectType::from_keyword(caps.get(1)?.as_str())?;
    let if_exists = caps.get(2).is_some();
    let rest = &text[caps.get(0)?.end()..];

    let lexemes = tokenize(rest);
    let mut operations = Vec::new();
    let mut i = 0;
    while let Some((chain, next)) = read_chain(rest, &lexemes, i) {
        if let Some((schema, object_name)) = names::normalize_identifier_chain(chain)
            .as_deref()
            .and_then(names::split_schema_and_name)
        {
            operations.push(Operation::Drop(DropOperation {
                object_type,
                object_name,
                schema,
                if_exists,
            }));
        }
        // skip an argument list, then continue after a comma
        i = next;
        if lexemes.get(i).is_some_and(|l| l.is_symbol(b'(')) {
            i = matching_paren(&lexemes, i).map_or(lexemes.len(), |close| close + 1);
        }
        if !lexemes.get(i).is_some_and(|l| l.is_symbol(b',')) {
            break;
        }
        i += 1;
    }
    (!operations.is_empty()).then_some(operations)
}

pub fn read_create_index(text: &str) -> Option<CreateIndexOperation> {
    let caps = INDEX_HEADER.captures(text)?;
    let unique = caps.get(1).is_some();
    let index_name = names::normalize_identifier_chain(caps.get(2)?.as_str())
        .as_deref()
        .and_then(names::split_schema_and_name)
        .map(|(_, name)| name);
    let rest = &text[caps.get(0)?.end()..];

    let lexemes = tokenize(rest);
    let (chain, next) = read_chain(rest, &lexemes, 0)?;
    let (schema, table_name) = names::normalize_identifier_chain(chain)
        .as_deref()
        .and_then(names::split_schema_and_name)?;

    // USING btree (...)
    let open = lexemes
        .iter()
        .enumerate()
        .skip(next)
        .find(|(_, l)| l.is_symbol(b'('))
        .map(|(i, _)| i);
    let columns = match open.and_then(|o| Some((o, matching_paren(&lexemes, o)?))) {
        Some((open, close)) => split_top_level(&lexemes[open + 1..close])
            .into_iter()
            .filter_map(|part| index_column(rest, part))
            .collect(),
        None => Vec::new(),
    };

    Some(CreateIndexOperation {
        index_name,
        table_name,
        schema,
        unique,
        columns,
    })
}

// `col ASC`, `"col"`, `lower(col)`
fn index_column(text: &str, part: &[Lexeme<'_>]) -> Option<String> {
    let end = part
        .iter()
        .position(|l| l.is_any_word(&["ASC", "DESC", "NULLS", "COLLATE"]))
        .unwrap_or(part.len());
    let part = &part[..end];
    if let [single] = part {
        return names::strip_quotes(single.text);
    }
    names::normalize_type_format(span_text(text, part)?)
}

/// `CREATE|ALTER [OR REPLACE] VIEW name [(cols)] AS query`, the query
/// analyzed quietly
pub fn read_view(text: &str, file_dialect: Option<SqlDialect>) -> Option<Operation> {
    let caps = VIEW_HEADER.captures(text)?;
    let alter = caps.get(1)?.as_str().eq_ignore_ascii_case("ALTER");
    let or_replace = caps.get(2).is_some();
    let rest = &text[caps.get(0)?.end()..];

    let lexemes = tokenize(rest);
    let (chain, next) = read_chain(rest, &lexemes, 0)?;
    let (schema, view_name) = names::normalize_identifier_chain(chain)
        .as_deref()
        .and_then(names::split_schema_and_name)?;

    let body = lexemes
        .iter()
        .skip(next)
        .find(|l| l.is_word("AS"))
        .map(|as_word| &rest[as_word.end..]);
    let references = SqlReferences {
        relations: body
            .map(|query| {
                analyzer_for(file_dialect.unwrap_or_default())
                    .analyze(query)
                    .relations
            })
            .unwrap_or_default(),
    };

    Some(if alter {
        Operation::AlterView(AlterViewOperation {
            view_name,
            schema,
            references,
        })
    } else {
        Operation::CreateView(CreateViewOperation {
            view_name,
            schema,
            or_replace,
            references,
        })
    })
}

/// Column list and keys of a `CREATE TABLE`, read token by token
pub fn read_create_table(text: &str, lexemes: &[Lexeme<'_>]) -> Option<CreateTableOperation> {
    let table_at = lexemes.iter().take(8).position(|l| l.is_word("TABLE"))?;
    let mut i = table_at + 1;
    let if_not_exists = lexemes.get(i).is_some_and(|l| l.is_word("IF"))
        && lexemes.get(i + 1).is_some_and(|l| l.is_word("NOT"))
        && lexemes.get(i + 2).is_some_and(|l| l.is_word("EXISTS"));
    if if_not_exists {
        i += 3;
    }
    let (chain, next) = read_chain(text, lexemes, i)?;
    let (schema, table_name) = names::normalize_identifier_chain(chain)
        .as_deref()
        .and_then(names::split_schema_and_name)?;

    let mut table = CreateTableOperation {
        table_name,
        schema,
        if_not_exists,
        ..Default::default()
    };
    let Some(open) = lexemes.get(next).filter(|l| l.is_symbol(b'(')).map(|_| next) else {
        // CREATE TABLE ... AS SELECT
        return Some(table);
    };
    let close = matching_paren(lexemes, open).unwrap_or(lexemes.len());

    for part in split_top_level(&lexemes[open + 1..close]) {
        if is_table_constraint(part) {
            read_table_constraint(text, part, &mut table);
        } else if let Some((column, foreign_key)) = read_column(text, part) {
            if column.constraints.iter().any(|c| c == "PRIMARY KEY") {
                push_unique(&mut table.primary_keys, &column.name);
            }
            table.foreign_keys.extend(foreign_key);
            table.columns.push(column);
        }
    }
    Some(table)
}

/// Column types as spelled in a `CREATE TABLE` or `ALTER TABLE ... ADD`
/// statement, keyed by column name
pub(crate) fn source_column_types(text: &str) -> Vec<(String, String)> {
    let lexemes = tokenize(text);
    let mut types = Vec::new();
    if lexemes.first().is_some_and(|l| l.is_word("CREATE")) {
        if let Some(table) = read_create_table(text, &lexemes) {
            types.extend(
                table
                    .columns
                    .into_iter()
                    .filter_map(|c| Some((c.name, c.data_type?))),
            );
        }
        return types;
    }
    for part in split_top_level(&lexemes) {
        let Some(add) = part.iter().position(|l| l.is_word("ADD")) else {
            continue;
        };
        let mut i = add + 1;
        if part.get(i).is_some_and(|l| l.is_word("COLUMN")) {
            i += 1;
        }
        if part.get(i).is_some_and(|l| l.is_word("IF")) {
            i += 3;
        }
        let Some(column) = part.get(i..) else { continue };
        if is_table_constraint(column) {
            continue;
        }
        if let Some((column, _)) = read_column(text, column) {
            types.extend(column.data_type.map(|ty| (column.name, ty)));
        }
    }
    types
}

fn is_table_constraint(part: &[Lexeme<'_>]) -> bool {
    part.first().is_some_and(|l| {
        l.is_any_word(&[
            "CONSTRAINT", "PRIMARY", "FOREIGN", "UNIQUE", "KEY", "INDEX", "CHECK", "FULLTEXT",
            "SPATIAL", "PERIOD", "EXCLUDE", "LIKE",
        ])
    })
}

fn read_column(
    text: &str,
    part: &[Lexeme<'_>],
) -> Option<(ColumnDefinition, Option<ForeignKeyDefinition>)> {
    let (first, rest) = part.split_first()?;
    if !first.is_name() {
        return None;
    }
    let name = names::strip_quotes(first.text)?;
    let type_end = rest
        .iter()
        .position(|l| l.is_any_word(COLUMN_TAIL))
        .unwrap_or(rest.len());
    let data_type = span_text(text, &rest[..type_end]).and_then(names::normalize_type_format);
    let mut column = ColumnDefinition::new(name.clone(), data_type);
    let mut foreign_key = None;

    let tail = &rest[type_end..];
    for (i, lexeme) in tail.iter().enumerate() {
        let next = tail.get(i + 1);
        if lexeme.is_word("NOT") && next.is_some_and(|n| n.is_word("NULL")) {
            column.nullable = false;
            add_label(&mut column, "NOT NULL");
        } else if lexeme.is_word("UNIQUE") {
            add_label(&mut column, "UNIQUE");
        } else if lexeme.is_word("PRIMARY") && next.is_some_and(|n| n.is_word("KEY")) {
            add_label(&mut column, "PRIMARY KEY");
        } else if lexeme.is_word("REFERENCES") {
            add_label(&mut column, "FOREIGN KEY");
            foreign_key = references_clause(text, tail, i + 1).map(|mut fk| {
                fk.columns = vec![name.clone()];
                fk
            });
        }
    }
    Some((column, foreign_key))
}

fn read_table_constraint(text: &str, part: &[Lexeme<'_>], table: &mut CreateTableOperation) {
    let mut i = 0;
    let mut name = None;
    if part.first().is_some_and(|l| l.is_word("CONSTRAINT")) {
        name = part.get(1).and_then(|l| names::strip_quotes(l.text));
        i = 2;
    }
    let Some(head) = part.get(i) else {
        return;
    };
    let columns = column_list(part, i);

    if head.is_word("PRIMARY") {
        for column in &columns {
            label_column(&mut table.columns, column, "PRIMARY KEY");
            push_unique(&mut table.primary_keys, column);
        }
    } else if head.is_word("FOREIGN") {
        let Some(references) = part.iter().position(|l| l.is_word("REFERENCES")) else {
            return;
        };
        for column in &columns {
            label_column(&mut table.columns, column, "FOREIGN KEY");
        }
        if let Some(mut fk) = references_clause(text, part, references + 1) {
            fk.name = name;
            fk.columns = columns;
            table.foreign_keys.push(fk);
        }
    } else if head.is_word("UNIQUE") {
        if let [column] = columns.as_slice() {
            label_column(&mut table.columns, column, "UNIQUE");
        }
    }
}

/// Names in the first parenthesized list at or after `from`
fn column_list(part: &[Lexeme<'_>], from: usize) -> Vec<String> {
    let Some(open) = part.iter().skip(from).position(|l| l.is_symbol(b'(')) else {
        return Vec::new();
    };
    let open = open + from;
    let close = matching_paren(part, open).unwrap_or(part.len());
    part[open + 1..close]
        .iter()
        .filter(|l| l.is_name() && !l.is_any_word(&["ASC", "DESC"]))
        .filter_map(|l| names::strip_quotes(l.text))
        .collect()
}

/// `table [(cols)] [ON DELETE action] [ON UPDATE action]` starting at `i`
fn references_clause(text: &str, lexemes: &[Lexeme<'_>], i: usize) -> Option<ForeignKeyDefinition> {
    let (chain, next) = read_chain(text, lexemes, i)?;
    let referenced_table = names::normalize_identifier_chain(chain)?;
    let referenced_columns = if lexemes.get(next).is_some_and(|l| l.is_symbol(b'(')) {
        column_list(lexemes, next)
    } else {
        Vec::new()
    };

    let mut fk = ForeignKeyDefinition {
        referenced_table,
        referenced_columns,
        ..Default::default()
    };
    for (j, lexeme) in lexemes.iter().enumerate().skip(next) {
        if !lexeme.is_word("ON") {
            continue;
        }
        let Some(event) = lexemes.get(j + 1) else {
            break;
        };
        let action = referential_action(&lexemes[j + 2..]);
        if event.is_word("DELETE") {
            fk.on_delete = action;
        } else if event.is_word("UPDATE") {
            fk.on_update = action;
        }
    }
    Some(fk)
}

fn referential_action(lexemes: &[Lexeme<'_>]) -> Option<String> {
    let first = lexemes.first()?;
    let two_words = first.is_any_word(&["SET", "NO"]);
    let words: Vec<String> = lexemes
        .iter()
        .take(if two_words { 2 } else { 1 })
        .map(Lexeme::upper)
        .collect();
    Some(words.join(" "))
}
