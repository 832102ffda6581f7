//! T-SQL and Oracle trigger statements
//!
//! ```text
//! CREATE [OR ALTER] TRIGGER name ON table {FOR|AFTER|INSTEAD OF} events AS body
//! CREATE [OR REPLACE] TRIGGER name {BEFORE|AFTER|INSTEAD OF} events [OF cols]
//!     ON table ... [DECLARE ...] BEGIN ... END
//! ```

use crate::body::{PlSqlBodyAnalyzer, RoutineBodyAnalyzer, TSqlBodyAnalyzer};
use crate::model::{
    CreateTriggerOperation, HasReferencesAndCalls, SqlInvocations, SqlReferences, TriggerTiming,
};
use crate::names;
use crate::routines::read_chain;
use crate::script::scanner::tokenize;
use crate::script::Lexeme;

const EVENT_WORDS: &[&str] = &["INSERT", "UPDATE", "DELETE"];

/// Read a trigger statement of either shape. `None` when it matches neither.
pub fn extract_statement_trigger(text: &str) -> Option<CreateTriggerOperation> {
    let lexemes = tokenize(text);
    if !lexemes.first()?.is_word("CREATE") {
        return None;
    }
    let trigger_at = lexemes.iter().take(6).position(|l| l.is_word("TRIGGER"))?;
    let or_replace = lexemes[..trigger_at]
        .iter()
        .any(|l| l.is_any_word(&["REPLACE", "ALTER"]));

    let (chain, next) = read_chain(text, &lexemes, trigger_at + 1)?;
    let (_, trigger_name) = names::normalize_identifier_chain(chain)
        .as_deref()
        .and_then(names::split_schema_and_name)?;

    let mut trigger = match lexemes.get(next) {
        Some(l) if l.is_word("ON") => tsql_trigger(text, &lexemes, next + 1, trigger_name)?,
        Some(l) if l.is_any_word(&["BEFORE", "AFTER", "INSTEAD", "FOR"]) => {
            oracle_trigger(text, &lexemes, next, trigger_name)?
        }
        _ => return None,
    };
    trigger.or_replace = or_replace;
    Some(trigger)
}

fn tsql_trigger(
    text: &str,
    lexemes: &[Lexeme<'_>],
    on: usize,
    trigger_name: String,
) -> Option<CreateTriggerOperation> {
    // DDL triggers keep their scope as the table name
    let (schema, table_name, mut i) = if lexemes.get(on).is_some_and(|l| l.is_word("DATABASE")) {
        (None, "DATABASE".to_string(), on + 1)
    } else if lexemes.get(on).is_some_and(|l| l.is_word("ALL"))
        && lexemes.get(on + 1).is_some_and(|l| l.is_word("SERVER"))
    {
        (None, "ALL SERVER".to_string(), on + 2)
    } else {
        let (chain, next) = read_chain(text, lexemes, on)?;
        let (schema, name) = names::normalize_identifier_chain(chain)
            .as_deref()
            .and_then(names::split_schema_and_name)?;
        (schema, name, next)
    };

    // skip WITH ENCRYPTION / EXECUTE AS ...
    while i < lexemes.len() && !lexemes[i].is_any_word(&["FOR", "AFTER", "INSTEAD"]) {
        i += 1;
    }
    let (timing, mut i) = read_timing(lexemes, i)?;

    let mut events = Vec::new();
    while let Some(l) = lexemes.get(i) {
        if l.is_word("AS") {
            break;
        }
        if l.is_word("WITH") || l.is_word("NOT") {
            // WITH APPEND, NOT FOR REPLICATION
            i += 1;
            while lexemes.get(i).is_some_and(|l| !l.is_word("AS")) {
                i += 1;
            }
            break;
        }
        if l.is_name() {
            push_event(&mut events, l.upper());
        }
        i += 1;
    }

    let mut trigger = new_trigger(trigger_name, table_name, schema, timing, events);
    if let Some(body) = lexemes.get(i + 1).map(|l| &text[l.start..]) {
        trigger.absorb(TSqlBodyAnalyzer.analyze(body));
    }
    Some(trigger)
}

fn oracle_trigger(
    text: &str,
    lexemes: &[Lexeme<'_>],
    at: usize,
    trigger_name: String,
) -> Option<CreateTriggerOperation> {
    let (timing, mut i) = read_timing(lexemes, at)?;

    let mut events = Vec::new();
    let mut in_columns = false;
    while let Some(l) = lexemes.get(i) {
        if l.is_word("ON") {
            break;
        }
        if l.is_word("OF") {
            in_columns = true;
        } else if l.is_word("OR") {
            in_columns = false;
        } else if !in_columns && l.is_name() {
            push_event(&mut events, l.upper());
        }
        i += 1;
    }
    let on = i + 1;
    let (schema, table_name, next) = match lexemes.get(on) {
        Some(l) if l.is_any_word(&["SCHEMA", "DATABASE"]) => (None, l.upper(), on + 1),
        _ => {
            let (chain, next) = read_chain(text, lexemes, on)?;
            let (schema, name) = names::normalize_identifier_chain(chain)
                .as_deref()
                .and_then(names::split_schema_and_name)?;
            (schema, name, next)
        }
    };

    let mut trigger = new_trigger(trigger_name, table_name, schema, timing, events);
    let body_start = lexemes
        .iter()
        .skip(next)
        .find(|l| l.is_any_word(&["DECLARE", "BEGIN"]));
    if let Some(start) = body_start {
        trigger.absorb(PlSqlBodyAnalyzer.analyze(&text[start.start..]));
    }
    Some(trigger)
}

/// `BEFORE`, `AFTER`, `FOR` or `INSTEAD OF` at `i`
fn read_timing(lexemes: &[Lexeme<'_>], i: usize) -> Option<(TriggerTiming, usize)> {
    let lexeme = lexemes.get(i)?;
    if lexeme.is_word("INSTEAD") {
        let next = if lexemes.get(i + 1).is_some_and(|l| l.is_word("OF")) {
            i + 2
        } else {
            i + 1
        };
        return Some((TriggerTiming::InsteadOf, next));
    }
    TriggerTiming::normalize(lexeme.text).map(|timing| (timing, i + 1))
}

fn push_event(events: &mut Vec<String>, word: String) {
    let known = EVENT_WORDS.contains(&word.as_str()) || word.contains('_') || word == "LOGON";
    if known && !events.contains(&word) {
        events.push(word);
    }
}

fn new_trigger(
    trigger_name: String,
    table_name: String,
    schema: Option<String>,
    timing: TriggerTiming,
    events: Vec<String>,
) -> CreateTriggerOperation {
    CreateTriggerOperation {
        trigger_name,
        table_name,
        schema,
        or_replace: false,
        timing,
        events,
        references: SqlReferences::default(),
        calls: SqlInvocations::default(),
    }
}
