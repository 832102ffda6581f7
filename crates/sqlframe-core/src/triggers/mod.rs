//! Trigger extraction
//!
//! sqlparser has no `CREATE TRIGGER` grammar for MySQL, T-SQL or PL/SQL, so
//! triggers are found textually. [`extract_triggers`] runs over the whole
//! file with a PostgreSQL and a MySQL header pattern; [`statement`] handles
//! the T-SQL and Oracle shapes that neither pattern matches.

pub mod statement;

use regex::{Captures, Regex};
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::{debug, trace};

use crate::body::{ProceduralBodyAnalyzer, RoutineBodyAnalyzer};
use crate::model::{
    CreateTriggerOperation, HasReferencesAndCalls, SqlInvocations, SqlReferences, TriggerTiming,
};
use crate::names;

const IDENT: &str = r#"(?:"[^"]+"|`[^`]+`|\[[^\]]+\]|[\w$#]+)"#;

fn qualified() -> String {
    format!(r"{IDENT}(?:\s*\.\s*{IDENT})*")
}

static PG_TRIGGER: LazyLock<Regex> = LazyLock::new(|| {
    let name = qualified();
    let event = r"(?:INSERT|UPDATE(?:\s+OF\s+[^;]+?)?|DELETE|TRUNCATE)";
    Regex::new(&format!(
        r"(?is)\bCREATE\s+(OR\s+REPLACE\s+)?(?:CONSTRAINT\s+)?TRIGGER\s+({name})\s+(BEFORE|AFTER|INSTEAD\s+OF)\s+({event}(?:\s+OR\s+{event})*)\s+ON\s+({name})[^;]*?\bEXECUTE\s+(?:FUNCTION|PROCEDURE)\b"
    ))
    .expect("valid regex")
});

static MYSQL_TRIGGER: LazyLock<Regex> = LazyLock::new(|| {
    let name = qualified();
    Regex::new(&format!(
        r"(?is)\bCREATE\s+(?:DEFINER\s*=\s*\S+\s+)?TRIGGER\s+(?:IF\s+NOT\s+EXISTS\s+)?({name})\s+(BEFORE|AFTER)\s+(INSERT|UPDATE|DELETE)\s+ON\s+({name})"
    ))
    .expect("valid regex")
});

/// Start of any trigger header; bounds the text a MySQL trigger body may use
static ANY_TRIGGER_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)\bCREATE\s+(?:OR\s+(?:REPLACE|ALTER)\s+)?(?:DEFINER\s*=\s*\S+\s+)?(?:CONSTRAINT\s+)?TRIGGER\b")
        .expect("valid regex")
});

static EXECUTE_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?is)\bEXECUTE\s+(FUNCTION|PROCEDURE)\s+({})\s*\(",
        qualified()
    ))
    .expect("valid regex")
});

static EVENT_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(INSERT|UPDATE|DELETE|TRUNCATE)\b").expect("valid regex"));
static UPDATE_OF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\bOF\s+[^;]+?(?:\s+OR\s+|$)").expect("valid regex"));

static FOR_EACH_ROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bFOR\s+EACH\s+ROW\b").expect("valid regex"));

/// Optional `FOLLOWS|PRECEDES other` clause, then an optional `BEGIN`
static ROW_BODY_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?is)^\s*(?:(?:FOLLOWS|PRECEDES)\s+{}\s*)?(BEGIN\b)?",
        qualified()
    ))
    .expect("valid regex")
});

/// Words that open or close a compound block. `END IF`, `END LOOP` and the
/// like close nothing counted here.
static BLOCK_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:BEGIN|CASE|END(?:\s+(?:IF|LOOP|WHILE|REPEAT|CASE)\b)?)\b")
        .expect("valid regex")
});

/// Triggers found by the header patterns, with the byte offsets they matched
#[derive(Debug, Clone, Default)]
pub struct TriggerScan {
    pub triggers: Vec<CreateTriggerOperation>,
    /// Start offsets of PostgreSQL-shaped matches
    pub postgres_offsets: BTreeSet<usize>,
    /// Start offsets of MySQL-shaped matches
    pub mysql_offsets: BTreeSet<usize>,
}

impl TriggerScan {
    /// Whether a pattern matched inside `[start, end)`
    pub fn covers(&self, start: usize, end: usize) -> bool {
        self.postgres_offsets
            .range(start..end)
            .next()
            .or_else(|| self.mysql_offsets.range(start..end).next())
            .is_some()
    }
}

/// Scan the full file text for PostgreSQL and MySQL trigger headers.
///
/// A MySQL match starting where a PostgreSQL match already started is the
/// same trigger and is skipped.
pub fn extract_triggers(source: &str) -> TriggerScan {
    let mut scan = TriggerScan::default();

    for caps in PG_TRIGGER.captures_iter(source) {
        let Some(whole) = caps.get(0) else { continue };
        scan.postgres_offsets.insert(whole.start());
        if let Some(trigger) = postgres_trigger(source, &caps, whole.start()) {
            trace!(trigger = %trigger.trigger_name, "matched PostgreSQL trigger");
            scan.triggers.push(trigger);
        }
    }

    let headers: Vec<usize> = ANY_TRIGGER_HEADER
        .find_iter(source)
        .map(|m| m.start())
        .collect();
    for caps in MYSQL_TRIGGER.captures_iter(source) {
        let Some(whole) = caps.get(0) else { continue };
        if scan.postgres_offsets.contains(&whole.start()) {
            continue;
        }
        scan.mysql_offsets.insert(whole.start());
        let tail_end = headers
            .iter()
            .copied()
            .find(|&h| h > whole.start())
            .unwrap_or(source.len());
        let tail = &source[whole.end()..tail_end];
        if let Some(trigger) = mysql_trigger(&caps, tail) {
            trace!(trigger = %trigger.trigger_name, "matched MySQL trigger");
            scan.triggers.push(trigger);
        }
    }
    scan
}

fn postgres_trigger(
    source: &str,
    caps: &Captures<'_>,
    start: usize,
) -> Option<CreateTriggerOperation> {
    let mut trigger = header(caps, 2, 3, 5)?;
    trigger.or_replace = caps.get(1).is_some();
    trigger.events = postgres_events(caps.get(4)?.as_str());

    let trailing = &source[start..];
    if let Some(call) = EXECUTE_CALL.captures(trailing) {
        let name = call.get(2).and_then(|m| names::normalize_function_name_chain(m.as_str()));
        if let Some(name) = name {
            let calls = trigger.calls_mut();
            if call[1].eq_ignore_ascii_case("FUNCTION") {
                calls.functions.insert(name);
            } else {
                calls.procedures.insert(name);
            }
        }
    }
    Some(trigger)
}

fn mysql_trigger(caps: &Captures<'_>, tail: &str) -> Option<CreateTriggerOperation> {
    let mut trigger = header(caps, 1, 2, 4)?;
    trigger.events = vec![caps.get(3)?.as_str().to_ascii_uppercase()];
    match mysql_body(tail) {
        Some(body) => {
            let analysis = ProceduralBodyAnalyzer::mysql().analyze(body);
            trigger.absorb(analysis);
        }
        None => debug!(trigger = %trigger.trigger_name, "no body located for MySQL trigger"),
    }
    Some(trigger)
}

/// Build the common header fields from capture group indexes
fn header(
    caps: &Captures<'_>,
    name: usize,
    timing: usize,
    table: usize,
) -> Option<CreateTriggerOperation> {
    let (_, trigger_name) = caps
        .get(name)
        .and_then(|m| names::normalize_identifier_chain(m.as_str()))
        .as_deref()
        .and_then(names::split_schema_and_name)?;
    let (schema, table_name) = caps
        .get(table)
        .and_then(|m| names::normalize_identifier_chain(m.as_str()))
        .as_deref()
        .and_then(names::split_schema_and_name)?;
    let timing = TriggerTiming::normalize(caps.get(timing)?.as_str())?;
    Some(CreateTriggerOperation {
        trigger_name,
        table_name,
        schema,
        or_replace: false,
        timing,
        events: Vec::new(),
        references: SqlReferences::default(),
        calls: SqlInvocations::default(),
    })
}

/// `INSERT OR UPDATE OF a, b OR DELETE` → `[INSERT, UPDATE, DELETE]`
fn postgres_events(raw: &str) -> Vec<String> {
    let without_columns = UPDATE_OF.replace_all(raw, " OR ");
    let mut events: Vec<String> = Vec::new();
    for m in EVENT_WORD.find_iter(&without_columns) {
        let event = m.as_str().to_ascii_uppercase();
        if !events.contains(&event) {
            events.push(event);
        }
    }
    events
}

/// Locate a MySQL trigger body in the text after its header.
///
/// A `BEGIN` right after `FOR EACH ROW` opens a block that runs to its
/// matching `END`, whatever follows it. Without one, the body is the
/// single statement after `FOR EACH ROW`. Bodies are trimmed.
fn mysql_body(tail: &str) -> Option<&str> {
    let row = FOR_EACH_ROW.find(tail)?;
    let rest = &tail[row.end()..];
    let start = ROW_BODY_START.captures(rest)?;
    let body = match start.get(1) {
        Some(begin) => {
            let end = matching_end(rest, begin.end())?;
            &rest[begin.end()..end]
        }
        None => {
            let rest = &rest[start.get(0)?.end()..];
            let end = [rest.find(';'), rest.find("$$")]
                .into_iter()
                .flatten()
                .min()
                .unwrap_or(rest.len());
            &rest[..end]
        }
    };
    let body = body.trim();
    (!body.is_empty()).then_some(body)
}

/// Offset of the `END` closing a block whose `BEGIN` ends at `from`
fn matching_end(text: &str, from: usize) -> Option<usize> {
    let mut depth = 1usize;
    for word in BLOCK_WORD.find_iter(&text[from..]) {
        let upper = word.as_str().to_ascii_uppercase();
        if upper == "BEGIN" || upper == "CASE" {
            depth += 1;
        } else if upper == "END" || upper.ends_with("CASE") {
            depth -= 1;
            if depth == 0 {
                return Some(from + word.start());
            }
        }
    }
    None
}
