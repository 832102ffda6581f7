//! Statement splitting that keeps routine bodies whole

use super::block_delta;
use super::scanner::{scan_script, Lexeme, LexemeKind};

/// One top-level statement of a script, terminator excluded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawStatement<'a> {
    pub text: &'a str,
    /// Byte offset of `text` in the script
    pub offset: usize,
}

/// Split a script into statements.
///
/// `;` only ends a statement outside blocks, parentheses and pending
/// routine bodies. A custom `DELIMITER`, a `GO` line and a `/` line always
/// end the current statement.
pub fn split_statements(src: &str) -> Vec<RawStatement<'_>> {
    let lexemes = scan_script(src);
    let mut statements = Vec::new();
    let mut state = SplitState::default();
    let mut custom_delimiter = false;

    for i in 0..lexemes.len() {
        let lexeme = &lexemes[i];
        match lexeme.kind {
            LexemeKind::Directive => {
                if let Some(delim) = delimiter_directive(lexeme.text) {
                    custom_delimiter = delim != ";";
                }
                state.flush(src, &lexemes, &mut statements);
                continue;
            }
            LexemeKind::Delimiter => {
                state.flush(src, &lexemes, &mut statements);
                continue;
            }
            _ => {}
        }
        if lexeme.is_symbol(b';') && !custom_delimiter && state.can_split() {
            state.flush(src, &lexemes, &mut statements);
            continue;
        }
        state.observe(&lexemes, i);
    }
    state.flush(src, &lexemes, &mut statements);
    statements
}

fn delimiter_directive(text: &str) -> Option<&str> {
    let mut parts = text.split_whitespace();
    let first = parts.next()?;
    if first.eq_ignore_ascii_case("delimiter") {
        parts.next()
    } else {
        None
    }
}

const ROUTINE_WORDS: &[&str] = &["PROCEDURE", "PROC", "FUNCTION", "TRIGGER"];
const NON_ROUTINE_WORDS: &[&str] = &["TABLE", "VIEW", "INDEX", "SEQUENCE", "SCHEMA", "DATABASE"];
const HEADER_WINDOW: usize = 10;

#[derive(Debug, Default)]
struct SplitState {
    first: Option<usize>,
    last: usize,
    count: usize,
    depth: u32,
    parens: u32,
    awaiting_body: bool,
    routine: bool,
    package: bool,
    package_opened: bool,
    header_done: bool,
}

impl SplitState {
    fn can_split(&self) -> bool {
        self.depth == 0 && self.parens == 0 && !self.awaiting_body
    }

    fn observe(&mut self, lexemes: &[Lexeme<'_>], i: usize) {
        let lexeme = &lexemes[i];
        let index = self.count;
        self.first.get_or_insert(i);
        self.last = i;
        self.count += 1;

        if index < HEADER_WINDOW && !self.header_done {
            self.observe_header(lexemes, i, index);
        }

        if lexeme.is_symbol(b'(') {
            self.parens += 1;
        } else if lexeme.is_symbol(b')') {
            self.parens = self.parens.saturating_sub(1);
        }

        match block_delta(lexemes, i) {
            1 => self.depth += 1,
            -1 if self.depth > 0 => {
                self.depth -= 1;
                if self.depth == 0 {
                    self.awaiting_body = false;
                }
            }
            _ => {}
        }

        let next = lexemes.get(i + 1);
        let prev = i.checked_sub(1).and_then(|p| lexemes.get(p));
        let next_is_word = next.is_some_and(|n| n.kind == LexemeKind::Word);

        if self.routine
            && self.parens == 0
            && lexeme.is_any_word(&["IS", "AS"])
            && !prev.is_some_and(|p| p.is_word("EXECUTE"))
            && next_is_word
        {
            if self.package && !self.package_opened {
                self.package_opened = true;
                self.depth += 1;
            } else if self.depth == 0 {
                self.awaiting_body = true;
            }
        }

        if lexeme.is_word("DECLARE")
            && self.depth == 0
            && (index == 0 || self.routine)
            && next.is_some_and(|n| n.kind == LexemeKind::Word && !n.text.starts_with('@'))
        {
            self.awaiting_body = true;
        }
    }

    fn observe_header(&mut self, lexemes: &[Lexeme<'_>], i: usize, index: usize) {
        let lexeme = &lexemes[i];
        if index == 0 {
            if !lexeme.is_any_word(&["CREATE", "ALTER"]) {
                self.header_done = true;
            }
            return;
        }
        if lexeme.is_symbol(b'(') || lexeme.is_any_word(NON_ROUTINE_WORDS) {
            self.header_done = true;
        } else if lexeme.is_any_word(ROUTINE_WORDS) {
            self.routine = true;
            self.header_done = true;
        } else if lexeme.is_word("PACKAGE")
            || (lexeme.is_word("TYPE") && lexemes.get(i + 1).is_some_and(|n| n.is_word("BODY")))
        {
            self.routine = true;
            self.package = true;
            self.header_done = true;
        }
    }

    fn flush<'a>(
        &mut self,
        src: &'a str,
        lexemes: &[Lexeme<'a>],
        statements: &mut Vec<RawStatement<'a>>,
    ) {
        if let Some(first) = self.first {
            let start = lexemes[first].start;
            let end = lexemes[self.last].end;
            statements.push(RawStatement {
                text: &src[start..end],
                offset: start,
            });
        }
        *self = SplitState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn texts(src: &str) -> Vec<&str> {
        split_statements(src).into_iter().map(|s| s.text).collect()
    }

    #[test]
    fn test_split_simple_statements() {
        assert_eq!(
            texts("SELECT 1; SELECT 'a;b';\n-- done;\n"),
            vec!["SELECT 1", "SELECT 'a;b'"]
        );
    }

    #[test]
    fn test_offsets_point_into_source() {
        let src = "SELECT 1;\n  UPDATE t SET a = 1;";
        let stmts = split_statements(src);
        assert_eq!(stmts[1].offset, 12);
        assert_eq!(&src[stmts[1].offset..stmts[1].offset + 6], "UPDATE");
    }

    #[test]
    fn test_plsql_routine_kept_whole() {
        let src = "CREATE OR REPLACE PROCEDURE p IS\n  v NUMBER;\nBEGIN\n  IF v > 0 THEN\n    NULL;\n  END IF;\nEND p;\n/\nSELECT 1 FROM dual;";
        let stmts = texts(src);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].ends_with("END p"));
        assert_eq!(stmts[1], "SELECT 1 FROM dual");
    }

    #[test]
    fn test_mysql_delimiter_blocks() {
        let src = "DELIMITER $$\nCREATE PROCEDURE p()\nBEGIN\n  SELECT 1;\n  SELECT 2;\nEND$$\nDELIMITER ;\nSELECT 3;";
        let stmts = texts(src);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].starts_with("CREATE PROCEDURE p()"));
        assert!(stmts[0].ends_with("END"));
        assert_eq!(stmts[1], "SELECT 3");
    }

    #[test]
    fn test_tsql_go_batches() {
        let src = "CREATE PROCEDURE dbo.p AS\nSET NOCOUNT ON;\nSELECT * FROM dbo.t;\nGO\nEXEC dbo.p;\n";
        let stmts = texts(src);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].contains("SELECT * FROM dbo.t"));
        assert_eq!(stmts[1], "EXEC dbo.p");
    }

    #[test]
    fn test_package_body_kept_whole() {
        let src = "CREATE OR REPLACE PACKAGE BODY pkg AS\n  PROCEDURE a IS BEGIN NULL; END a;\n  FUNCTION b RETURN NUMBER IS BEGIN RETURN 1; END b;\nEND pkg;\nSELECT 1 FROM dual;";
        let stmts = texts(src);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].ends_with("END pkg"));
    }

    #[test]
    fn test_dollar_quoted_function_and_transaction() {
        let src = "BEGIN;\nCREATE FUNCTION f() RETURNS int AS $$ BEGIN RETURN 1; END; $$ LANGUAGE plpgsql;\nCOMMIT;";
        assert_eq!(
            texts(src),
            vec![
                "BEGIN",
                "CREATE FUNCTION f() RETURNS int AS $$ BEGIN RETURN 1; END; $$ LANGUAGE plpgsql",
                "COMMIT"
            ]
        );
    }

    #[test]
    fn test_anonymous_declare_block() {
        let src = "DECLARE\n  n NUMBER;\nBEGIN\n  pkg.run(n);\nEND;\n/\n";
        let stmts = texts(src);
        assert_eq!(stmts.len(), 1);
        assert!(stmts[0].starts_with("DECLARE"));
    }

    #[test]
    fn test_case_expression_does_not_leak_depth() {
        let src = "SELECT CASE WHEN a THEN 1 ELSE 0 END FROM t; SELECT 2;";
        assert_eq!(texts(src).len(), 2);
    }
}
