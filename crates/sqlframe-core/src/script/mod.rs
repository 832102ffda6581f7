//! Script lexing, statement splitting and statement classification

pub mod scanner;
mod splitter;

pub use scanner::{Lexeme, LexemeKind};
pub use splitter::{split_statements, RawStatement};

/// What a statement is, judged from its leading keywords
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    CreateTable,
    AlterTable,
    CreateView,
    AlterView,
    CreateIndex,
    Drop,
    Routine { kind: RoutineKind, alter: bool },
    /// `ALTER TRIGGER` and similar statements that are recognized but skipped
    Unsupported,
    Trigger,
    PackageBody,
    PackageSpec,
    AnonymousBlock,
    /// Standalone DML or a call
    Dml,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutineKind {
    Procedure,
    Function,
}

const DML_WORDS: &[&str] = &[
    "SELECT", "INSERT", "UPDATE", "DELETE", "MERGE", "WITH", "CALL", "EXEC", "EXECUTE", "VALUES",
];

/// Leading words that never start a call or DML
const OTHER_WORDS: &[&str] = &[
    "SET", "USE", "GRANT", "REVOKE", "COMMENT", "COMMIT", "ROLLBACK", "SAVEPOINT", "PRINT",
    "RAISERROR", "ANALYZE", "VACUUM", "SHOW", "DESCRIBE", "DESC", "EXPLAIN", "LOCK", "START",
    "PROMPT", "SPOOL", "WHENEVER", "CONNECT", "TRUNCATE", "RENAME", "REINDEX", "CLUSTER",
    "COPY", "LISTEN", "NOTIFY", "DISCARD", "RESET", "CHECKPOINT", "DO", "PREPARE", "DEALLOCATE",
    "FLUSH", "OPTIMIZE", "REPAIR", "LOAD", "SOURCE", "DBCC", "BACKUP", "RESTORE", "NULL",
    "END", "RETURN", "EXIT", "PRAGMA",
];

const CREATE_OBJECT_WORDS: &[&str] = &[
    "TABLE", "VIEW", "INDEX", "PROCEDURE", "PROC", "FUNCTION", "TRIGGER", "PACKAGE",
    "MATERIALIZED", "TYPE", "SEQUENCE", "SCHEMA", "DATABASE", "EVENT", "EXTENSION", "ROLE",
    "USER", "DOMAIN", "SYNONYM", "TABLESPACE", "POLICY", "RULE",
];

/// Classify a statement from its lexemes
pub fn classify(lexemes: &[Lexeme<'_>]) -> StatementKind {
    let Some(first) = lexemes.first() else {
        return StatementKind::Other;
    };

    if first.is_word("CREATE") {
        return match object_word(lexemes) {
            Some((i, word)) => match word.as_str() {
                "TABLE" => StatementKind::CreateTable,
                "VIEW" | "MATERIALIZED" => StatementKind::CreateView,
                "INDEX" => StatementKind::CreateIndex,
                "PROCEDURE" | "PROC" => StatementKind::Routine {
                    kind: RoutineKind::Procedure,
                    alter: false,
                },
                "FUNCTION" => StatementKind::Routine {
                    kind: RoutineKind::Function,
                    alter: false,
                },
                "TRIGGER" => StatementKind::Trigger,
                "PACKAGE" if lexemes.get(i + 1).is_some_and(|l| l.is_word("BODY")) => {
                    StatementKind::PackageBody
                }
                "PACKAGE" => StatementKind::PackageSpec,
                _ => StatementKind::Other,
            },
            None => StatementKind::Other,
        };
    }

    if first.is_word("ALTER") {
        return match object_word(lexemes).map(|(_, w)| w) {
            Some(word) => match word.as_str() {
                "TABLE" => StatementKind::AlterTable,
                "VIEW" => StatementKind::AlterView,
                "PROCEDURE" | "PROC" => StatementKind::Routine {
                    kind: RoutineKind::Procedure,
                    alter: true,
                },
                "FUNCTION" => StatementKind::Routine {
                    kind: RoutineKind::Function,
                    alter: true,
                },
                "TRIGGER" | "PACKAGE" | "INDEX" | "MATERIALIZED" => StatementKind::Unsupported,
                _ => StatementKind::Other,
            },
            None => StatementKind::Other,
        };
    }

    if first.is_word("DROP") {
        return StatementKind::Drop;
    }
    if first.is_word("BEGIN") {
        let transaction = lexemes.get(1).map_or(true, |l| {
            l.is_any_word(&["TRAN", "TRANSACTION", "WORK", "ISOLATION", "DISTRIBUTED"])
        });
        return if transaction {
            StatementKind::Other
        } else {
            StatementKind::AnonymousBlock
        };
    }
    if first.is_word("DECLARE") {
        return StatementKind::AnonymousBlock;
    }
    if first.is_any_word(DML_WORDS) || first.is_symbol(b'(') {
        return StatementKind::Dml;
    }
    if first.is_name() && !first.is_any_word(OTHER_WORDS) {
        // `pkg.proc(1)` or `proc;` as a bare call
        let callish = match lexemes.get(1) {
            None => true,
            Some(next) => next.is_symbol(b'.') || next.is_symbol(b'(') || next.is_symbol(b'@'),
        };
        if callish {
            return StatementKind::Dml;
        }
    }
    StatementKind::Other
}

fn object_word(lexemes: &[Lexeme<'_>]) -> Option<(usize, String)> {
    lexemes
        .iter()
        .enumerate()
        .skip(1)
        .take(16)
        .find(|(_, l)| l.is_any_word(CREATE_OBJECT_WORDS))
        .map(|(i, l)| (i, l.upper()))
}

const NON_BLOCK_AFTER_BEGIN: &[&str] = &[
    "TRAN", "TRANSACTION", "WORK", "ISOLATION", "DEFERRED", "IMMEDIATE", "EXCLUSIVE",
    "DISTRIBUTED",
];
const END_WITHOUT_CLOSE: &[&str] = &["IF", "LOOP", "WHILE", "REPEAT", "FOR"];

/// Block nesting change contributed by lexeme `i`: `+1` for a block-opening
/// `BEGIN` or `CASE`, `-1` for a closing `END`, `0` otherwise.
///
/// `END IF`/`END LOOP` style closers do not count, since their openers are
/// not counted either.
pub(crate) fn block_delta(lexemes: &[Lexeme<'_>], i: usize) -> i32 {
    let Some(lexeme) = lexemes.get(i) else {
        return 0;
    };
    let next = lexemes.get(i + 1);
    let prev = i.checked_sub(1).and_then(|p| lexemes.get(p));

    if lexeme.is_word("BEGIN") {
        return match next {
            Some(n)
                if n.is_symbol(b';')
                    || n.is_boundary()
                    || n.is_any_word(NON_BLOCK_AFTER_BEGIN) =>
            {
                0
            }
            Some(_) => 1,
            None => 0,
        };
    }
    if lexeme.is_word("CASE") {
        return if prev.is_some_and(|p| p.is_word("END")) { 0 } else { 1 };
    }
    if lexeme.is_word("END") {
        return if next.is_some_and(|n| n.is_any_word(END_WITHOUT_CLOSE)) {
            0
        } else {
            -1
        };
    }
    0
}

#[cfg(test)]
mod tests {
    use super::scanner::tokenize;
    use super::*;

    fn kind(sql: &str) -> StatementKind {
        classify(&tokenize(sql))
    }

    #[test]
    fn test_classify_ddl() {
        assert_eq!(kind("CREATE TABLE t (id INT)"), StatementKind::CreateTable);
        assert_eq!(
            kind("CREATE UNIQUE NONCLUSTERED INDEX ix ON t (a)"),
            StatementKind::CreateIndex
        );
        assert_eq!(
            kind("CREATE MATERIALIZED VIEW mv AS SELECT 1"),
            StatementKind::CreateView
        );
        assert_eq!(kind("ALTER TABLE t ADD c INT"), StatementKind::AlterTable);
        assert_eq!(kind("DROP TABLE IF EXISTS t"), StatementKind::Drop);
    }

    #[test]
    fn test_classify_routines() {
        assert_eq!(
            kind("CREATE OR ALTER PROC dbo.p AS SELECT 1"),
            StatementKind::Routine {
                kind: RoutineKind::Procedure,
                alter: false
            }
        );
        assert_eq!(
            kind("CREATE DEFINER=`root`@`%` FUNCTION f() RETURNS INT RETURN 1"),
            StatementKind::Routine {
                kind: RoutineKind::Function,
                alter: false
            }
        );
        assert_eq!(
            kind("ALTER FUNCTION f() RENAME TO g"),
            StatementKind::Routine {
                kind: RoutineKind::Function,
                alter: true
            }
        );
        assert_eq!(kind("CREATE PACKAGE BODY pkg AS END;"), StatementKind::PackageBody);
        assert_eq!(kind("CREATE PACKAGE pkg AS END;"), StatementKind::PackageSpec);
        assert_eq!(kind("CREATE TRIGGER t ON x AFTER INSERT AS SELECT 1"), StatementKind::Trigger);
    }

    #[test]
    fn test_classify_top_level() {
        assert_eq!(kind("HR.ORDER_PKG.PROCESS(1001)"), StatementKind::Dml);
        assert_eq!(kind("log_start"), StatementKind::Dml);
        assert_eq!(kind("EXEC dbo.p"), StatementKind::Dml);
        assert_eq!(kind("BEGIN pkg.run; END"), StatementKind::AnonymousBlock);
        assert_eq!(kind("BEGIN TRANSACTION"), StatementKind::Other);
        assert_eq!(kind("SET NOCOUNT ON"), StatementKind::Other);
        assert_eq!(kind("COMMIT"), StatementKind::Other);
    }

    #[test]
    fn test_block_delta() {
        let lexemes = tokenize("BEGIN IF a THEN NULL; END IF; CASE x WHEN 1 THEN 2 END CASE; END");
        let total: i32 = (0..lexemes.len()).map(|i| block_delta(&lexemes, i)).sum();
        assert_eq!(total, 0);
    }
}
