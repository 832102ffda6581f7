//! Marker-based dialect detection for text no grammar accepted

use regex::Regex;
use std::sync::LazyLock;

use super::SqlDialect;

static GO_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^go(?:\s+\d+)?$").expect("valid regex"));
static EXEC_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bexec(?:ute)?\b").expect("valid regex"));
static NOT_TSQL_EXEC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:immediate|function|procedure|format\s*\()").expect("valid regex")
});
static BEGIN_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\bbegin\b.*\bend\b").expect("valid regex"));
static MYSQL_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^delimiter\s+\S+|\bengine\s*=|\bend\s*\$\$|\bauto_increment\b|`)")
        .expect("valid regex")
});
static PG_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\blanguage\s+'?plpgsql\b|\$[A-Za-z_]*\$)").expect("valid regex")
});

/// Guess the dialect of `text` from dialect-only syntax.
///
/// Comment lines and blank lines are ignored. Precedence is fixed:
/// T-SQL, then PL/SQL, then MySQL, then PostgreSQL. Returns `None` when no
/// marker is present.
pub fn detect_dialect(text: &str) -> Option<SqlDialect> {
    let lines = content_lines(text);
    if lines.is_empty() {
        return None;
    }

    if lines.iter().any(|line| is_tsql_line(line)) {
        return Some(SqlDialect::TSql);
    }

    if lines.iter().any(|line| *line == "/") {
        return Some(SqlDialect::PlSql);
    }
    let joined = lines.join("\n");
    let lower = joined.to_lowercase();
    if lower.contains("create or replace")
        && BEGIN_END.is_match(&lower)
        && lower.trim_end().ends_with('/')
    {
        return Some(SqlDialect::PlSql);
    }

    if lines.iter().any(|line| MYSQL_MARKER.is_match(line)) {
        return Some(SqlDialect::MySQL);
    }
    if lines.iter().any(|line| PG_MARKER.is_match(line)) {
        return Some(SqlDialect::PostgreSQL);
    }
    None
}

fn is_tsql_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    if lower.contains("create or alter") || GO_LINE.is_match(line) {
        return true;
    }
    EXEC_WORD.find_iter(line).any(|m| {
        let rest = &line[m.end()..];
        !rest.trim().is_empty() && !NOT_TSQL_EXEC.is_match(rest)
    })
}

/// Trimmed non-blank lines that are not comments.
fn content_lines(text: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut in_block = false;
    for raw in text.lines() {
        let line = raw.trim();
        if in_block {
            if line.contains("*/") {
                in_block = false;
            }
            continue;
        }
        if line.is_empty() || line.starts_with("--") || is_hash_comment(line) {
            continue;
        }
        if line.starts_with("/*") {
            in_block = !line[2..].contains("*/");
            continue;
        }
        lines.push(line);
    }
    lines
}

// `#tmp` is a T-SQL temp table, `# note` is a MySQL comment
fn is_hash_comment(line: &str) -> bool {
    let mut chars = line.chars();
    chars.next() == Some('#') && chars.next().map_or(true, |c| c.is_whitespace() || c == '#')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_tsql_create_or_alter() {
        let sql = "CREATE OR ALTER PROCEDURE dbo.p AS BEGIN SELECT 1 END";
        assert_eq!(detect_dialect(sql), Some(SqlDialect::TSql));
    }

    #[test]
    fn test_detect_tsql_go_line() {
        let sql = "CREATE TABLE t (id INT)\nGO\n";
        assert_eq!(detect_dialect(sql), Some(SqlDialect::TSql));
        assert_eq!(detect_dialect("SELECT 1\ngo 5\n"), Some(SqlDialect::TSql));
    }

    #[test]
    fn test_detect_tsql_exec() {
        assert_eq!(
            detect_dialect("EXEC dbo.usp_load @id = 1"),
            Some(SqlDialect::TSql)
        );
    }

    #[test]
    fn test_execute_function_clause_is_not_tsql() {
        let sql = "CREATE TRIGGER t AFTER INSERT ON x\nFOR EACH ROW EXECUTE FUNCTION f();";
        assert_eq!(detect_dialect(sql), None);
    }

    #[test]
    fn test_execute_immediate_is_plsql() {
        let sql = "BEGIN\n  EXECUTE IMMEDIATE 'DROP TABLE t';\nEND;\n/\n";
        assert_eq!(detect_dialect(sql), Some(SqlDialect::PlSql));
    }

    #[test]
    fn test_detect_plsql_slash_line() {
        let sql = "CREATE OR REPLACE PROCEDURE p IS\nBEGIN\n  NULL;\nEND;\n/";
        assert_eq!(detect_dialect(sql), Some(SqlDialect::PlSql));
    }

    #[test]
    fn test_tsql_wins_over_plsql() {
        let sql = "CREATE OR ALTER PROCEDURE p AS SELECT 1;\n/\n";
        assert_eq!(detect_dialect(sql), Some(SqlDialect::TSql));
    }

    #[test]
    fn test_comment_lines_are_skipped() {
        let sql = "-- EXEC dbo.old\n/* GO\nexec x */\n# exec y\nSELECT 1;";
        assert_eq!(detect_dialect(sql), None);
    }

    #[test]
    fn test_detect_mysql_and_postgres_markers() {
        assert_eq!(
            detect_dialect("DELIMITER $$\nCREATE PROCEDURE p() BEGIN END$$"),
            Some(SqlDialect::MySQL)
        );
        assert_eq!(
            detect_dialect("CREATE FUNCTION f() RETURNS int AS $$ SELECT 1 $$ LANGUAGE sql;"),
            Some(SqlDialect::PostgreSQL)
        );
    }

    #[test]
    fn test_no_markers() {
        assert_eq!(detect_dialect("SELECT * FROM users;"), None);
        assert_eq!(detect_dialect(""), None);
    }
}
