//! Token-level reference harvesting for fragments no grammar accepts

use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Token, Word};
use tracing::trace;

use super::ReferenceCollector;
use crate::names;

/// Dialect-dependent harvesting switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarvestRules {
    /// A bare `pkg.proc;` statement is a procedure call (PL/SQL)
    pub bare_calls: bool,
}

/// Words that end a relation list and can never be an alias or relation
const RESERVED: &[&str] = &[
    "SELECT", "FROM", "WHERE", "JOIN", "INNER", "LEFT", "RIGHT", "FULL", "CROSS", "OUTER",
    "NATURAL", "ON", "USING", "GROUP", "ORDER", "HAVING", "LIMIT", "OFFSET", "FETCH", "UNION",
    "EXCEPT", "INTERSECT", "MINUS", "WINDOW", "SET", "VALUES", "FOR", "WITH", "INTO", "RETURNING",
    "LATERAL", "APPLY", "PIVOT", "UNPIVOT", "WHEN", "THEN", "ELSE", "END", "AND", "OR", "NOT",
    "OPTION", "LOOP", "BEGIN", "IF", "AS", "OF", "DEFAULT", "OUTPUT", "TOP", "DISTINCT", "ALL",
    "NULL", "IS", "IN", "EXISTS", "CASE", "CONNECT", "START", "MODEL", "QUALIFY", "WHILE",
    "DECLARE", "RETURN", "ELSIF", "EXCEPTION", "OVERWRITE", "IGNORE", "TABLESAMPLE", "LOCK",
    "PARTITION", "USE", "FORCE", "SELECT", "DO", "INSTEAD", "BEFORE", "AFTER", "EACH", "ROW",
];

/// Words followed by `(` that are syntax, not calls
const SYNTAX_BEFORE_PAREN: &[&str] = &[
    "IN", "EXISTS", "VALUES", "AS", "IF", "ELSIF", "WHILE", "RETURNS", "RETURN", "ON", "USING",
    "INTO", "TABLE", "KEY", "REFERENCES", "CHECK", "PRIMARY", "UNIQUE", "FOREIGN", "CONSTRAINT",
    "OVER", "FILTER", "WITHIN", "AND", "OR", "NOT", "WHEN", "THEN", "ELSE", "SELECT", "FROM",
    "WHERE", "JOIN", "SET", "DEFAULT", "ANY", "ALL", "SOME", "CAST", "TRY_CAST", "CONVERT",
    "EXTRACT", "SUBSTRING", "TRIM", "POSITION", "OVERLAY", "INTERVAL", "ROW", "ARRAY", "BY",
    "OF", "LIKE", "BETWEEN", "IS", "CASE", "UNION", "EXCEPT", "INTERSECT", "LIMIT", "TOP",
    "OUTPUT", "WITH", "FOR", "LOOP", "BEGIN", "DECLARE", "CURSOR", "OPEN", "FETCH", "PERFORM",
    "RAISE", "SIGNAL", "PARTITION", "OPTION", "IDENTITY", "RECORD", "EXEC", "EXECUTE", "CALL",
    "SETOF", "VARYING", "PRECISION", "INSERT", "UPDATE", "DELETE", "MERGE", "USE", "AT", "ZONE",
];

/// Words before which a statement may start
const STATEMENT_LEADERS: &[&str] = &["BEGIN", "THEN", "ELSE", "LOOP", "AS"];

/// Keywords that introduce a definition name which must not be read as a call
const DEFINITION_WORDS: &[&str] = &[
    "TABLE", "VIEW", "INDEX", "PROCEDURE", "FUNCTION", "TRIGGER", "TYPE", "PACKAGE", "SEQUENCE",
    "REFERENCES", "CURSOR",
];

/// Harvest relations and calls from a token stream into `out`.
pub fn harvest(tokens: &[Token], rules: HarvestRules, out: &mut ReferenceCollector) {
    let tokens: Vec<&Token> = tokens
        .iter()
        .filter(|t| !matches!(t, Token::Whitespace(_)))
        .collect();
    Harvester::new(&tokens, rules, out).run();
}

struct Harvester<'t, 'o> {
    tokens: &'t [&'t Token],
    in_plain_parens: Vec<bool>,
    rules: HarvestRules,
    out: &'o mut ReferenceCollector,
    merge_seen: bool,
}

impl<'t, 'o> Harvester<'t, 'o> {
    fn new(tokens: &'t [&'t Token], rules: HarvestRules, out: &'o mut ReferenceCollector) -> Self {
        Self {
            in_plain_parens: plain_paren_flags(tokens),
            tokens,
            rules,
            out,
            merge_seen: false,
        }
    }

    fn run(&mut self) {
        let mut i = 0;
        while i < self.tokens.len() {
            i = self.step(i);
        }
    }

    /// Handle the token at `i`, returning the next index to look at
    fn step(&mut self, i: usize) -> usize {
        let token = self.tokens[i];
        if matches!(token, Token::SemiColon) {
            self.merge_seen = false;
            return i + 1;
        }
        if matches!(token, Token::Comma) {
            self.cte_at(i);
            return i + 1;
        }
        let Some(word) = plain_word(token) else {
            return i + 1;
        };
        let upper = word.value.to_ascii_uppercase();

        match upper.as_str() {
            "FROM" => {
                if self.in_plain_parens[i] || self.prev_is(i, "DISTINCT") {
                    return i + 1;
                }
                return self.table_list(i + 1, true);
            }
            "JOIN" => return self.table_list(i + 1, false),
            "UPDATE" | "DELETE" | "INSERT" | "MERGE" | "REPLACE" => {
                return self.dml_target(i, &upper);
            }
            "USING" if self.merge_seen => return self.table_list(i + 1, false),
            "CALL" => {
                if let Some((name, next)) = self.chain(i + 1) {
                    trace!(procedure = %name, "harvested CALL");
                    self.out.add_procedure(&name);
                    return next;
                }
                return i + 1;
            }
            "EXEC" | "EXECUTE" => return self.exec(i),
            "WITH" => {
                self.cte_at(i);
                return i + 1;
            }
            _ => {}
        }

        if DEFINITION_WORDS.contains(&upper.as_str()) {
            return match self.chain(i + 1) {
                Some((_, next)) => next,
                None => i + 1,
            };
        }

        self.call_at(i)
    }

    /// Calls: `chain(` anywhere, whole-statement `chain(args)` and bare
    /// `chain;` at statement start
    fn call_at(&mut self, i: usize) -> usize {
        let Some((name, next)) = self.chain(i) else {
            return i + 1;
        };
        let single_part = !name.contains('.');
        let first_word = plain_word(self.tokens[i]);
        let followed_by_paren = matches!(self.tokens.get(next), Some(Token::LParen));

        if self.at_statement_start(i) {
            if followed_by_paren {
                let close = matching_paren(self.tokens, next);
                if close.map_or(false, |c| self.ends_statement(c + 1))
                    && !(single_part && first_word.is_some_and(is_syntax_word))
                {
                    trace!(procedure = %name, "harvested statement call");
                    self.out.add_procedure(&name);
                    return next;
                }
            } else if self.rules.bare_calls && self.ends_statement(next) {
                let keyword = first_word.is_some_and(|w| w.keyword != Keyword::NoKeyword);
                if !single_part || !keyword {
                    trace!(procedure = %name, "harvested bare call");
                    self.out.add_procedure(&name);
                    return next;
                }
            }
        }

        if followed_by_paren {
            let syntax = single_part
                && first_word
                    .is_some_and(|w| is_syntax_word(w) || names::is_sql_type_name(&w.value));
            if !syntax {
                trace!(function = %name, "harvested call expression");
                self.out.add_function(&name);
            }
        }
        next
    }

    fn dml_target(&mut self, i: usize, upper: &str) -> usize {
        // `FOR UPDATE`, `ON DELETE CASCADE`, `AFTER INSERT OR UPDATE`
        if self.prev_in(i, &["FOR", "ON", "OR", "BEFORE", "AFTER", "OF", "INSTEAD"])
            || matches!(i.checked_sub(1).map(|p| self.tokens[p]), Some(Token::Comma))
        {
            return i + 1;
        }
        if upper == "MERGE" {
            self.merge_seen = true;
        }
        let mut j = i + 1;
        while self.word_in(j, &["INTO", "IGNORE", "OVERWRITE", "LOW_PRIORITY", "DELAYED", "ONLY"]) {
            j += 1;
        }
        if self.word_in(j, &["FROM"]) {
            return j;
        }
        if self.word_in(j, &["TOP"]) {
            j += 1;
            if matches!(self.tokens.get(j), Some(Token::LParen)) {
                j = matching_paren(self.tokens, j).map_or(j + 1, |c| c + 1);
            } else {
                j += 1;
            }
        }
        match self.relation_chain(j) {
            Some((name, next)) => {
                trace!(relation = %name, statement = upper, "harvested DML target");
                self.out.add_relation(&name);
                next
            }
            None => j,
        }
    }

    fn exec(&mut self, i: usize) -> usize {
        let j = i + 1;
        if self.word_in(j, &["IMMEDIATE"]) {
            return j + 1;
        }
        if self.word_in(j, &["AS"]) {
            return j + 1;
        }
        if self.word_in(j, &["FUNCTION", "PROCEDURE"]) {
            let is_function = self.word_in(j, &["FUNCTION"]);
            return match self.chain(j + 1) {
                Some((name, next)) => {
                    if is_function {
                        self.out.add_function(&name);
                    } else {
                        self.out.add_procedure(&name);
                    }
                    next
                }
                None => j + 1,
            };
        }

        let mut target = j;
        // EXEC @rc = dbo.proc
        if let (Some(Token::Word(w)), Some(Token::Eq)) =
            (self.tokens.get(j), self.tokens.get(j + 1))
        {
            if w.value.starts_with('@') {
                target = j + 2;
            }
        }
        if !self.out.execute_is_call() {
            return target;
        }
        match self.chain(target) {
            Some((name, next)) if !name.starts_with('@') => {
                trace!(procedure = %name, "harvested EXEC");
                self.out.add_procedure(&name);
                next
            }
            _ => target,
        }
    }

    /// Read `t [alias] [, t2 [alias]]...` after FROM, or a single table after
    /// JOIN.
    fn table_list(&mut self, mut i: usize, comma_list: bool) -> usize {
        loop {
            while self.word_in(i, &["LATERAL", "ONLY"]) {
                i += 1;
            }
            if matches!(self.tokens.get(i), Some(Token::LParen)) {
                return i;
            }
            let Some((name, next)) = self.relation_chain(i) else {
                return i;
            };
            if matches!(self.tokens.get(next), Some(Token::LParen)) {
                // table function
                self.out.add_function(&name);
                i = matching_paren(self.tokens, next).map_or(next + 1, |c| c + 1);
            } else {
                trace!(relation = %name, "harvested relation");
                self.out.add_relation(&name);
                i = next;
            }
            i = self.skip_alias(i);

            if comma_list && matches!(self.tokens.get(i), Some(Token::Comma)) {
                i += 1;
                continue;
            }
            return i;
        }
    }

    fn skip_alias(&self, mut i: usize) -> usize {
        if self.word_in(i, &["AS"]) {
            i += 1;
            if matches!(self.tokens.get(i), Some(Token::Word(_))) {
                i += 1;
            }
        } else if let Some(Token::Word(w)) = self.tokens.get(i) {
            if w.quote_style.is_some() || !is_reserved(w) {
                i += 1;
            }
        }
        // WITH (NOLOCK)
        if self.word_in(i, &["WITH"]) && matches!(self.tokens.get(i + 1), Some(Token::LParen)) {
            if let Some(close) = matching_paren(self.tokens, i + 1) {
                i = close + 1;
            }
        }
        i
    }

    /// `WITH name AS (` or `, name AS (` introduce a CTE
    fn cte_at(&mut self, i: usize) {
        let mut j = i + 1;
        if self.word_in(j, &["RECURSIVE"]) {
            j += 1;
        }
        if let (Some(Token::Word(w)), true, Some(Token::LParen)) = (
            self.tokens.get(j),
            self.word_in(j + 1, &["AS"]),
            self.tokens.get(j + 2),
        ) {
            self.out.add_cte(&w.value);
        }
    }

    /// A dotted chain whose first part may name a relation
    fn relation_chain(&self, i: usize) -> Option<(String, usize)> {
        match self.tokens.get(i) {
            Some(Token::Word(w)) if w.quote_style.is_some() || !is_reserved(w) => self.chain(i),
            _ => None,
        }
    }

    /// `a.b.c`, with an optional `@dblink` tail
    fn chain(&self, i: usize) -> Option<(String, usize)> {
        let mut parts = Vec::new();
        let mut j = i;
        while let Some(Token::Word(w)) = self.tokens.get(j) {
            parts.push(w.value.clone());
            j += 1;
            if let (Some(Token::AtSign), Some(Token::Word(_))) =
                (self.tokens.get(j), self.tokens.get(j + 1))
            {
                j += 2;
            }
            match (self.tokens.get(j), self.tokens.get(j + 1)) {
                (Some(Token::Period), Some(Token::Word(_))) => j += 1,
                _ => break,
            }
        }
        if parts.is_empty() {
            None
        } else {
            Some((parts.join("."), j))
        }
    }

    fn at_statement_start(&self, i: usize) -> bool {
        match i.checked_sub(1).map(|p| self.tokens[p]) {
            None | Some(Token::SemiColon) => true,
            Some(token) => plain_word(token).is_some_and(|w| {
                STATEMENT_LEADERS.iter().any(|l| w.value.eq_ignore_ascii_case(l))
            }),
        }
    }

    fn ends_statement(&self, i: usize) -> bool {
        matches!(self.tokens.get(i), None | Some(Token::SemiColon | Token::EOF))
    }

    fn prev_is(&self, i: usize, keyword: &str) -> bool {
        i.checked_sub(1).is_some_and(|p| self.word_in(p, &[keyword]))
    }

    fn prev_in(&self, i: usize, keywords: &[&str]) -> bool {
        i.checked_sub(1).is_some_and(|p| self.word_in(p, keywords))
    }

    fn word_in(&self, i: usize, keywords: &[&str]) -> bool {
        self.tokens
            .get(i)
            .and_then(|t| plain_word(t))
            .is_some_and(|w| keywords.iter().any(|k| w.value.eq_ignore_ascii_case(k)))
    }
}

fn plain_word(token: &Token) -> Option<&Word> {
    match token {
        Token::Word(w) if w.quote_style.is_none() => Some(w),
        _ => None,
    }
}

fn is_reserved(word: &Word) -> bool {
    RESERVED.iter().any(|r| word.value.eq_ignore_ascii_case(r))
}

fn is_syntax_word(word: &Word) -> bool {
    word.quote_style.is_none()
        && SYNTAX_BEFORE_PAREN
            .iter()
            .any(|r| word.value.eq_ignore_ascii_case(r))
}

/// Index of the `)` closing the `(` at `open`
fn matching_paren(tokens: &[&Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, token) in tokens.iter().enumerate().skip(open) {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// For each token, whether its innermost enclosing parenthesis is not a
/// subquery (`EXTRACT(YEAR FROM d)`)
fn plain_paren_flags(tokens: &[&Token]) -> Vec<bool> {
    let mut stack: Vec<bool> = Vec::new();
    let mut flags = Vec::with_capacity(tokens.len());
    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::LParen => {
                flags.push(stack.last().is_some_and(|sub| !sub));
                let subquery = tokens
                    .get(i + 1)
                    .and_then(|t| plain_word(t))
                    .is_some_and(|w| {
                        w.value.eq_ignore_ascii_case("SELECT")
                            || w.value.eq_ignore_ascii_case("WITH")
                    });
                stack.push(subquery);
            }
            Token::RParen => {
                stack.pop();
                flags.push(stack.last().is_some_and(|sub| !sub));
            }
            _ => flags.push(stack.last().is_some_and(|sub| !sub)),
        }
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexSet;
    use pretty_assertions::assert_eq;
    use sqlparser::dialect::{GenericDialect, MsSqlDialect};
    use sqlparser::tokenizer::Tokenizer;

    fn run(
        dialect: &dyn sqlparser::dialect::Dialect,
        sql: &str,
        rules: HarvestRules,
    ) -> crate::model::BodyAnalysis {
        let tokens = Tokenizer::new(dialect, sql).tokenize().unwrap();
        let mut collector = ReferenceCollector::new();
        harvest(&tokens, rules, &mut collector);
        collector.finish()
    }

    fn set(items: &[&str]) -> IndexSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_harvest_from_list_with_aliases() {
        let result = run(
            &GenericDialect {},
            "IF x THEN SELECT a INTO v FROM emp e, dept d \
             WHERE EXTRACT(YEAR FROM e.hired) > 2000; END IF",
            HarvestRules::default(),
        );
        assert_eq!(result.relations, set(&["emp", "dept"]));
        assert!(result.function_calls.is_empty());
    }

    #[test]
    fn test_harvest_tsql_exec_forms() {
        let result = run(
            &MsSqlDialect {},
            "EXEC dbo.usp_log @msg = 'x' EXEC @rc = dbo.usp_check EXEC('SELECT 1') \
             UPDATE t WITH (ROWLOCK) SET a = 1 \
             FROM dbo.Orders o WITH (NOLOCK) JOIN @items i ON 1 = 1",
            HarvestRules::default(),
        );
        assert_eq!(result.procedure_calls, set(&["dbo.usp_log", "dbo.usp_check"]));
        assert_eq!(result.relations, set(&["t", "dbo.Orders"]));
    }

    #[test]
    fn test_harvest_plsql_statement_calls() {
        let result = run(
            &GenericDialect {},
            "HR.ORDER_PKG.PROCESS(1001); ORDER_PKG.PROCESS(1003); log_start; COMMIT; \
             v := NUMBER_UTIL.ROUND2(x); EXECUTE IMMEDIATE 'DROP TABLE t'",
            HarvestRules { bare_calls: true },
        );
        assert_eq!(
            result.procedure_calls,
            set(&["HR.ORDER_PKG.PROCESS", "ORDER_PKG.PROCESS", "log_start"])
        );
        assert_eq!(result.function_calls, set(&["NUMBER_UTIL.ROUND2"]));
        assert!(result.relations.is_empty());
    }

    #[test]
    fn test_harvest_skips_type_constructors_and_definitions() {
        let result = run(
            &GenericDialect {},
            "DECLARE v NUMBER(10); c VARCHAR2(20); BEGIN INSERT INTO audit (a) VALUES (fmt(v)); END",
            HarvestRules { bare_calls: true },
        );
        assert_eq!(result.function_calls, set(&["fmt"]));
        assert_eq!(result.relations, set(&["audit"]));
    }

    #[test]
    fn test_harvest_merge_and_cte() {
        let result = run(
            &GenericDialect {},
            "WITH src AS (SELECT * FROM staging) MERGE INTO target t USING src s ON t.id = s.id \
             WHEN MATCHED THEN UPDATE SET v = s.v",
            HarvestRules::default(),
        );
        assert_eq!(result.relations, set(&["staging", "target"]));
    }
}
