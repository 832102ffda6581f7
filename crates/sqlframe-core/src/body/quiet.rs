//! Best-effort parsing of routine bodies

use sqlparser::dialect::Dialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer};
use tracing::trace;

use crate::error::AnalysisError;
use crate::model::BodyAnalysis;
use crate::references::{harvest, HarvestRules, ReferenceCollector};

const STATEMENT_STARTS: &[&str] = &[
    "SELECT", "INSERT", "UPDATE", "DELETE", "MERGE", "WITH", "CALL",
];

/// Parses a body statement by statement, swallowing syntax errors.
///
/// Each top-level `;`-separated chunk gets a fresh parser. A chunk that
/// parses is walked by the [`ReferenceCollector`]; one that does not is
/// harvested token by token, so a broken statement never hides its
/// neighbours.
pub struct QuietParser<'d> {
    dialect: &'d dyn Dialect,
    rules: HarvestRules,
    dynamic_execute: bool,
}

impl<'d> QuietParser<'d> {
    pub fn new(dialect: &'d dyn Dialect, rules: HarvestRules) -> Self {
        Self {
            dialect,
            rules,
            dynamic_execute: false,
        }
    }

    /// Treat `EXECUTE x` as dynamic SQL (PL/pgSQL)
    pub fn with_dynamic_execute(mut self) -> Self {
        self.dynamic_execute = true;
        self
    }

    pub fn analyze(&self, body: &str) -> Result<BodyAnalysis, AnalysisError> {
        let tokens = Tokenizer::new(self.dialect, body).tokenize()?;
        let mut collector = ReferenceCollector::new();
        if self.dynamic_execute {
            collector = collector.with_dynamic_execute();
        }

        for chunk in split_chunks(tokens) {
            self.analyze_chunk(chunk, &mut collector);
        }
        Ok(collector.finish())
    }

    fn analyze_chunk(&self, chunk: Vec<Token>, collector: &mut ReferenceCollector) {
        // `IF x THEN UPDATE ...`: parse from the DML keyword, harvest the prefix
        let start = statement_start(&chunk).unwrap_or(0);
        let (prefix, mut statement) = {
            let mut chunk = chunk;
            let rest = chunk.split_off(start);
            (chunk, rest)
        };
        if is_word(statement.first(), "PERFORM") {
            statement[0] = Token::make_keyword("SELECT");
        }

        if !prefix.is_empty() {
            harvest(&prefix, self.rules, collector);
        }

        match Parser::new(self.dialect)
            .with_tokens(statement.clone())
            .parse_statements()
        {
            Ok(statements) => {
                for parsed in &statements {
                    collector.collect_statement(parsed);
                }
            }
            Err(err) => {
                trace!(error = %err, "chunk did not parse, harvesting tokens");
                harvest(&statement, self.rules, collector);
            }
        }
    }
}

/// Split at `;` outside parentheses, dropping whitespace-only chunks
fn split_chunks(tokens: Vec<Token>) -> Vec<Vec<Token>> {
    let mut chunks = Vec::new();
    let mut current = Vec::new();
    let mut depth = 0usize;
    for token in tokens {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => depth = depth.saturating_sub(1),
            Token::SemiColon if depth == 0 => {
                push_chunk(&mut chunks, std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(token);
    }
    push_chunk(&mut chunks, current);
    chunks
}

fn push_chunk(chunks: &mut Vec<Vec<Token>>, chunk: Vec<Token>) {
    if chunk
        .iter()
        .any(|t| !matches!(t, Token::Whitespace(_) | Token::EOF))
    {
        chunks.push(chunk);
    }
}

/// Index of the first top-level DML keyword or `PERFORM`
fn statement_start(chunk: &[Token]) -> Option<usize> {
    let mut depth = 0usize;
    for (i, token) in chunk.iter().enumerate() {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => depth = depth.saturating_sub(1),
            Token::Word(w) if depth == 0 && w.quote_style.is_none() => {
                if w.value.eq_ignore_ascii_case("PERFORM")
                    || STATEMENT_STARTS
                        .iter()
                        .any(|k| w.value.eq_ignore_ascii_case(k))
                {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn is_word(token: Option<&Token>, keyword: &str) -> bool {
    matches!(
        token,
        Some(Token::Word(w)) if w.quote_style.is_none() && w.value.eq_ignore_ascii_case(keyword)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexSet;
    use pretty_assertions::assert_eq;
    use sqlparser::dialect::{MsSqlDialect, PostgreSqlDialect};

    fn set(items: &[&str]) -> IndexSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_quiet_parse_mixes_parsed_and_harvested_chunks() {
        let body = "IF NOT FOUND THEN INSERT INTO audit(id) VALUES (1); END IF; \
                    PERFORM notify_change(NEW.id); \
                    RETURN QUERY SELECT * FROM orders o JOIN items i ON i.order_id = o.id";
        let result = QuietParser::new(&PostgreSqlDialect {}, HarvestRules::default())
            .with_dynamic_execute()
            .analyze(body)
            .unwrap();
        assert_eq!(result.relations, set(&["audit", "orders", "items"]));
        assert_eq!(result.function_calls, set(&["notify_change"]));
    }

    #[test]
    fn test_quiet_parse_tsql_body() {
        let body = "DECLARE @t INT; SELECT @t = SUM(amount) FROM dbo.Orders WHERE customer_id = @id; RETURN @t;";
        let result = QuietParser::new(&MsSqlDialect {}, HarvestRules::default())
            .analyze(body)
            .unwrap();
        assert_eq!(result.relations, set(&["dbo.Orders"]));
        assert_eq!(result.function_calls, set(&["SUM"]));
    }

    #[test]
    fn test_tokenizer_error_is_reported() {
        let result = QuietParser::new(&PostgreSqlDialect {}, HarvestRules::default())
            .analyze("SELECT 'unterminated");
        assert!(result.is_err());
    }

    #[test]
    fn test_split_chunks_respects_parentheses() {
        let tokens = Tokenizer::new(&PostgreSqlDialect {}, "SELECT f(';'); ; SELECT 2")
            .tokenize()
            .unwrap();
        assert_eq!(split_chunks(tokens).len(), 2);
    }
}
