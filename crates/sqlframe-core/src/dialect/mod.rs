//! SQL dialect support

mod detect;

pub use detect::detect_dialect;

use sqlparser::dialect::{Dialect, GenericDialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect};
use std::str::FromStr;

/// Dialects the extractor knows how to tell apart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SqlDialect {
    #[default]
    PostgreSQL,
    MySQL,
    TSql,
    PlSql,
}

impl SqlDialect {
    /// Get the sqlparser dialect for parsing.
    ///
    /// sqlparser has no Oracle grammar, PL/SQL goes through the generic one.
    pub fn parser_dialect(&self) -> Box<dyn Dialect> {
        match self {
            SqlDialect::PostgreSQL => Box::new(PostgreSqlDialect {}),
            SqlDialect::MySQL => Box::new(MySqlDialect {}),
            SqlDialect::TSql => Box::new(MsSqlDialect {}),
            SqlDialect::PlSql => Box::new(GenericDialect {}),
        }
    }
}

impl FromStr for SqlDialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgresql" | "postgres" | "pg" | "plpgsql" => Ok(SqlDialect::PostgreSQL),
            "mysql" | "mariadb" => Ok(SqlDialect::MySQL),
            "tsql" | "t-sql" | "mssql" | "sqlserver" => Ok(SqlDialect::TSql),
            "plsql" | "pl/sql" | "oracle" => Ok(SqlDialect::PlSql),
            _ => Err(format!(
                "Unknown dialect: '{}'. Supported dialects: postgresql, mysql, tsql, plsql.",
                s
            )),
        }
    }
}

impl std::fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlDialect::PostgreSQL => write!(f, "postgresql"),
            SqlDialect::MySQL => write!(f, "mysql"),
            SqlDialect::TSql => write!(f, "tsql"),
            SqlDialect::PlSql => write!(f, "plsql"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_from_str_aliases() {
        assert_eq!("mssql".parse::<SqlDialect>(), Ok(SqlDialect::TSql));
        assert_eq!("Oracle".parse::<SqlDialect>(), Ok(SqlDialect::PlSql));
        assert_eq!("pg".parse::<SqlDialect>(), Ok(SqlDialect::PostgreSQL));
        assert!("sqlite".parse::<SqlDialect>().is_err());
    }

    #[test]
    fn test_dialect_display_round_trips() {
        for d in [
            SqlDialect::PostgreSQL,
            SqlDialect::MySQL,
            SqlDialect::TSql,
            SqlDialect::PlSql,
        ] {
            assert_eq!(d.to_string().parse::<SqlDialect>(), Ok(d));
        }
    }
}
