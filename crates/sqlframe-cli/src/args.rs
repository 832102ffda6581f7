//! CLI argument definitions

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "sqlframe")]
#[command(author, version, about = "Extract tables, routines, triggers and their references from SQL files")]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Analyze SQL files and write one JSON object per file
    Analyze {
        /// A .sql file or a directory searched recursively
        input: PathBuf,

        /// JSONL output file
        output: PathBuf,

        /// Configuration file (defaults to sqlframe.toml in this or a parent directory)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Leave column listings out of table operations
        #[arg(long)]
        hide_sql_table_columns: bool,

        /// Skip files with more lines than this
        #[arg(long, value_name = "N")]
        max_file_lines: Option<usize>,

        /// Glob patterns of files to skip
        #[arg(short, long, value_name = "GLOB")]
        exclude: Vec<String>,
    },

    /// Print the analysis of one file as pretty JSON
    Inspect {
        /// SQL file to analyze
        file: PathBuf,

        /// Also render skipped and partly read statements
        #[arg(long)]
        diagnostics: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyze_args() {
        let args = Args::parse_from([
            "sqlframe",
            "-v",
            "analyze",
            "db",
            "out.jsonl",
            "--hide-sql-table-columns",
            "--max-file-lines",
            "500",
            "-e",
            "**/migrations/**",
        ]);
        assert_eq!(args.verbose, 1);
        let Command::Analyze {
            input,
            hide_sql_table_columns,
            max_file_lines,
            exclude,
            ..
        } = args.command
        else {
            panic!("expected analyze");
        };
        assert_eq!(input, PathBuf::from("db"));
        assert!(hide_sql_table_columns);
        assert_eq!(max_file_lines, Some(500));
        assert_eq!(exclude, vec!["**/migrations/**"]);
    }

    #[test]
    fn test_inspect_args() {
        let args = Args::parse_from(["sqlframe", "inspect", "a.sql", "--diagnostics"]);
        assert!(matches!(
            args.command,
            Command::Inspect {
                diagnostics: true,
                ..
            }
        ));
    }
}
