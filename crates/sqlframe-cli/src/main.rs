//! sqlframe CLI - structural extraction from SQL files

mod args;
mod config;
mod discovery;
mod output;

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use sqlframe_core::{AnalyzerOptions, SqlAnalyzer};
use tracing::{info, warn};

use crate::args::{Args, Command};
use crate::config::Config;
use crate::discovery::collect_sql_files;
use crate::output::{print_diagnostics, DoneRecord, ErrorRecord, JsonlWriter, RunRecord};

fn main() -> ExitCode {
    let args = Args::parse();

    let level = match (args.quiet, args.verbose) {
        (true, _) => tracing::Level::ERROR,
        (false, 0) => tracing::Level::WARN,
        (false, 1) => tracing::Level::DEBUG,
        (false, _) => tracing::Level::TRACE,
    };
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(args) {
        Ok(has_errors) => {
            if has_errors {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("Error: {:?}", e);
            ExitCode::from(2)
        }
    }
}

fn run(args: Args) -> Result<bool> {
    match args.command {
        Command::Analyze {
            input,
            output,
            config: config_path,
            hide_sql_table_columns,
            max_file_lines,
            exclude,
        } => {
            let cwd = std::env::current_dir().into_diagnostic()?;
            let config = Config::load_or_default(config_path.as_deref(), &cwd)
                .merge_with_args(hide_sql_table_columns, max_file_lines, &exclude);

            let files = collect_sql_files(&input, &config.exclude, config.max_file_lines)?;
            let analyzer = SqlAnalyzer::new(AnalyzerOptions {
                hide_sql_table_columns: config.hide_sql_table_columns,
            });
            let summary = analyze_files(&analyzer, &input, &files, &output)?;

            if !args.quiet {
                eprintln!(
                    "Analyzed {} file(s), {} error(s); output written to {}",
                    summary.files_analyzed,
                    summary.files_with_errors,
                    output.display()
                );
            }
            Ok(summary.files_with_errors > 0)
        }

        Command::Inspect { file, diagnostics } => {
            let source = fs::read_to_string(&file).into_diagnostic()?;
            let file_name = file.display().to_string();
            let (analysis, found) =
                SqlAnalyzer::default().analyze_with_diagnostics(&file_name, &source);

            println!(
                "{}",
                serde_json::to_string_pretty(&analysis).into_diagnostic()?
            );
            if diagnostics {
                print_diagnostics(&file_name, &source, &found);
            }
            Ok(false)
        }
    }
}

struct RunSummary {
    files_analyzed: usize,
    files_with_errors: usize,
}

fn analyze_files(
    analyzer: &SqlAnalyzer,
    input: &Path,
    files: &[PathBuf],
    output: &Path,
) -> Result<RunSummary> {
    let started_at = chrono::Utc::now();
    let sink = File::create(output).into_diagnostic()?;
    let mut writer = JsonlWriter::new(BufWriter::new(sink));

    let input_path = input.display().to_string();
    writer.write_run(&RunRecord::new(started_at, &input_path, files.len()))?;

    let mut summary = RunSummary {
        files_analyzed: 0,
        files_with_errors: 0,
    };
    for (i, path) in files.iter().enumerate() {
        let file_name = path.display().to_string();
        info!(file = %file_name, "[{}/{}] analyzing", i + 1, files.len());
        match fs::read_to_string(path) {
            Ok(source) => {
                let analysis = analyzer.analyze(&file_name, &source);
                writer.write_analysis(&analysis)?;
                summary.files_analyzed += 1;
            }
            Err(err) => {
                warn!(file = %file_name, error = %err, "could not read file");
                writer.write_error(&ErrorRecord::new(&file_name, err))?;
                summary.files_with_errors += 1;
            }
        }
    }

    writer.write_done(&DoneRecord::new(
        started_at,
        chrono::Utc::now(),
        summary.files_analyzed,
        summary.files_with_errors,
    ))?;
    Ok(summary)
}
