//! Input file discovery

use std::fs;
use std::path::{Path, PathBuf};

use glob::Pattern;
use miette::{IntoDiagnostic, Result};
use tracing::{debug, warn};

/// Collect the `.sql` files to analyze, sorted by path.
///
/// `input` may be a single file or a directory searched recursively. Files
/// matching an `exclude` pattern or longer than `max_file_lines` are skipped.
pub fn collect_sql_files(
    input: &Path,
    exclude: &[String],
    max_file_lines: usize,
) -> Result<Vec<PathBuf>> {
    if !input.exists() {
        miette::bail!("Input path does not exist: {}", input.display());
    }

    let patterns = exclude_patterns(exclude);
    let candidates = if input.is_file() {
        vec![input.to_path_buf()]
    } else {
        let pattern = format!("{}/**/*.sql", glob::Pattern::escape(&input.display().to_string()));
        glob::glob(&pattern)
            .into_diagnostic()?
            .flatten()
            .filter(|path| path.is_file())
            .collect()
    };

    let mut files: Vec<PathBuf> = candidates
        .into_iter()
        .filter(|path| !is_excluded(path, &patterns))
        .filter(|path| within_line_limit(path, max_file_lines))
        .collect();
    files.sort();
    files.dedup();
    Ok(files)
}

fn exclude_patterns(exclude: &[String]) -> Vec<Pattern> {
    exclude
        .iter()
        .filter_map(|raw| match Pattern::new(raw) {
            Ok(pattern) => Some(pattern),
            Err(err) => {
                warn!(pattern = %raw, error = %err, "ignoring invalid exclude pattern");
                None
            }
        })
        .collect()
}

fn is_excluded(path: &Path, patterns: &[Pattern]) -> bool {
    let excluded = patterns.iter().any(|p| p.matches_path(path));
    if excluded {
        debug!(path = %path.display(), "excluded");
    }
    excluded
}

// unreadable files are kept so the run can report them
fn within_line_limit(path: &Path, max_file_lines: usize) -> bool {
    let Ok(bytes) = fs::read(path) else {
        return true;
    };
    let lines = bytes.split(|b| *b == b'\n').count();
    if lines > max_file_lines {
        debug!(path = %path.display(), lines, "skipping file over line limit");
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_directory_is_searched_recursively_and_sorted() {
        let dir = TempDir::new().unwrap();
        let b = write(dir.path(), "b.sql", "SELECT 1;");
        let a = write(dir.path(), "nested/a.sql", "SELECT 1;");
        write(dir.path(), "notes.txt", "not sql");

        let files = collect_sql_files(dir.path(), &[], 100).unwrap();
        let mut expected = vec![b, a];
        expected.sort();
        assert_eq!(files, expected);
    }

    #[test]
    fn test_single_file_input() {
        let dir = TempDir::new().unwrap();
        let file = write(dir.path(), "only.sql", "SELECT 1;");
        assert_eq!(collect_sql_files(&file, &[], 100).unwrap(), vec![file]);
    }

    #[test]
    fn test_exclude_and_line_limit() {
        let dir = TempDir::new().unwrap();
        let kept = write(dir.path(), "kept.sql", "SELECT 1;");
        write(dir.path(), "vendor/skip.sql", "SELECT 1;");
        write(dir.path(), "long.sql", &"SELECT 1;\n".repeat(20));

        let exclude = vec!["**/vendor/**".to_string()];
        let files = collect_sql_files(dir.path(), &exclude, 10).unwrap();
        assert_eq!(files, vec![kept]);
    }

    #[test]
    fn test_missing_input_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(collect_sql_files(&dir.path().join("missing"), &[], 10).is_err());
    }
}
