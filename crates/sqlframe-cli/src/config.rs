//! Configuration file handling

use miette::{IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

pub const CONFIG_FILE_NAME: &str = "sqlframe.toml";

/// Configuration for sqlframe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Leave column listings out of table operations
    pub hide_sql_table_columns: bool,

    /// Files with more lines than this are skipped
    pub max_file_lines: usize,

    /// Glob patterns of files to skip
    pub exclude: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hide_sql_table_columns: false,
            max_file_lines: 20_000,
            exclude: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).into_diagnostic()?;
        let config: Config = toml::from_str(&contents).into_diagnostic()?;
        Ok(config)
    }

    /// Load `path`, or the nearest sqlframe.toml from `start` upwards.
    ///
    /// A missing or unreadable file falls back to the defaults.
    pub fn load_or_default(path: Option<&Path>, start: &Path) -> Self {
        let found = match path {
            Some(path) => Some(path.to_path_buf()),
            None => find_config(start),
        };
        let Some(path) = found else {
            return Self::default();
        };
        match Self::from_file(&path) {
            Ok(config) => config,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "invalid config, using defaults");
                Self::default()
            }
        }
    }

    /// Merge CLI arguments into configuration
    /// CLI arguments take precedence over config file values
    pub fn merge_with_args(
        mut self,
        hide_sql_table_columns: bool,
        max_file_lines: Option<usize>,
        exclude: &[String],
    ) -> Self {
        if hide_sql_table_columns {
            self.hide_sql_table_columns = true;
        }
        if let Some(max) = max_file_lines {
            self.max_file_lines = max;
        }
        if !exclude.is_empty() {
            self.exclude = exclude.to_vec();
        }
        self
    }
}

/// Try to find sqlframe.toml in `start` or its parent directories
fn find_config(start: &Path) -> Option<PathBuf> {
    let mut current_dir = start.to_path_buf();
    loop {
        let config_path = current_dir.join(CONFIG_FILE_NAME);
        if config_path.is_file() {
            return Some(config_path);
        }
        if !current_dir.pop() {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_parse_partial_config() {
        let config: Config = toml::from_str("hide_sql_table_columns = true").unwrap();
        assert!(config.hide_sql_table_columns);
        assert_eq!(config.max_file_lines, 20_000);
        assert!(config.exclude.is_empty());
    }

    #[test]
    fn test_found_in_parent_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "max_file_lines = 10\nexclude = [\"**/vendor/**\"]\n",
        )
        .unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let config = Config::load_or_default(None, &nested);
        assert_eq!(config.max_file_lines, 10);
        assert_eq!(config.exclude, vec!["**/vendor/**"]);
    }

    #[test]
    fn test_invalid_config_falls_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "max_file_lines = \"many\"").unwrap();
        assert_eq!(Config::load_or_default(Some(path.as_path()), dir.path()), Config::default());
    }

    #[test]
    fn test_cli_overrides_file() {
        let config = Config::default().merge_with_args(true, Some(5), &["x/*.sql".to_string()]);
        assert!(config.hide_sql_table_columns);
        assert_eq!(config.max_file_lines, 5);
        assert_eq!(config.exclude, vec!["x/*.sql"]);
    }
}
