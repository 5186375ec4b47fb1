//! Run-wide pipeline settings.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::transform::dsl::operations::DEFAULT_NULL_LITERALS;

/// Rows per chunk when a table declares no chunk size of its own.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Most frequent values kept per profiled column.
pub const DEFAULT_PROFILE_TOP_N: usize = 5;

/// Settings shared by every table of one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Directory holding the legacy CSV snapshots.
    pub source_dir: PathBuf,
    /// Directory receiving stage tables and run records.
    pub output_dir: PathBuf,
    pub chunk_size: usize,
    pub profile_top_n: usize,
    /// Spellings read as "no value" by `standardize_null`.
    pub null_literals: Vec<String>,
    /// One course code per line; when absent the catalog check is skipped.
    pub catalog_path: Option<PathBuf>,
    /// Tables to run; empty runs every registered table.
    pub tables: Vec<String>,
    /// Targets for imputed payment allocation when a student has no
    /// enrollment in the term. Empty means allocate to `UNALLOCATED`.
    pub default_targets: Vec<String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("data/source"),
            output_dir: PathBuf::from("data/output"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            profile_top_n: DEFAULT_PROFILE_TOP_N,
            null_literals: DEFAULT_NULL_LITERALS.iter().map(|s| s.to_string()).collect(),
            catalog_path: None,
            tables: Vec::new(),
            default_targets: Vec::new(),
        }
    }
}

impl PipelineSettings {
    pub fn with_dirs(source_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    /// Whether `table` is selected by the table filter.
    pub fn selects(&self, table: &str) -> bool {
        self.tables.is_empty() || self.tables.iter().any(|t| t == table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = PipelineSettings::default();
        assert_eq!(settings.chunk_size, DEFAULT_CHUNK_SIZE);
        assert!(settings.default_targets.is_empty());
        assert!(settings.null_literals.iter().any(|n| n == "n/a"));
        assert!(settings.selects("anything"));
    }

    #[test]
    fn test_table_filter() {
        let settings = PipelineSettings {
            tables: vec!["terms".into()],
            ..PipelineSettings::default()
        };
        assert!(settings.selects("terms"));
        assert!(!settings.selects("students"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: PipelineSettings =
            serde_json::from_str(r#"{"chunk_size": 10, "default_targets": ["GESL-01"]}"#).unwrap();
        assert_eq!(settings.chunk_size, 10);
        assert_eq!(settings.profile_top_n, DEFAULT_PROFILE_TOP_N);
        assert_eq!(settings.default_targets, vec!["GESL-01"]);
    }
}
