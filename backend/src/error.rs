//! Error types for the legacy migration pipeline.
//!
//! This module defines a hierarchy of error types, one per concern:
//!
//! - [`ConfigError`] - Invalid table configurations (fail before any stage runs)
//! - [`SourceError`] - Missing or unreadable source files
//! - [`StoreError`] - Destination read/write failures
//! - [`RunError`] - Illegal pipeline run transitions
//! - [`PipelineError`] - Top-level orchestration errors
//!
//! Row-level problems (parse failures, validation failures, business-rule
//! violations) are deliberately absent: they are values attached to rows,
//! see [`crate::models::RowError`].

use std::path::PathBuf;
use thiserror::Error;

use crate::models::{RunStatus, Stage};

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors in a table configuration or in the registry built from them.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Two column rules share a source column name.
    #[error("Table '{table}': duplicate source column '{column}'")]
    DuplicateColumn { table: String, column: String },

    /// A column rule has an empty source or target name.
    #[error("Table '{table}': column rule #{index} has an empty source or target name")]
    EmptyColumnName { table: String, index: usize },

    /// A table name was registered twice.
    #[error("Duplicate table configuration: {0}")]
    DuplicateTable(String),

    /// Reference to a validator that is not registered.
    #[error("Table '{table}': unknown validator '{name}'")]
    UnknownValidator { table: String, name: String },

    /// Reference to a transformer that is not registered.
    #[error("Table '{table}': unknown transformer '{name}'")]
    UnknownTransformer { table: String, name: String },

    /// Dependency on a table that is not registered.
    #[error("Table '{table}' depends on unknown table '{dependency}'")]
    UnknownDependency { table: String, dependency: String },

    /// A shared field consumed by a column is not provided by any table.
    #[error("Table '{table}': shared field '{field}' is not provided by any table")]
    UnknownSharedField { table: String, field: String },

    /// The dependency graph contains a cycle.
    #[error("Dependency cycle between tables: {0:?}")]
    Cycle(Vec<String>),

    /// A constraint pattern does not compile.
    #[error("Table '{table}', column '{column}': invalid pattern: {source}")]
    InvalidPattern {
        table: String,
        column: String,
        #[source]
        source: regex::Error,
    },

    /// A column schema could not be compiled.
    #[error("Table '{table}', column '{column}': invalid schema: {message}")]
    InvalidSchema {
        table: String,
        column: String,
        message: String,
    },

    /// Chunk size must be positive.
    #[error("Table '{0}': chunk size must be greater than zero")]
    ZeroChunkSize(String),

    /// The requested table is not registered.
    #[error("Unknown table: {0}")]
    UnknownTable(String),
}

// =============================================================================
// Source Errors
// =============================================================================

/// Errors while locating or reading a flat source file.
#[derive(Debug, Error)]
pub enum SourceError {
    /// No file in the source directory matches the configured pattern.
    #[error("No source file matching '{pattern}' in {}", dir.display())]
    Missing { dir: PathBuf, pattern: String },

    /// The file exists but cannot be read.
    #[error("Cannot read '{}': {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file has no content.
    #[error("Source file is empty: {}", .0.display())]
    EmptyFile(PathBuf),

    /// The file has no header row.
    #[error("No headers found in {}", .0.display())]
    NoHeaders(PathBuf),

    /// CSV framing error.
    #[error("Invalid CSV in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors from the destination table store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Table requested for reading has never been written.
    #[error("Table not found in store: {0}")]
    TableNotFound(String),

    /// IO error.
    #[error("Store IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV error.
    #[error("Store CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON error.
    #[error("Store JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Run Errors
// =============================================================================

/// Illegal transitions of a [`crate::models::PipelineRun`].
#[derive(Debug, Error)]
pub enum RunError {
    /// Stages only move forward, one at a time.
    #[error("Cannot move from stage {from} to stage {to}")]
    StageOrder { from: Stage, to: Stage },

    /// A completed or failed run is frozen.
    #[error("Run is already {0:?}")]
    Terminal(RunStatus),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline orchestration errors.
///
/// A `PipelineError` aborts the current table's run only; sibling tables in a
/// multi-table invocation continue.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Source error.
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Run bookkeeping error.
    #[error("Run error: {0}")]
    Run(#[from] RunError),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for source reading.
pub type SourceResult<T> = Result<T, SourceError>;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        let source_err = SourceError::EmptyFile(PathBuf::from("students.csv"));
        let pipeline_err: PipelineError = source_err.into();
        assert!(pipeline_err.to_string().contains("students.csv"));

        let config_err = ConfigError::UnknownTable("ghosts".into());
        let pipeline_err: PipelineError = config_err.into();
        assert!(pipeline_err.to_string().contains("ghosts"));
    }

    #[test]
    fn test_stage_order_message() {
        let err = RunError::StageOrder {
            from: Stage::Validate,
            to: Stage::Clean,
        };
        let msg = err.to_string();
        assert!(msg.contains("validate"));
        assert!(msg.contains("clean"));
    }
}
