//! Domain models for the migration pipeline.
//!
//! This module contains the core data structures shared by every stage:
//!
//! - [`Record`] / [`StageTable`] - one stage output table of text-first rows
//! - [`Stage`] - the six ordered pipeline stages
//! - [`PipelineRun`] - per (table, invocation) run state and structured log
//! - [`RowError`] - a typed row-level problem
//! - [`StageRunRecord`] - persisted per (table, stage) run metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use crate::error::RunError;

// =============================================================================
// Tables
// =============================================================================

/// One row: column name to value. Imported values are always strings.
pub type Record = Map<String, Value>;

/// Audit column names attached at import and maintained by every stage.
pub mod audit {
    pub const RUN_ID: &str = "_run_id";
    pub const IMPORTED_AT: &str = "_imported_at";
    pub const SOURCE_ROW: &str = "_source_row";
    pub const SOURCE_FILE: &str = "_source_file";
    pub const TRANSFORM_PATH: &str = "_transform_path";
    pub const STAGE: &str = "_stage";

    /// All audit columns, in output order.
    pub const ALL: [&str; 6] = [
        RUN_ID,
        IMPORTED_AT,
        SOURCE_ROW,
        SOURCE_FILE,
        TRANSFORM_PATH,
        STAGE,
    ];
}

/// A complete stage output table.
///
/// Tables are always written whole; a stage never appends to a previous
/// version of its own output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTable {
    pub name: String,
    /// Column order for writing. Records may omit columns (written empty).
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

impl StageTable {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append a column to the schema if it is not already present.
    pub fn ensure_column(&mut self, column: &str) {
        if !self.columns.iter().any(|c| c == column) {
            self.columns.push(column.to_string());
        }
    }

    /// Text value of a cell; non-string values are rendered, missing is `None`.
    pub fn text<'a>(record: &'a Record, column: &str) -> Option<std::borrow::Cow<'a, str>> {
        match record.get(column)? {
            Value::String(s) => Some(std::borrow::Cow::Borrowed(s.as_str())),
            Value::Null => None,
            other => Some(std::borrow::Cow::Owned(other.to_string())),
        }
    }
}

/// Source row number recorded at import, if present.
pub fn source_row(record: &Record) -> usize {
    record
        .get(audit::SOURCE_ROW)
        .and_then(|v| match v {
            Value::Number(n) => n.as_u64().map(|n| n as usize),
            Value::String(s) => s.parse().ok(),
            _ => None,
        })
        .unwrap_or(0)
}

/// Append one step to a record's transformation path and stamp the stage.
pub fn mark_stage(record: &mut Record, stage: Stage) {
    let path = match record.get(audit::TRANSFORM_PATH).and_then(Value::as_str) {
        Some(p) if !p.is_empty() => format!("{}>{}", p, stage),
        _ => stage.to_string(),
    };
    record.insert(audit::TRANSFORM_PATH.to_string(), Value::String(path));
    record.insert(audit::STAGE.to_string(), Value::String(stage.to_string()));
}

// =============================================================================
// Stages
// =============================================================================

/// The six ordered pipeline stages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    #[default]
    Import = 1,
    Profile = 2,
    Clean = 3,
    Validate = 4,
    Transform = 5,
    Split = 6,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 6] = [
        Stage::Import,
        Stage::Profile,
        Stage::Clean,
        Stage::Validate,
        Stage::Transform,
        Stage::Split,
    ];

    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::Profile => "profile",
            Self::Clean => "clean",
            Self::Validate => "validate",
            Self::Transform => "transform",
            Self::Split => "split",
        }
    }

    /// The stage that follows this one, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Import => Some(Self::Profile),
            Self::Profile => Some(Self::Clean),
            Self::Clean => Some(Self::Validate),
            Self::Validate => Some(Self::Transform),
            Self::Transform => Some(Self::Split),
            Self::Split => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Row Errors
// =============================================================================

/// Classification of a row-level problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Required,
    Type,
    Pattern,
    Bounds,
    Business,
    Parse,
    Contract,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Type => "type",
            Self::Pattern => "pattern",
            Self::Bounds => "bounds",
            Self::Business => "business",
            Self::Parse => "parse",
            Self::Contract => "contract",
        }
    }
}

/// A structured row-level error: never aborts a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowError {
    pub row: usize,
    pub field: String,
    pub message: String,
    pub kind: ErrorKind,
}

impl RowError {
    pub fn new(row: usize, field: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            row,
            field: field.into(),
            message: message.into(),
            kind,
        }
    }
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Row {}, field '{}' [{}]: {}",
            self.row,
            self.field,
            self.kind.as_str(),
            self.message
        )
    }
}

// =============================================================================
// Pipeline Run
// =============================================================================

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Severity of a run log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// One entry of a run's structured log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub level: LogLevel,
    pub stage: Option<Stage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

/// Processed / valid / invalid row counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowCounts {
    pub processed: usize,
    pub valid: usize,
    pub invalid: usize,
}

/// Run state for one (table, invocation).
///
/// Stages advance strictly one at a time; once completed or failed the run
/// rejects every further mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub table: String,
    /// Stage the run starts at; Import unless a single stage is re-run.
    #[serde(default)]
    pub first_stage: Stage,
    pub stage: Option<Stage>,
    pub status: RunStatus,
    pub counts: RowCounts,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub log: Vec<RunLogEntry>,
}

impl PipelineRun {
    pub fn new(table: impl Into<String>) -> Self {
        Self::starting_at(table, Stage::Import)
    }

    /// A run that re-executes stages from `stage` onward, reading the
    /// previous stage's stored output.
    pub fn starting_at(table: impl Into<String>, stage: Stage) -> Self {
        Self {
            id: Uuid::new_v4(),
            table: table.into(),
            first_stage: stage,
            stage: None,
            status: RunStatus::Pending,
            counts: RowCounts::default(),
            started_at: Utc::now(),
            finished_at: None,
            log: Vec::new(),
        }
    }

    fn ensure_open(&self) -> Result<(), RunError> {
        if self.status.is_terminal() {
            Err(RunError::Terminal(self.status))
        } else {
            Ok(())
        }
    }

    /// Move to `stage`, which must be the next stage (or the first stage for
    /// a fresh run).
    pub fn enter_stage(&mut self, stage: Stage) -> Result<(), RunError> {
        self.ensure_open()?;
        let expected = match self.stage {
            None => self.first_stage,
            Some(current) => current.next().ok_or(RunError::StageOrder {
                from: current,
                to: stage,
            })?,
        };
        if stage != expected {
            return Err(RunError::StageOrder {
                from: self.stage.unwrap_or(self.first_stage),
                to: stage,
            });
        }
        self.stage = Some(stage);
        self.status = RunStatus::Running;
        Ok(())
    }

    /// Replace the row counts with the latest stage's figures.
    pub fn record_counts(&mut self, counts: RowCounts) -> Result<(), RunError> {
        self.ensure_open()?;
        self.counts = counts;
        Ok(())
    }

    fn push(&mut self, level: LogLevel, row: Option<usize>, field: Option<String>, message: String) {
        if self.status.is_terminal() {
            return;
        }
        self.log.push(RunLogEntry {
            level,
            stage: self.stage,
            row,
            field,
            message,
        });
    }

    pub fn log_info(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Info, None, None, message.into());
    }

    pub fn log_warning(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Warning, None, None, message.into());
    }

    pub fn log_error(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Error, None, None, message.into());
    }

    /// Record a row-level error (as an error entry) without failing the run.
    pub fn log_row_error(&mut self, error: &RowError) {
        self.push(
            LogLevel::Error,
            Some(error.row),
            Some(error.field.clone()),
            format!("[{}] {}", error.kind.as_str(), error.message),
        );
    }

    /// Record a row-level warning.
    pub fn log_row_warning(&mut self, row: usize, field: &str, message: impl Into<String>) {
        self.push(LogLevel::Warning, Some(row), Some(field.to_string()), message.into());
    }

    pub fn warnings(&self) -> impl Iterator<Item = &RunLogEntry> {
        self.log.iter().filter(|e| e.level == LogLevel::Warning)
    }

    pub fn errors(&self) -> impl Iterator<Item = &RunLogEntry> {
        self.log.iter().filter(|e| e.level == LogLevel::Error)
    }

    pub fn complete(&mut self) -> Result<(), RunError> {
        self.ensure_open()?;
        self.status = RunStatus::Completed;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Mark the run failed with full error context. A run that is already
    /// terminal is left untouched.
    pub fn fail(&mut self, error: &dyn std::error::Error) {
        if self.status.is_terminal() {
            return;
        }
        let mut message = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            message.push_str(&format!(": {}", cause));
            source = cause.source();
        }
        self.push(LogLevel::Error, None, None, message);
        self.status = RunStatus::Failed;
        self.finished_at = Some(Utc::now());
    }

    /// Percentage of processed rows that were valid (0.0 when nothing was processed).
    pub fn success_rate(&self) -> f64 {
        if self.counts.processed == 0 {
            0.0
        } else {
            self.counts.valid as f64 / self.counts.processed as f64
        }
    }
}

// =============================================================================
// Persisted run metadata
// =============================================================================

/// One persisted record per (table, stage), with the configuration in effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRunRecord {
    pub run_id: Uuid,
    pub table: String,
    pub stage: Stage,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub counts: RowCounts,
    pub config_snapshot: Value,
    #[serde(default)]
    pub log: Vec<RunLogEntry>,
}
