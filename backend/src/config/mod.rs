//! Static table configurations.
//!
//! A [`TableConfiguration`] describes one legacy source table: its columns and
//! their cleaning rules, the business validator to run, the transformation
//! rules, and how it relates to the other tables. Configurations are declared
//! in Rust ([`tables::all`]), validated once when the registry is built, and
//! never mutated afterwards.

pub mod settings;
pub mod tables;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use crate::error::{ConfigError, ConfigResult};
use crate::models::{Record, StageTable};
use crate::transliterate::{contains_non_ascii_legacy_glyphs, contains_target_script};

pub use crate::transform::dsl::operations::{CleanContext, CleaningOp};
pub use settings::PipelineSettings;

// =============================================================================
// Column rules
// =============================================================================

/// Declared type of a column after cleaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Text,
    Integer,
    Decimal,
    Date,
    Boolean,
}

/// How much a failing column check weighs in Validate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationPriority {
    /// Failure routes the row to invalid.
    Critical,
    /// Failure routes the row to invalid.
    Important,
    /// Failure is a warning only.
    Optional,
}

impl ValidationPriority {
    pub fn rejects_row(self) -> bool {
        !matches!(self, Self::Optional)
    }
}

/// Value constraints checked by the generic schema validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<String>,
}

/// Rule for one source column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRule {
    /// Column name in the legacy file
    pub source: String,
    /// Column name in every stage output after Import
    pub target: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    /// Applied in order during Clean
    pub cleaning: Vec<CleaningOp>,
    pub priority: ValidationPriority,
    #[serde(default)]
    pub constraints: ColumnConstraints,
    /// Shared field this column provides or consumes through the cross-table cache
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_field: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl ColumnRule {
    /// A required text column with the Important priority and no cleaning.
    pub fn new(source: &str, target: &str, column_type: ColumnType) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            column_type,
            nullable: false,
            cleaning: Vec::new(),
            priority: ValidationPriority::Important,
            constraints: ColumnConstraints::default(),
            shared_field: None,
            description: String::new(),
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn clean(mut self, ops: impl IntoIterator<Item = CleaningOp>) -> Self {
        self.cleaning.extend(ops);
        self
    }

    pub fn priority(mut self, priority: ValidationPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn pattern(mut self, pattern: &str) -> Self {
        self.constraints.pattern = Some(pattern.to_string());
        self
    }

    pub fn range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.constraints.min = min;
        self.constraints.max = max;
        self
    }

    pub fn max_length(mut self, max_length: usize) -> Self {
        self.constraints.max_length = Some(max_length);
        self
    }

    pub fn allowed(mut self, values: &[&str]) -> Self {
        self.constraints.allowed = values.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn shared(mut self, field: &str) -> Self {
        self.shared_field = Some(field.to_string());
        self
    }

    pub fn doc(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }
}

// =============================================================================
// Transformation rules
// =============================================================================

/// Condition a row must meet for a transformation rule to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Precondition {
    /// The source value is present and not blank.
    NonEmpty,
    /// Another column equals a literal.
    Equals { column: String, value: String },
    /// The source value is not already in the target script.
    NotContainsTargetScript,
    /// Like `NotContainsTargetScript`, and the value also holds a legacy
    /// glyph outside ASCII. For free-text columns mixing Latin and legacy text.
    LegacyFontOnly,
}

impl Precondition {
    pub fn holds(&self, record: &Record, source: &str) -> bool {
        let source_text = StageTable::text(record, source);
        match self {
            Self::NonEmpty => source_text.is_some_and(|t| !t.trim().is_empty()),
            Self::Equals { column, value } => {
                StageTable::text(record, column).is_some_and(|t| t == value.as_str())
            }
            Self::NotContainsTargetScript => {
                source_text.is_some_and(|t| !contains_target_script(&t))
            }
            Self::LegacyFontOnly => source_text
                .is_some_and(|t| !contains_target_script(&t) && contains_non_ascii_legacy_glyphs(&t)),
        }
    }
}

/// Declarative value transformation applied during Transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationRule {
    pub source: String,
    pub target: String,
    /// Registered transformer name
    pub transformer: String,
    /// Keep the source column next to the target
    #[serde(default)]
    pub preserve_original: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precondition: Option<Precondition>,
}

impl TransformationRule {
    pub fn new(source: &str, target: &str, transformer: &str) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            transformer: transformer.to_string(),
            preserve_original: false,
            precondition: None,
        }
    }

    pub fn preserving_original(mut self) -> Self {
        self.preserve_original = true;
        self
    }

    pub fn when(mut self, precondition: Precondition) -> Self {
        self.precondition = Some(precondition);
        self
    }
}

// =============================================================================
// Table configuration
// =============================================================================

/// Data quality targets; falling short produces run warnings, never failures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    /// Minimum valid / total ratio in Validate
    pub min_success_rate: f64,
    /// Minimum populated ratio for non-optional columns in Profile
    pub min_population: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_success_rate: 0.95,
            min_population: 0.5,
        }
    }
}

/// What the Split stage derives from a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    /// One destination entity per row.
    Reference,
    /// Class offerings: headers, sessions and lines from composite identifiers.
    Enrollment,
    /// Payments: headers and allocation lines.
    Financial,
}

/// Static descriptor of one legacy source table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableConfiguration {
    pub name: String,
    /// `*`/`?` wildcard matched against file names in the source directory
    pub source_pattern: String,
    pub kind: TableKind,
    pub columns: Vec<ColumnRule>,
    /// Registered business validator name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<String>,
    #[serde(default)]
    pub transformations: Vec<TransformationRule>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Shared fields this table is the authority for
    #[serde(default)]
    pub provides: Vec<String>,
    /// Target column holding a composite identifier to parse during Clean
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub thresholds: QualityThresholds,
}

impl TableConfiguration {
    pub fn new(name: &str, source_pattern: &str, kind: TableKind) -> Self {
        Self {
            name: name.to_string(),
            source_pattern: source_pattern.to_string(),
            kind,
            columns: Vec::new(),
            validator: None,
            transformations: Vec::new(),
            dependencies: Vec::new(),
            provides: Vec::new(),
            identifier_column: None,
            chunk_size: None,
            thresholds: QualityThresholds::default(),
        }
    }

    pub fn column(mut self, rule: ColumnRule) -> Self {
        self.columns.push(rule);
        self
    }

    pub fn validator(mut self, name: &str) -> Self {
        self.validator = Some(name.to_string());
        self
    }

    pub fn transform(mut self, rule: TransformationRule) -> Self {
        self.transformations.push(rule);
        self
    }

    pub fn depends_on(mut self, tables: &[&str]) -> Self {
        self.dependencies.extend(tables.iter().map(|t| t.to_string()));
        self
    }

    pub fn provides(mut self, fields: &[&str]) -> Self {
        self.provides.extend(fields.iter().map(|f| f.to_string()));
        self
    }

    pub fn identifier(mut self, target_column: &str) -> Self {
        self.identifier_column = Some(target_column.to_string());
        self
    }

    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = Some(size);
        self
    }

    pub fn thresholds(mut self, thresholds: QualityThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Rule whose target is `target`.
    pub fn column_by_target(&self, target: &str) -> Option<&ColumnRule> {
        self.columns.iter().find(|c| c.target == target)
    }

    /// Chunk size in effect given the run-wide default.
    pub fn effective_chunk_size(&self, default: usize) -> usize {
        self.chunk_size.unwrap_or(default).max(1)
    }

    /// Shared fields consumed here but provided elsewhere.
    pub fn consumed_fields(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter_map(|c| c.shared_field.as_deref())
            .filter(|f| !self.provides.iter().any(|p| p == f))
    }

    /// Check the invariants that do not need the other tables.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut seen = HashSet::new();
        for (index, column) in self.columns.iter().enumerate() {
            if column.source.trim().is_empty() || column.target.trim().is_empty() {
                return Err(ConfigError::EmptyColumnName {
                    table: self.name.clone(),
                    index,
                });
            }
            if !seen.insert(column.source.as_str()) {
                return Err(ConfigError::DuplicateColumn {
                    table: self.name.clone(),
                    column: column.source.clone(),
                });
            }
            if let Some(pattern) = &column.constraints.pattern {
                Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                    table: self.name.clone(),
                    column: column.source.clone(),
                    source,
                })?;
            }
            for op in &column.cleaning {
                if let CleaningOp::Replace { pattern, .. } = op {
                    Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                        table: self.name.clone(),
                        column: column.source.clone(),
                        source,
                    })?;
                }
            }
        }
        if self.chunk_size == Some(0) {
            return Err(ConfigError::ZeroChunkSize(self.name.clone()));
        }
        Ok(())
    }

    /// Serialized configuration stored with every run record.
    pub fn snapshot(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
