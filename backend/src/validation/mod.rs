//! Row validation.
//!
//! Two layers run on every cleaned row:
//!
//! 1. **Column checks** - a small JSON Schema (Draft 7) compiled per column
//!    from its [`ColumnRule`]: declared type, pattern / allowed values /
//!    length, and numeric bounds. Each layer is a separate schema so a
//!    failure maps to one [`ErrorKind`].
//! 2. **Business rules** - a named validator per table, see [`business`].
//!
//! Failures on Critical and Important columns reject the row; failures on
//! Optional columns are returned as warnings.
//!
//! Derived destination records are checked separately against the embedded
//! contract schemas in [`contracts`].

pub mod business;
pub mod contracts;

use jsonschema::Validator;
use serde_json::{json, Value};

use crate::config::{ColumnRule, ColumnType, TableConfiguration};
use crate::error::{ConfigError, ConfigResult};
use crate::models::{source_row, ErrorKind, Record, RowError};
use business::BusinessValidator;

/// Validate a JSON value against a JSON schema.
///
/// # Returns
/// * `Ok(())` when valid
/// * `Err(Vec<String>)` with every error message otherwise
///
/// # Example
/// ```ignore
/// use serde_json::json;
/// use legacymig::validation::validate;
///
/// let schema = json!({
///     "type": "object",
///     "required": ["name"],
///     "properties": { "name": { "type": "string" } }
/// });
/// assert!(validate(&schema, &json!({ "name": "test" })).is_ok());
/// assert!(validate(&schema, &json!({ "age": 42 })).is_err());
/// ```
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator =
        jsonschema::draft7::new(schema).map_err(|e| vec![format!("Invalid schema: {}", e)])?;

    let errors: Vec<String> = validator.iter_errors(data).map(|e| e.to_string()).collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Simple true/false check.
pub fn is_valid(schema: &Value, data: &Value) -> bool {
    jsonschema::draft7::is_valid(schema, data)
}

// =============================================================================
// Column schemas
// =============================================================================

const DECIMAL_PATTERN: &str = r"^-?\d+(\.\d+)?$";
const DATE_PATTERN: &str = r"^\d{4}-\d{2}-\d{2}$";

/// Schema for the cleaned type of a column.
pub fn type_schema(column_type: ColumnType) -> Value {
    match column_type {
        ColumnType::Text => json!({ "type": "string" }),
        ColumnType::Integer => json!({ "type": "integer" }),
        ColumnType::Decimal => json!({ "type": "string", "pattern": DECIMAL_PATTERN }),
        ColumnType::Date => json!({ "type": "string", "pattern": DATE_PATTERN }),
        ColumnType::Boolean => json!({ "type": "boolean" }),
    }
}

/// Schema for pattern, allowed values and length, if the rule declares any.
pub fn format_schema(rule: &ColumnRule) -> Option<Value> {
    let c = &rule.constraints;
    let mut schema = serde_json::Map::new();
    if let Some(pattern) = &c.pattern {
        schema.insert("pattern".into(), json!(pattern));
    }
    if let Some(max_length) = c.max_length {
        schema.insert("maxLength".into(), json!(max_length));
    }
    if !c.allowed.is_empty() {
        schema.insert("enum".into(), json!(c.allowed));
    }
    (!schema.is_empty()).then_some(Value::Object(schema))
}

/// Schema for numeric bounds, if the rule declares any.
pub fn bounds_schema(rule: &ColumnRule) -> Option<Value> {
    let c = &rule.constraints;
    let mut schema = serde_json::Map::new();
    if let Some(min) = c.min {
        schema.insert("minimum".into(), json!(min));
    }
    if let Some(max) = c.max {
        schema.insert("maximum".into(), json!(max));
    }
    (!schema.is_empty()).then_some(Value::Object(schema))
}

/// Numeric view of a value for bounds checks (decimals are stored as text).
fn numeric(value: &Value) -> Option<Value> {
    match value {
        Value::Number(_) => Some(value.clone()),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|n| json!(n)),
        _ => None,
    }
}

fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

struct ColumnChecker {
    rule: ColumnRule,
    type_check: Validator,
    format_check: Option<Validator>,
    bounds_check: Option<Validator>,
}

impl ColumnChecker {
    fn new(table: &str, rule: &ColumnRule) -> ConfigResult<Self> {
        let compile = |schema: &Value| {
            jsonschema::draft7::new(schema).map_err(|e| ConfigError::InvalidSchema {
                table: table.to_string(),
                column: rule.source.clone(),
                message: e.to_string(),
            })
        };
        Ok(Self {
            rule: rule.clone(),
            type_check: compile(&type_schema(rule.column_type))?,
            format_check: format_schema(rule).as_ref().map(compile).transpose()?,
            bounds_check: bounds_schema(rule).as_ref().map(compile).transpose()?,
        })
    }

    fn check(&self, record: &Record, row: usize) -> Vec<RowError> {
        let field = self.rule.target.as_str();
        let value = record.get(field);
        if is_missing(value) {
            if self.rule.nullable {
                return Vec::new();
            }
            return vec![RowError::new(row, field, ErrorKind::Required, "value is required")];
        }
        let Some(value) = value else {
            return Vec::new();
        };

        let first_error = |validator: &Validator, value: &Value| {
            validator.iter_errors(value).next().map(|e| e.to_string())
        };

        if let Some(message) = first_error(&self.type_check, value) {
            return vec![RowError::new(row, field, ErrorKind::Type, message)];
        }
        let mut errors = Vec::new();
        if let Some(check) = &self.format_check {
            if let Some(message) = first_error(check, value) {
                errors.push(RowError::new(row, field, ErrorKind::Pattern, message));
            }
        }
        if let (Some(check), Some(number)) = (&self.bounds_check, numeric(value)) {
            if let Some(message) = first_error(check, &number) {
                errors.push(RowError::new(row, field, ErrorKind::Bounds, message));
            }
        }
        errors
    }
}

/// Outcome of validating one row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowOutcome {
    /// Reject the row.
    pub errors: Vec<RowError>,
    /// Reported, row still valid.
    pub warnings: Vec<RowError>,
}

impl RowOutcome {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Compiled column checks plus the business validator of one table.
pub struct TableValidator {
    columns: Vec<ColumnChecker>,
    business: Option<BusinessValidator>,
}

impl TableValidator {
    pub fn new(config: &TableConfiguration, business: Option<BusinessValidator>) -> ConfigResult<Self> {
        let columns = config
            .columns
            .iter()
            .map(|rule| ColumnChecker::new(&config.name, rule))
            .collect::<ConfigResult<Vec<_>>>()?;
        Ok(Self { columns, business })
    }

    pub fn check(&self, record: &Record) -> RowOutcome {
        let row = source_row(record);
        let mut outcome = RowOutcome::default();
        for column in &self.columns {
            let found = column.check(record, row);
            if column.rule.priority.rejects_row() {
                outcome.errors.extend(found);
            } else {
                outcome.warnings.extend(found);
            }
        }
        if let Some(business) = self.business {
            outcome.errors.extend(business(record));
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColumnRule, TableKind, ValidationPriority};
    use crate::models::audit;

    fn config() -> TableConfiguration {
        TableConfiguration::new("t", "t*.csv", TableKind::Reference)
            .column(
                ColumnRule::new("ID", "id", ColumnType::Text)
                    .priority(ValidationPriority::Critical)
                    .pattern(r"^S\d{3}$"),
            )
            .column(
                ColumnRule::new("Credits", "credits", ColumnType::Integer)
                    .nullable()
                    .range(Some(0.0), Some(12.0)),
            )
            .column(
                ColumnRule::new("Grade", "grade", ColumnType::Text)
                    .nullable()
                    .priority(ValidationPriority::Optional)
                    .allowed(&["A", "B"]),
            )
    }

    fn record(value: Value) -> Record {
        let mut record = value.as_object().cloned().unwrap_or_default();
        record.insert(audit::SOURCE_ROW.into(), json!(7));
        record
    }

    #[test]
    fn test_generic_validate() {
        let schema = json!({"type": "object", "required": ["name"]});
        assert!(validate(&schema, &json!({"name": "x"})).is_ok());
        assert!(validate(&schema, &json!({})).is_err());
        assert!(is_valid(&json!({"type": "integer"}), &json!(3)));
    }

    #[test]
    fn test_valid_row() {
        let validator = TableValidator::new(&config(), None).unwrap();
        let outcome = validator.check(&record(json!({"id": "S001", "credits": 3, "grade": "A"})));
        assert!(outcome.is_valid());
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_error_kinds() {
        let validator = TableValidator::new(&config(), None).unwrap();

        let outcome = validator.check(&record(json!({"credits": "three"})));
        let kinds: Vec<ErrorKind> = outcome.errors.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![ErrorKind::Required, ErrorKind::Type]);
        assert!(outcome.errors.iter().all(|e| e.row == 7));

        let outcome = validator.check(&record(json!({"id": "X1", "credits": 40})));
        let kinds: Vec<ErrorKind> = outcome.errors.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![ErrorKind::Pattern, ErrorKind::Bounds]);
    }

    #[test]
    fn test_optional_failures_are_warnings() {
        let validator = TableValidator::new(&config(), None).unwrap();
        let outcome = validator.check(&record(json!({"id": "S001", "grade": "Z"})));
        assert!(outcome.is_valid());
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].kind, ErrorKind::Pattern);
    }

    #[test]
    fn test_decimal_bounds_use_numeric_view() {
        let rule = ColumnRule::new("Pct", "pct", ColumnType::Decimal).range(Some(0.0), Some(100.0));
        let checker = ColumnChecker::new("t", &rule).unwrap();
        assert!(checker.check(&record(json!({"pct": "99.5"})), 1).is_empty());
        let errors = checker.check(&record(json!({"pct": "100.5"})), 1);
        assert_eq!(errors[0].kind, ErrorKind::Bounds);
        let errors = checker.check(&record(json!({"pct": "lots"})), 1);
        assert_eq!(errors[0].kind, ErrorKind::Type);
    }
}
