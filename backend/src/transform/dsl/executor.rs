//! Rule executor
//!
//! Applies a table's column rules to imported rows (Clean) and its
//! transformation rules to validated rows (Transform).

use serde_json::Value;
use uuid::Uuid;

use super::operations::{CleanContext, CleaningOp};
use super::transformers::Transformer;
use crate::cache::CrossTableCache;
use crate::config::{ColumnRule, TableConfiguration, TransformationRule};
use crate::models::{audit, source_row, ErrorKind, Record, RowError};
use crate::transliterate::TransliterationContext;

/// A cleaned row plus the soft failures met while cleaning it.
#[derive(Debug, Clone, Default)]
pub struct CleanedRow {
    pub record: Record,
    /// Failed coercions. The pre-coercion value is kept so Validate can reject it.
    pub issues: Vec<RowError>,
}

/// Run `ops` over `value` in order.
///
/// On the first failing operation the value as it was before that operation
/// is returned together with the failure.
pub fn apply_ops(value: &Value, ops: &[CleaningOp], ctx: &CleanContext) -> (Value, Option<String>) {
    let mut current = value.clone();
    for op in ops {
        match op.apply(&current, ctx) {
            Ok(next) => current = next,
            Err(message) => return (current, Some(format!("{}: {}", op.name(), message))),
        }
    }
    (current, None)
}

/// Clean one imported row.
///
/// Source columns are renamed to their targets; audit columns are carried
/// over. Shared fields go through `cache`: the providing table stores every
/// cleaned value, consuming tables reuse it.
pub fn clean_row(
    raw: &Record,
    config: &TableConfiguration,
    ctx: &CleanContext,
    cache: &mut CrossTableCache,
) -> CleanedRow {
    let row = source_row(raw);
    let mut cleaned = CleanedRow::default();

    for column in audit::ALL {
        if let Some(value) = raw.get(column) {
            cleaned.record.insert(column.to_string(), value.clone());
        }
    }

    for rule in &config.columns {
        let input = raw.get(&rule.source).cloned().unwrap_or(Value::Null);
        let (value, issue) = clean_column(&input, rule, config, ctx, cache);
        if let Some(message) = issue {
            cleaned
                .issues
                .push(RowError::new(row, rule.target.as_str(), ErrorKind::Parse, message));
        }
        cleaned.record.insert(rule.target.clone(), value);
    }
    cleaned
}

fn clean_column(
    input: &Value,
    rule: &ColumnRule,
    config: &TableConfiguration,
    ctx: &CleanContext,
    cache: &mut CrossTableCache,
) -> (Value, Option<String>) {
    let (Some(field), Some(raw)) = (rule.shared_field.as_deref(), input.as_str()) else {
        return apply_ops(input, &rule.cleaning, ctx);
    };

    if config.provides.iter().any(|p| p == field) {
        let (value, issue) = apply_ops(input, &rule.cleaning, ctx);
        if issue.is_none() {
            cache.insert(field, raw, value.clone());
        }
        return (value, issue);
    }

    match cache.get(field, raw) {
        Some(value) => (value, None),
        None => apply_ops(input, &rule.cleaning, ctx),
    }
}

/// Apply every transformation rule to one record in place.
///
/// A failed precondition copies the source value to the target unchanged.
/// A failing transformer does the same and reports a row error; the row is
/// never dropped.
pub fn apply_transformations<F>(
    record: &mut Record,
    table: &str,
    run_id: Uuid,
    rules: &[TransformationRule],
    lookup: F,
) -> Vec<RowError>
where
    F: Fn(&str) -> Option<Transformer>,
{
    let row = source_row(record);
    let mut errors = Vec::new();

    for rule in rules {
        let input = record.get(&rule.source).cloned().unwrap_or(Value::Null);
        let applies = rule
            .precondition
            .as_ref()
            .map_or(true, |p| p.holds(record, &rule.source));

        let output = if !applies {
            input.clone()
        } else {
            let ctx = TransliterationContext {
                table,
                source_column: &rule.source,
                target_column: &rule.target,
                row,
                run_id,
            };
            match lookup(&rule.transformer).map(|f| f(&input, &ctx)) {
                Some(Ok(value)) => value,
                Some(Err(message)) => {
                    errors.push(RowError::new(
                        row,
                        rule.target.as_str(),
                        ErrorKind::Parse,
                        format!("{}: {}", rule.transformer, message),
                    ));
                    input.clone()
                }
                None => {
                    errors.push(RowError::new(
                        row,
                        rule.target.as_str(),
                        ErrorKind::Parse,
                        format!("transformer '{}' is not registered", rule.transformer),
                    ));
                    input.clone()
                }
            }
        };

        if !rule.preserve_original && rule.target != rule.source {
            record.remove(&rule.source);
        }
        record.insert(rule.target.clone(), output);
    }
    errors
}
