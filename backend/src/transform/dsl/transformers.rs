//! Named value transformers used by transformation rules.
//!
//! A transformer maps one cleaned value to its destination form. It gets a
//! [`TransliterationContext`] so every conversion can be traced back to its
//! table, column pair, row and run.

use serde_json::Value;

use super::operations::parse_date;
use crate::transliterate::{transliterate_with, TransliterationContext};

/// Value transformer: `Err` carries a row-level message.
pub type Transformer = fn(&Value, &TransliterationContext<'_>) -> Result<Value, String>;

/// Every built-in transformer with its registered name.
pub fn builtin() -> Vec<(&'static str, Transformer)> {
    vec![
        ("copy", copy),
        ("iso_date", iso_date),
        ("transliterate", transliterate),
        ("trim", trim),
        ("uppercase", uppercase),
    ]
}

/// Apply `f` to string values; null passes through, other types are rejected.
fn map_text(value: &Value, f: impl FnOnce(&str) -> Result<String, String>) -> Result<Value, String> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::String(s) => f(s).map(Value::String),
        other => Err(format!("expected text, found {}", other)),
    }
}

pub fn copy(value: &Value, _ctx: &TransliterationContext<'_>) -> Result<Value, String> {
    Ok(value.clone())
}

/// Legacy-font text to Unicode.
pub fn transliterate(value: &Value, ctx: &TransliterationContext<'_>) -> Result<Value, String> {
    map_text(value, |s| Ok(transliterate_with(s, ctx)))
}

/// Any accepted date spelling (day first) to `YYYY-MM-DD`.
pub fn iso_date(value: &Value, _ctx: &TransliterationContext<'_>) -> Result<Value, String> {
    if value.as_str().is_some_and(|s| s.trim().is_empty()) {
        return Ok(Value::Null);
    }
    map_text(value, |s| {
        parse_date(s, true)
            .map(|d| d.format("%Y-%m-%d").to_string())
            .ok_or_else(|| format!("'{}' is not a date", s))
    })
}

pub fn trim(value: &Value, _ctx: &TransliterationContext<'_>) -> Result<Value, String> {
    map_text(value, |s| Ok(s.trim().to_string()))
}

pub fn uppercase(value: &Value, _ctx: &TransliterationContext<'_>) -> Result<Value, String> {
    map_text(value, |s| Ok(s.to_uppercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn ctx() -> TransliterationContext<'static> {
        TransliterationContext {
            table: "students",
            source_column: "khmer_name_legacy",
            target_column: "khmer_name",
            row: 1,
            run_id: Uuid::nil(),
        }
    }

    #[test]
    fn test_builtin_sorted_and_unique() {
        let names: Vec<&str> = builtin().into_iter().map(|(n, _)| n).collect();
        let mut sorted = names.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_transliterate_converts_legacy_text() {
        let out = transliterate(&json!("ek"), &ctx()).unwrap();
        assert_eq!(out, json!("\u{1780}\u{17C1}"));
        assert_eq!(transliterate(&Value::Null, &ctx()).unwrap(), Value::Null);
        assert!(transliterate(&json!(3), &ctx()).is_err());
    }

    #[test]
    fn test_iso_date() {
        assert_eq!(iso_date(&json!("2010-01-31"), &ctx()).unwrap(), json!("2010-01-31"));
        assert_eq!(iso_date(&json!("31/01/2010"), &ctx()).unwrap(), json!("2010-01-31"));
        assert!(iso_date(&json!("someday"), &ctx()).is_err());
    }

    #[test]
    fn test_text_helpers() {
        assert_eq!(trim(&json!("  a "), &ctx()).unwrap(), json!("a"));
        assert_eq!(uppercase(&json!("ab"), &ctx()).unwrap(), json!("AB"));
        assert_eq!(copy(&json!(5), &ctx()).unwrap(), json!(5));
    }
}
