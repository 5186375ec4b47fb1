//! Named business-rule validators.
//!
//! Each validator looks at one cleaned record and returns every rule it
//! breaks as a [`RowError`] of kind [`ErrorKind::Business`]. Tables refer to
//! a validator by name in their configuration.

use chrono::{NaiveDate, Utc};
use serde_json::Value;

use crate::allocation::Money;
use crate::config::tables::{STUDENT_ID, TERM_CODE};
use crate::identifier::{fields, programs, ParseQuality};
use crate::models::{source_row, ErrorKind, Record, RowError, StageTable};

/// Business-rule check over one cleaned record.
pub type BusinessValidator = fn(&Record) -> Vec<RowError>;

/// Every built-in validator with its registered name.
pub fn builtin() -> Vec<(&'static str, BusinessValidator)> {
    vec![
        ("enrollment", validate_enrollment),
        ("financial", validate_financial),
        ("student", validate_student),
        ("term", validate_term),
    ]
}

fn present(record: &Record, field: &str) -> bool {
    StageTable::text(record, field).is_some_and(|t| !t.trim().is_empty())
}

fn date(record: &Record, field: &str) -> Option<NaiveDate> {
    StageTable::text(record, field).and_then(|t| NaiveDate::parse_from_str(&t, "%Y-%m-%d").ok())
}

fn business(record: &Record, field: &str, message: impl Into<String>) -> RowError {
    RowError::new(source_row(record), field, ErrorKind::Business, message)
}

/// Class enrollment: the composite identifier must resolve to a known
/// program with a two-digit level and a section letter.
pub fn validate_enrollment(record: &Record) -> Vec<RowError> {
    let mut errors = Vec::new();

    let quality = record.get(fields::QUALITY).and_then(Value::as_str);
    if quality == Some(ParseQuality::Error.as_str()) {
        errors.push(business(record, fields::QUALITY, "class code could not be parsed"));
        return errors;
    }

    if record.get(fields::PROGRAM_KNOWN).and_then(Value::as_bool) != Some(true) {
        let code = StageTable::text(record, fields::PROGRAM_CODE).unwrap_or_default();
        errors.push(business(
            record,
            fields::PROGRAM_CODE,
            format!("unknown program code '{}'", code),
        ));
    }

    let level = StageTable::text(record, fields::LEVEL).unwrap_or_default();
    if level.len() != 2 || !level.chars().all(|c| c.is_ascii_digit()) {
        errors.push(business(
            record,
            fields::LEVEL,
            format!("level '{}' is not a two-digit level", level),
        ));
    }

    let section = StageTable::text(record, fields::SECTION).unwrap_or_default();
    let mut chars = section.chars();
    let valid_section = match (chars.next(), chars.next()) {
        (Some(c), None) => programs::is_section_letter(c),
        _ => false,
    };
    if !valid_section {
        errors.push(business(
            record,
            fields::SECTION,
            format!("section '{}' is not one of A-H", section),
        ));
    }

    errors
}

/// Payment: amount, student and term are all present and the amount is a
/// non-negative money value.
pub fn validate_financial(record: &Record) -> Vec<RowError> {
    let mut errors = Vec::new();
    for field in ["amount", STUDENT_ID, TERM_CODE] {
        if !present(record, field) {
            errors.push(business(record, field, format!("{} is required for a payment", field)));
        }
    }
    if let Some(text) = StageTable::text(record, "amount").filter(|t| !t.trim().is_empty()) {
        match Money::parse(&text) {
            Ok(amount) if amount.is_negative() => {
                errors.push(business(record, "amount", format!("amount {} is negative", amount)));
            }
            Ok(_) => {}
            Err(e) => errors.push(business(record, "amount", e.to_string())),
        }
    }
    errors
}

pub fn validate_student(record: &Record) -> Vec<RowError> {
    let mut errors = Vec::new();
    if !present(record, STUDENT_ID) {
        errors.push(business(record, STUDENT_ID, "student id is required"));
    }
    if let Some(birth) = date(record, "birth_date") {
        if birth > Utc::now().date_naive() {
            errors.push(business(record, "birth_date", "birth date is in the future"));
        }
    }
    errors
}

pub fn validate_term(record: &Record) -> Vec<RowError> {
    match (date(record, "start_date"), date(record, "end_date")) {
        (Some(start), Some(end)) if end < start => vec![business(
            record,
            "end_date",
            format!("term ends ({}) before it starts ({})", end, start),
        )],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::{parse_identifier, NoCatalog};
    use crate::models::audit;
    use serde_json::json;

    fn enrollment(code: &str) -> Record {
        let mut record = Record::new();
        record.insert(audit::SOURCE_ROW.into(), json!(4));
        parse_identifier(code, &NoCatalog).write_to(&mut record);
        record
    }

    #[test]
    fn test_builtin_names() {
        let names: Vec<&str> = builtin().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["enrollment", "financial", "student", "term"]);
    }

    #[test]
    fn test_enrollment_accepts_parsed_code() {
        assert!(validate_enrollment(&enrollment("2010T1E-582-A-A1A")).is_empty());
    }

    #[test]
    fn test_enrollment_rejects_unknown_section() {
        let errors = validate_enrollment(&enrollment("2010T1E-582-A-ZZZZ"));
        assert!(errors.iter().any(|e| e.field == fields::SECTION));
        assert!(errors.iter().all(|e| e.kind == ErrorKind::Business && e.row == 4));
    }

    #[test]
    fn test_enrollment_rejects_unparsed() {
        let errors = validate_enrollment(&enrollment("garbage"));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, fields::QUALITY);
    }

    #[test]
    fn test_financial_rules() {
        let mut record = Record::new();
        record.insert("amount".into(), json!("-5.00"));
        record.insert(STUDENT_ID.into(), json!("S001"));
        record.insert(TERM_CODE.into(), Value::Null);
        let errors = validate_financial(&record);
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec![TERM_CODE, "amount"]);

        record.insert("amount".into(), json!("100.00"));
        record.insert(TERM_CODE.into(), json!("2010T1"));
        assert!(validate_financial(&record).is_empty());
    }

    #[test]
    fn test_term_dates() {
        let mut record = Record::new();
        record.insert("start_date".into(), json!("2010-03-01"));
        record.insert("end_date".into(), json!("2010-01-01"));
        assert_eq!(validate_term(&record).len(), 1);
        record.insert("end_date".into(), json!("2010-06-01"));
        assert!(validate_term(&record).is_empty());
    }

    #[test]
    fn test_student_birth_date() {
        let mut record = Record::new();
        record.insert(STUDENT_ID.into(), json!("S001"));
        record.insert("birth_date".into(), json!("2999-01-01"));
        assert_eq!(validate_student(&record).len(), 1);
        record.insert("birth_date".into(), json!("1990-01-01"));
        assert!(validate_student(&record).is_empty());
    }
}
