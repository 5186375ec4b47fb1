//! Expand validated rows into destination-shaped records.
//!
//! # Enrollment tables
//!
//! ```text
//! transformed rows (one per student and class)     derived records
//! ┌──────────────────────────────────────┐     ┌──────────────────────────┐
//! │ S001  2010T1E-582-A-A1A-Listening    │     │ header  IEAP-01 / A / A  │
//! │ S002  2010T1E-582-A-A1A-Listening    │  →  │  session  LISTENING      │
//! │ S003  2010T1E-582-A-A1A-Writing      │     │   line  S001, line  S002 │
//! └──────────────────────────────────────┘     │  session  WRITING        │
//!                                              │   line  S003             │
//!                                              └──────────────────────────┘
//! ```
//!
//! Headers are deduplicated by (term, standardized code, section, time of
//! day). Sessions exist only for language programs. Every input row gives
//! exactly one line.
//!
//! # Payment tables
//!
//! One header per payment plus one line per allocation target.
//!
//! Every derived id is a UUID v5 of its natural key, so a rerun over the same
//! input produces the same ids. The mapping table links each derived id back
//! to its source row.

use serde_json::{json, Value};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::allocation::{AllocationEngine, EnrollmentLookup, Money, PaymentRef};
use crate::config::tables::{STUDENT_ID, TERM_CODE};
use crate::identifier::fields;
use crate::models::{audit, mark_stage, source_row, ErrorKind, Record, RowError, Stage, StageTable};

/// Namespace of every derived id.
pub const ID_NAMESPACE: Uuid = Uuid::from_u128(0x5b1f_0c8e_4d2a_4e7b_9a61_3c0d_7e42_a915);

/// Session component used when a language class names none.
pub const DEFAULT_COMPONENT: &str = "MAIN";

/// Deterministic id of a derived record.
pub fn derived_id(kind: &str, key: &str) -> Uuid {
    Uuid::new_v5(&ID_NAMESPACE, format!("{}:{}", kind, key).as_bytes())
}

/// Records derived from one table.
#[derive(Debug, Clone, Default)]
pub struct SplitOutput {
    pub headers: Vec<Record>,
    pub sessions: Vec<Record>,
    pub lines: Vec<Record>,
    pub mapping: Vec<Record>,
    /// Per-target allocation audit (payments only)
    pub allocation_log: Vec<Record>,
    /// Rows that could not be split
    pub errors: Vec<RowError>,
    /// Soft problems, e.g. imputed allocations
    pub warnings: Vec<RowError>,
}

fn text(record: &Record, field: &str) -> String {
    StageTable::text(record, field)
        .map(|t| t.into_owned())
        .unwrap_or_default()
}

fn object(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

fn mapping_entry(table: &str, source: &Record, derived: Uuid, kind: &str) -> Record {
    object(json!({
        "derived_id": derived.to_string(),
        "derived_kind": kind,
        "source_table": table,
        "source_row": source_row(source),
        "source_file": source.get(audit::SOURCE_FILE).cloned().unwrap_or(Value::Null),
    }))
}

/// Carry the run id and transformation path of `source` onto a derived
/// record and stamp it with the Split stage.
fn with_audit(mut derived: Record, source: &Record) -> Record {
    for column in [audit::RUN_ID, audit::TRANSFORM_PATH] {
        if let Some(value) = source.get(column) {
            derived.insert(column.to_string(), value.clone());
        }
    }
    mark_stage(&mut derived, Stage::Split);
    derived
}

// =============================================================================
// Reference tables
// =============================================================================

/// One destination record per row: every non-audit column plus an id.
pub fn split_reference(table: &str, key_field: Option<&str>, records: &[Record]) -> SplitOutput {
    let mut out = SplitOutput::default();
    for record in records {
        let key = key_field
            .map(|f| text(record, f))
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| source_row(record).to_string());
        let id = derived_id(table, &key);

        let mut header = Record::new();
        header.insert("id".into(), json!(id.to_string()));
        for (column, value) in record {
            if !column.starts_with('_') {
                header.insert(column.clone(), value.clone());
            }
        }
        out.headers.push(with_audit(header, record));
        out.mapping.push(mapping_entry(table, record, id, "header"));
    }
    out
}

// =============================================================================
// Enrollment tables
// =============================================================================

/// Header, session and line records from parsed class identifiers.
pub fn split_enrollments(table: &str, records: &[Record]) -> SplitOutput {
    let mut out = SplitOutput::default();
    let mut seen_headers: BTreeSet<Uuid> = BTreeSet::new();
    let mut seen_sessions: BTreeSet<Uuid> = BTreeSet::new();

    for record in records {
        let term = Some(text(record, fields::TERM))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| text(record, TERM_CODE));
        let code = text(record, fields::STANDARDIZED_CODE);
        let section = text(record, fields::SECTION);
        let time_of_day = text(record, fields::TIME_OF_DAY);
        let is_language = record
            .get(fields::IS_LANGUAGE)
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let header_key = format!("{}|{}|{}|{}", term, code, section, time_of_day);
        let header_id = derived_id("class_header", &header_key);
        if seen_headers.insert(header_id) {
            out.headers.push(with_audit(object(json!({
                "id": header_id.to_string(),
                "term_code": term,
                "standardized_code": code,
                "program": text(record, fields::PROGRAM),
                "time_of_day": time_of_day,
                "level": text(record, fields::LEVEL),
                "section": section,
                "is_language": is_language,
            })), record));
        }
        out.mapping.push(mapping_entry(table, record, header_id, "header"));

        let session_id = if is_language {
            let component = Some(text(record, fields::COMPONENT))
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| DEFAULT_COMPONENT.to_string());
            let session_id = derived_id("class_session", &format!("{}|{}", header_id, component));
            if seen_sessions.insert(session_id) {
                out.sessions.push(with_audit(object(json!({
                    "id": session_id.to_string(),
                    "header_id": header_id.to_string(),
                    "component": component,
                })), record));
            }
            out.mapping.push(mapping_entry(table, record, session_id, "session"));
            Some(session_id)
        } else {
            None
        };

        let row = source_row(record);
        let line_id = derived_id("class_line", &format!("{}|{}", table, row));
        out.lines.push(with_audit(object(json!({
            "id": line_id.to_string(),
            "header_id": header_id.to_string(),
            "session_id": session_id.map(|s| s.to_string()),
            "student_id": text(record, STUDENT_ID),
            "grade": record.get("grade").cloned().unwrap_or(Value::Null),
            "credits": record.get("credits").cloned().unwrap_or(Value::Null),
            "source_row": row,
        })), record));
        out.mapping.push(mapping_entry(table, record, line_id, "line"));
    }
    out
}

// =============================================================================
// Payment tables
// =============================================================================

/// Payment headers and allocation lines.
pub fn split_payments(
    table: &str,
    records: &[Record],
    engine: &AllocationEngine,
    lookup: &dyn EnrollmentLookup,
) -> SplitOutput {
    let mut out = SplitOutput::default();

    for record in records {
        let row = source_row(record);
        let amount_text = text(record, "amount");
        let amount = match Money::parse(&amount_text) {
            Ok(amount) => amount,
            Err(e) => {
                out.errors
                    .push(RowError::new(row, "amount", ErrorKind::Parse, e.to_string()));
                continue;
            }
        };

        let receipt_no = text(record, "receipt_no");
        let student_id = text(record, STUDENT_ID);
        let term_code = text(record, TERM_CODE);
        let target = text(record, "class_code");
        let payment = PaymentRef {
            receipt_no: &receipt_no,
            student_id: &student_id,
            term_code: &term_code,
            amount,
            target: Some(target.as_str()).filter(|t| !t.is_empty()),
        };
        let result = engine.allocate(&payment, lookup);

        // Receipt numbers restart across terms and are reused between students
        let key = if receipt_no.is_empty() {
            format!("{}|{}", table, row)
        } else {
            format!("{}|{}|{}", receipt_no, student_id, term_code)
        };
        let header_id = derived_id("payment_header", &key);
        out.headers.push(with_audit(object(json!({
            "id": header_id.to_string(),
            "receipt_no": receipt_no,
            "student_id": student_id,
            "term_code": term_code,
            "amount": amount.to_string(),
            "payment_date": record.get("payment_date").cloned().unwrap_or(Value::Null),
            "method": result.method.as_str(),
        })), record));
        out.mapping.push(mapping_entry(table, record, header_id, "header"));

        if result.is_imputed() {
            out.warnings
                .push(RowError::new(row, "amount", ErrorKind::Business, result.log.clone()));
        }

        for (index, line) in result.lines.iter().enumerate() {
            let line_id = derived_id("payment_line", &format!("{}|{}", header_id, index));
            let percentage = (line.percentage * 100.0).round() / 100.0;
            out.lines.push(with_audit(object(json!({
                "id": line_id.to_string(),
                "header_id": header_id.to_string(),
                "target": line.target,
                "amount": line.amount.to_string(),
                "percentage": percentage,
            })), record));
            out.mapping.push(mapping_entry(table, record, line_id, "line"));
            out.allocation_log.push(object(json!({
                "header_id": header_id.to_string(),
                "receipt_no": receipt_no,
                "method": result.method.as_str(),
                "target": line.target,
                "amount": line.amount.to_string(),
                "percentage": percentage,
                "message": result.log,
            })));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::EnrollmentIndex;
    use crate::identifier::{parse_identifier, NoCatalog};

    fn enrollment(row: usize, student: &str, code: &str) -> Record {
        let mut record = Record::new();
        record.insert(audit::SOURCE_ROW.into(), json!(row));
        record.insert(audit::SOURCE_FILE.into(), json!("class_enrollments.csv"));
        record.insert(STUDENT_ID.into(), json!(student));
        record.insert(TERM_CODE.into(), json!("2010T1E"));
        parse_identifier(code, &NoCatalog).write_to(&mut record);
        record
    }

    fn payment(row: usize, receipt: &str, amount: &str, target: Option<&str>) -> Record {
        let mut record = Record::new();
        record.insert(audit::SOURCE_ROW.into(), json!(row));
        record.insert("receipt_no".into(), json!(receipt));
        record.insert(STUDENT_ID.into(), json!("S001"));
        record.insert(TERM_CODE.into(), json!("2010T1E"));
        record.insert("amount".into(), json!(amount));
        record.insert(
            "class_code".into(),
            target.map(|t| json!(t)).unwrap_or(Value::Null),
        );
        record
    }

    #[test]
    fn test_derived_ids_are_deterministic() {
        assert_eq!(derived_id("a", "b"), derived_id("a", "b"));
        assert_ne!(derived_id("a", "b"), derived_id("a", "c"));
    }

    #[test]
    fn test_enrollment_headers_deduplicated() {
        let rows = vec![
            enrollment(1, "S001", "2010T1E-582-A-A1A"),
            enrollment(2, "S002", "2010T1E-582-A-A1A"),
            enrollment(3, "S003", "2010T1E-582-A-A1B"),
        ];
        let out = split_enrollments("class_enrollments", &rows);
        assert_eq!(out.headers.len(), 2);
        assert_eq!(out.lines.len(), 3);
        assert_eq!(out.lines[0]["header_id"], out.lines[1]["header_id"]);
        assert_ne!(out.lines[0]["header_id"], out.lines[2]["header_id"]);
        assert_eq!(out.headers[0]["section"], json!("A"));
        assert_eq!(out.headers[0]["level"], json!("01"));
    }

    #[test]
    fn test_sessions_only_for_language_programs() {
        let rows = vec![enrollment(1, "S001", "2010T1E-582-A-A1A")];
        let out = split_enrollments("class_enrollments", &rows);
        let is_language = out.headers[0]["is_language"].as_bool().unwrap();
        assert_eq!(out.sessions.len(), usize::from(is_language));
        assert_eq!(out.lines[0]["session_id"].is_null(), !is_language);

        let lines_mapped = out
            .mapping
            .iter()
            .filter(|m| m["derived_kind"] == json!("line"))
            .count();
        assert_eq!(lines_mapped, 1);
        assert_eq!(out.mapping[0]["source_file"], json!("class_enrollments.csv"));
    }

    #[test]
    fn test_split_is_reproducible() {
        let rows = vec![enrollment(1, "S001", "2010T1E-582-A-A1A")];
        let a = split_enrollments("class_enrollments", &rows);
        let b = split_enrollments("class_enrollments", &rows);
        assert_eq!(a.headers, b.headers);
        assert_eq!(a.lines, b.lines);
    }

    #[test]
    fn test_bulk_payment_split_three_ways() {
        let mut index = EnrollmentIndex::new();
        for code in ["IEAP-01", "IEAP-02", "IEAP-03"] {
            index.insert("S001", "2010T1E", code);
        }
        let out = split_payments(
            "payments",
            &[payment(1, "R1", "100.00", None)],
            &AllocationEngine::default(),
            &index,
        );
        assert_eq!(out.headers[0]["method"], json!("calculated"));
        let amounts: Vec<&str> = out.lines.iter().map(|l| l["amount"].as_str().unwrap()).collect();
        assert_eq!(amounts, vec!["33.33", "33.33", "33.34"]);
        assert_eq!(out.allocation_log.len(), 3);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn test_direct_and_imputed_payments() {
        let index = EnrollmentIndex::new();
        let out = split_payments(
            "payments",
            &[
                payment(1, "R1", "50", Some("GESL-01")),
                payment(2, "R2", "20.00", None),
                payment(3, "R3", "abc", None),
            ],
            &AllocationEngine::default(),
            &index,
        );
        assert_eq!(out.headers.len(), 2);
        assert_eq!(out.headers[0]["method"], json!("direct"));
        assert_eq!(out.lines[0]["percentage"], json!(100.0));
        assert_eq!(out.headers[1]["method"], json!("imputed"));
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].row, 3);
    }

    #[test]
    fn test_reference_split_keeps_run_audit_only() {
        let mut record = Record::new();
        record.insert(audit::SOURCE_ROW.into(), json!(1));
        record.insert(audit::RUN_ID.into(), json!("run-1"));
        record.insert(STUDENT_ID.into(), json!("S001"));
        let out = split_reference("students", Some(STUDENT_ID), &[record]);
        assert_eq!(out.headers[0]["id"], json!(derived_id("students", "S001").to_string()));
        assert!(!out.headers[0].contains_key(audit::SOURCE_ROW));
        assert_eq!(out.headers[0][audit::RUN_ID], json!("run-1"));
        assert_eq!(out.headers[0][audit::TRANSFORM_PATH], json!("split"));
        assert_eq!(out.mapping.len(), 1);
    }

    #[test]
    fn test_derived_records_carry_transform_path() {
        let mut row = enrollment(1, "S001", "2010T1E-582-A-A1A-Listening");
        row.insert(audit::RUN_ID.into(), json!("run-1"));
        row.insert(audit::TRANSFORM_PATH.into(), json!("import>clean>validate>transform"));
        let out = split_enrollments("class_enrollments", &[row]);

        let expected = json!("import>clean>validate>transform>split");
        for record in out.headers.iter().chain(&out.sessions).chain(&out.lines) {
            assert_eq!(record[audit::TRANSFORM_PATH], expected);
            assert_eq!(record[audit::RUN_ID], json!("run-1"));
            assert_eq!(record[audit::STAGE], json!("split"));
        }
    }

    #[test]
    fn test_reused_receipt_numbers_get_distinct_ids() {
        let first = payment(1, "R1", "10.00", Some("GESL-01"));
        let mut other_student = payment(2, "R1", "10.00", Some("GESL-01"));
        other_student.insert(STUDENT_ID.into(), json!("S002"));
        let mut other_term = payment(3, "R1", "10.00", Some("GESL-01"));
        other_term.insert(TERM_CODE.into(), json!("2010T2E"));

        let out = split_payments(
            "payments",
            &[first, other_student, other_term],
            &AllocationEngine::default(),
            &EnrollmentIndex::new(),
        );
        let ids: BTreeSet<&str> = out.headers.iter().filter_map(|h| h["id"].as_str()).collect();
        assert_eq!(ids.len(), 3);
        let line_ids: BTreeSet<&str> = out.lines.iter().filter_map(|l| l["id"].as_str()).collect();
        assert_eq!(line_ids.len(), 3);
    }
}
