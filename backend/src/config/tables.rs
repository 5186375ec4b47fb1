//! The enumerated legacy source tables.
//!
//! Registration is explicit: [`all`] is the complete list the registry sees.

use super::{
    CleaningOp, ColumnRule, ColumnType, Precondition, TableConfiguration, TableKind,
    TransformationRule, ValidationPriority,
};

use CleaningOp::*;
use ValidationPriority::*;

/// Shared field provided by `students`.
pub const STUDENT_ID: &str = "student_id";
/// Shared field provided by `terms`.
pub const TERM_CODE: &str = "term_code";

/// Ops for every free-text column.
fn text_ops() -> [CleaningOp; 3] {
    [StandardizeNull, RepairEncoding, CollapseWhitespace]
}

/// Ops for key columns.
fn key_ops() -> [CleaningOp; 3] {
    [StandardizeNull, Trim, Uppercase]
}

pub fn students() -> TableConfiguration {
    TableConfiguration::new("students", "students*.csv", TableKind::Reference)
        .column(
            ColumnRule::new("StudentID", STUDENT_ID, ColumnType::Text)
                .clean(key_ops())
                .priority(Critical)
                .pattern(r"^[A-Z0-9]{4,12}$")
                .shared(STUDENT_ID)
                .doc("Legacy student number, the key every other table refers to"),
        )
        .column(
            ColumnRule::new("Name", "name", ColumnType::Text)
                .clean(text_ops())
                .clean([TitleCase])
                .max_length(120),
        )
        .column(
            ColumnRule::new("KhmerName", "khmer_name_legacy", ColumnType::Text)
                .nullable()
                .clean([StandardizeNull, Trim])
                .priority(Optional)
                .doc("Name typed with a legacy Khmer font"),
        )
        .column(
            ColumnRule::new("BirthDate", "birth_date", ColumnType::Date)
                .nullable()
                .clean([StandardizeNull, Trim, ToDate { day_first: true }])
                .priority(Optional),
        )
        .column(
            ColumnRule::new("Gender", "gender", ColumnType::Text)
                .nullable()
                .clean(key_ops())
                .priority(Optional)
                .allowed(&["M", "F", "U"]),
        )
        .column(
            ColumnRule::new("Email", "email", ColumnType::Text)
                .nullable()
                .clean([StandardizeNull, Trim, Lowercase])
                .priority(Optional)
                .pattern(r"^[^@\s]+@[^@\s]+\.[a-z]{2,}$"),
        )
        .column(
            ColumnRule::new("Active", "is_active", ColumnType::Boolean)
                .nullable()
                .clean([StandardizeNull, ToBoolean])
                .priority(Optional),
        )
        .validator("student")
        .transform(
            TransformationRule::new("khmer_name_legacy", "khmer_name", "transliterate")
                .preserving_original()
                .when(Precondition::NotContainsTargetScript),
        )
        .provides(&[STUDENT_ID])
}

pub fn terms() -> TableConfiguration {
    TableConfiguration::new("terms", "terms*.csv", TableKind::Reference)
        .column(
            ColumnRule::new("TermID", TERM_CODE, ColumnType::Text)
                .clean(key_ops())
                .priority(Critical)
                .pattern(r"^\d{4}T\d[A-Z]?$")
                .shared(TERM_CODE),
        )
        .column(ColumnRule::new("TermName", "term_name", ColumnType::Text).clean(text_ops()))
        .column(
            ColumnRule::new("StartDate", "start_date", ColumnType::Date)
                .clean([StandardizeNull, Trim, ToDate { day_first: true }])
                .priority(Critical),
        )
        .column(
            ColumnRule::new("EndDate", "end_date", ColumnType::Date)
                .clean([StandardizeNull, Trim, ToDate { day_first: true }])
                .priority(Critical),
        )
        .validator("term")
        .provides(&[TERM_CODE])
}

pub fn class_enrollments() -> TableConfiguration {
    TableConfiguration::new(
        "class_enrollments",
        "class_enrollments*.csv",
        TableKind::Enrollment,
    )
    .column(
        ColumnRule::new("StudentID", STUDENT_ID, ColumnType::Text)
            .clean(key_ops())
            .priority(Critical)
            .shared(STUDENT_ID),
    )
    .column(
        ColumnRule::new("TermID", TERM_CODE, ColumnType::Text)
            .clean(key_ops())
            .priority(Critical)
            .shared(TERM_CODE),
    )
    .column(
        ColumnRule::new("ClassCode", "class_code", ColumnType::Text)
            .clean([StandardizeNull, Trim, CollapseWhitespace, Uppercase])
            .priority(Critical)
            .doc("Composite term-program-time-level/section[-component] code"),
    )
    .column(
        ColumnRule::new("Grade", "grade", ColumnType::Text)
            .nullable()
            .clean(key_ops())
            .priority(Optional)
            .allowed(&["A", "B", "C", "D", "E", "F", "I", "W", "P"]),
    )
    .column(
        ColumnRule::new("Credits", "credits", ColumnType::Integer)
            .nullable()
            .clean([StandardizeNull, ToInteger])
            .range(Some(0.0), Some(12.0)),
    )
    .column(
        ColumnRule::new("Attendance", "attendance_pct", ColumnType::Decimal)
            .nullable()
            .clean([StandardizeNull, ToDecimal])
            .priority(Optional)
            .range(Some(0.0), Some(100.0)),
    )
    .column(
        ColumnRule::new("Teacher", "teacher_legacy", ColumnType::Text)
            .nullable()
            .clean([StandardizeNull, Trim])
            .priority(Optional),
    )
    .validator("enrollment")
    .identifier("class_code")
    .transform(
        TransformationRule::new("teacher_legacy", "teacher", "transliterate")
            .when(Precondition::NotContainsTargetScript),
    )
    .depends_on(&["students", "terms"])
}

pub fn payments() -> TableConfiguration {
    TableConfiguration::new("payments", "payments*.csv", TableKind::Financial)
        .column(
            ColumnRule::new("ReceiptNo", "receipt_no", ColumnType::Text)
                .clean(key_ops())
                .priority(Critical),
        )
        .column(
            ColumnRule::new("StudentID", STUDENT_ID, ColumnType::Text)
                .nullable()
                .clean(key_ops())
                .priority(Critical)
                .shared(STUDENT_ID),
        )
        .column(
            ColumnRule::new("TermID", TERM_CODE, ColumnType::Text)
                .nullable()
                .clean(key_ops())
                .priority(Critical)
                .shared(TERM_CODE),
        )
        .column(
            ColumnRule::new("Amount", "amount", ColumnType::Decimal)
                .nullable()
                .clean([StandardizeNull, ToDecimal])
                .priority(Critical),
        )
        .column(
            ColumnRule::new("PaymentDate", "payment_date", ColumnType::Date)
                .nullable()
                .clean([StandardizeNull, Trim, ToDate { day_first: true }]),
        )
        .column(
            ColumnRule::new("ClassCode", "class_code", ColumnType::Text)
                .nullable()
                .clean([StandardizeNull, Trim, Uppercase])
                .priority(Optional)
                .doc("Explicit target; empty for bulk payments"),
        )
        .column(
            ColumnRule::new("Notes", "notes_legacy", ColumnType::Text)
                .nullable()
                .clean([StandardizeNull, Trim])
                .priority(Optional),
        )
        .validator("financial")
        .transform(TransformationRule::new("payment_date", "payment_date", "iso_date"))
        .transform(
            TransformationRule::new("notes_legacy", "notes", "transliterate")
                .when(Precondition::LegacyFontOnly),
        )
        .depends_on(&["students", "terms", "class_enrollments"])
}

/// Every source table, in declaration order.
pub fn all() -> Vec<TableConfiguration> {
    vec![students(), terms(), class_enrollments(), payments()]
}
