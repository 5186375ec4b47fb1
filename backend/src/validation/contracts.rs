//! Destination record contracts.
//!
//! The destination schema is fixed outside this crate. Each derived record
//! shape has an embedded JSON Schema (Draft 7) under `schemas/`, and Split
//! checks every record it emits against it.

use once_cell::sync::Lazy;
use serde_json::Value;

use super::{is_valid, validate};

fn embedded(source: &str) -> Value {
    serde_json::from_str(source).expect("Invalid embedded schema")
}

static STUDENT: Lazy<Value> = Lazy::new(|| embedded(include_str!("../../schemas/student.json")));
static TERM: Lazy<Value> = Lazy::new(|| embedded(include_str!("../../schemas/term.json")));
static ENROLLMENT_HEADER: Lazy<Value> =
    Lazy::new(|| embedded(include_str!("../../schemas/enrollment_header.json")));
static ENROLLMENT_SESSION: Lazy<Value> =
    Lazy::new(|| embedded(include_str!("../../schemas/enrollment_session.json")));
static ENROLLMENT_LINE: Lazy<Value> =
    Lazy::new(|| embedded(include_str!("../../schemas/enrollment_line.json")));
static PAYMENT_HEADER: Lazy<Value> =
    Lazy::new(|| embedded(include_str!("../../schemas/payment_header.json")));
static PAYMENT_LINE: Lazy<Value> =
    Lazy::new(|| embedded(include_str!("../../schemas/payment_line.json")));

/// A destination record shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Contract {
    Student,
    Term,
    EnrollmentHeader,
    EnrollmentSession,
    EnrollmentLine,
    PaymentHeader,
    PaymentLine,
}

impl Contract {
    /// Contract for the rows of a reference table, by its validator name.
    pub fn for_reference(validator: &str) -> Option<Self> {
        match validator {
            "student" => Some(Self::Student),
            "term" => Some(Self::Term),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Term => "term",
            Self::EnrollmentHeader => "enrollment_header",
            Self::EnrollmentSession => "enrollment_session",
            Self::EnrollmentLine => "enrollment_line",
            Self::PaymentHeader => "payment_header",
            Self::PaymentLine => "payment_line",
        }
    }

    pub fn schema(self) -> &'static Value {
        match self {
            Self::Student => &*STUDENT,
            Self::Term => &*TERM,
            Self::EnrollmentHeader => &*ENROLLMENT_HEADER,
            Self::EnrollmentSession => &*ENROLLMENT_SESSION,
            Self::EnrollmentLine => &*ENROLLMENT_LINE,
            Self::PaymentHeader => &*PAYMENT_HEADER,
            Self::PaymentLine => &*PAYMENT_LINE,
        }
    }

    /// Check `record` against this contract, returning every violation.
    pub fn check(self, record: &Value) -> Result<(), Vec<String>> {
        validate(self.schema(), record)
    }

    pub fn accepts(self, record: &Value) -> bool {
        is_valid(self.schema(), record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ID: &str = "6f1c2a9e-0c55-5d64-a0a4-3b4c8a1d9e21";

    #[test]
    fn test_all_schemas_load() {
        for contract in [
            Contract::Student,
            Contract::Term,
            Contract::EnrollmentHeader,
            Contract::EnrollmentSession,
            Contract::EnrollmentLine,
            Contract::PaymentHeader,
            Contract::PaymentLine,
        ] {
            assert!(contract.schema().is_object(), "{}", contract.name());
        }
    }

    #[test]
    fn test_enrollment_header() {
        let header = json!({
            "id": ID,
            "term_code": "2010T1E",
            "standardized_code": "IEAP-01",
            "program": "IEAP",
            "time_of_day": "A",
            "level": "01",
            "section": "A",
            "is_language": true
        });
        assert!(Contract::EnrollmentHeader.accepts(&header));

        let mut bad = header.clone();
        bad["section"] = json!("unknown");
        let errors = Contract::EnrollmentHeader.check(&bad).unwrap_err();
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_payment_line() {
        let line = json!({
            "id": ID,
            "header_id": ID,
            "target": "IEAP-01",
            "amount": "33.34",
            "percentage": 33.34
        });
        assert!(Contract::PaymentLine.accepts(&line));
        assert!(!Contract::PaymentLine.accepts(&json!({"id": ID})));
    }

    #[test]
    fn test_reference_contracts() {
        assert_eq!(Contract::for_reference("student"), Some(Contract::Student));
        assert_eq!(Contract::for_reference("financial"), None);
    }
}
